use serde_json::json;
use tracing::debug;

use crate::config::OpenAiConfig;
use crate::db::Role;
use crate::llm::decode::{sse_data, Decoded, FrameDecoder, SSE_DONE};
use crate::llm::models::{with_system, ChatOptions};
use crate::llm::transport::HttpRequest;
use crate::llm::LlmError;

#[derive(Debug, Clone)]
pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    model: String,
    options: ChatOptions,
}

impl OpenAiProvider {
    pub fn new(config: &OpenAiConfig, options: ChatOptions) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.api_base.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            options,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn build_request(&self, transcript: &[(Role, String)]) -> Result<HttpRequest, LlmError> {
        if self.api_key.trim().is_empty() {
            return Err(LlmError::MissingCredential("OPENAI_API_KEY"));
        }

        let messages = with_system(transcript, &self.options.system_prompt);

        Ok(HttpRequest {
            url: format!("{}/chat/completions", self.base_url),
            headers: vec![("Authorization", format!("Bearer {}", self.api_key))],
            body: json!({
                "model": self.model,
                "messages": messages,
                "temperature": self.options.temperature,
                "max_tokens": self.options.max_tokens,
                "stream": true,
            }),
        })
    }
}

#[derive(Debug, Default)]
pub struct OpenAiDecoder;

impl FrameDecoder for OpenAiDecoder {
    fn decode_line(&mut self, line: &str) -> Decoded {
        let Some(data) = sse_data(line) else {
            return Decoded::Skip;
        };
        if data == SSE_DONE {
            return Decoded::Done;
        }

        let json: serde_json::Value = match serde_json::from_str(data) {
            Ok(json) => json,
            Err(e) => {
                debug!("Skipping unparseable OpenAI event: {}", e);
                return Decoded::Skip;
            }
        };

        match json["choices"][0]["delta"]["content"].as_str() {
            Some(content) if !content.is_empty() => Decoded::Fragment(content.to_string()),
            _ => Decoded::Skip,
        }
    }
}
