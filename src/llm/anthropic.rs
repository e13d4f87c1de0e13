use serde_json::json;
use tracing::{debug, warn};

use crate::config::AnthropicConfig;
use crate::db::Role;
use crate::llm::decode::{sse_data, Decoded, FrameDecoder, SSE_DONE};
use crate::llm::models::{ChatOptions, Message};
use crate::llm::transport::HttpRequest;
use crate::llm::LlmError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicProvider {
    api_key: String,
    base_url: String,
    model: String,
    options: ChatOptions,
}

impl AnthropicProvider {
    pub fn new(config: &AnthropicConfig, options: ChatOptions) -> Self {
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
            return Err(LlmError::MissingCredential("ANTHROPIC_API_KEY"));
        }

        let (system, messages) = split_system(transcript, &self.options.system_prompt);

        Ok(HttpRequest {
            url: format!("{}/v1/messages", self.base_url),
            headers: vec![
                ("x-api-key", self.api_key.clone()),
                ("anthropic-version", ANTHROPIC_VERSION.to_string()),
            ],
            body: json!({
                "model": self.model,
                "max_tokens": self.options.max_tokens,
                "temperature": self.options.temperature,
                "system": system,
                "stream": true,
                "messages": messages,
            }),
        })
    }
}

/// Anthropic takes the system prompt as a top-level field and only
/// user/assistant turns in `messages`. The last `system` entry wins.
pub fn split_system(
    transcript: &[(Role, String)],
    default_prompt: &str,
) -> (String, Vec<Message>) {
    let mut system = None;
    let mut messages = Vec::with_capacity(transcript.len());

    for (role, content) in transcript {
        match role {
            Role::System => system = Some(content.as_str()),
            Role::User | Role::Assistant => messages.push(Message::new(*role, content.clone())),
        }
    }

    (system.unwrap_or(default_prompt).to_string(), messages)
}

#[derive(Debug, Default)]
pub struct AnthropicDecoder;

impl FrameDecoder for AnthropicDecoder {
    fn decode_line(&mut self, line: &str) -> Decoded {
        let Some(data) = sse_data(line) else {
            return Decoded::Skip;
        };
        if data == SSE_DONE {
            return Decoded::Done;
        }

        let event: serde_json::Value = match serde_json::from_str(data) {
            Ok(event) => event,
            Err(e) => {
                debug!("Skipping unparseable Anthropic event: {}", e);
                return Decoded::Skip;
            }
        };

        // Anthropic streams typed events rather than OpenAI-style choices
        match event["type"].as_str() {
            Some("content_block_delta") => match event["delta"]["text"].as_str() {
                Some(text) if !text.is_empty() => Decoded::Fragment(text.to_string()),
                _ => Decoded::Skip,
            },
            Some("message_stop") => Decoded::Done,
            Some("error") => {
                warn!("Anthropic reported an in-stream error: {}", event["error"]);
                Decoded::Skip
            }
            _ => Decoded::Skip,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transcript() -> Vec<(Role, String)> {
        vec![
            (Role::System, "Speak like a pirate.".to_string()),
            (Role::User, "Hello".to_string()),
            (Role::Assistant, "Ahoy".to_string()),
            (Role::User, "Where to?".to_string()),
        ]
    }

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new(
            &AnthropicConfig {
                api_base: "https://api.anthropic.com".to_string(),
                api_key: "key".to_string(),
                model: "claude-3-opus-20240229".to_string(),
            },
            ChatOptions {
                temperature: 0.7,
                max_tokens: 512,
                system_prompt: "You are a helpful assistant.".to_string(),
            },
        )
    }

    #[test]
    fn system_entry_moves_to_top_level_field() {
        let request = provider().build_request(&transcript()).unwrap();

        assert_eq!(request.url, "https://api.anthropic.com/v1/messages");
        assert_eq!(request.body["system"], "Speak like a pirate.");
        let messages = request.body["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert!(messages.iter().all(|m| m["role"] != "system"));
        assert_eq!(messages[0]["content"], "Hello");
        assert_eq!(messages[1]["role"], "assistant");
        assert_eq!(messages[2]["content"], "Where to?");
        assert_eq!(request.header("anthropic-version"), Some(ANTHROPIC_VERSION));
        assert_eq!(request.header("x-api-key"), Some("key"));
    }

    #[test]
    fn default_system_prompt_fills_the_gap() {
        let (system, messages) = split_system(&[(Role::User, "Hi".to_string())], "fallback");
        assert_eq!(system, "fallback");
        assert_eq!(messages, vec![Message::new(Role::User, "Hi")]);
    }

    #[test]
    fn later_system_entry_replaces_earlier_one() {
        let transcript = vec![
            (Role::System, "first".to_string()),
            (Role::User, "hi".to_string()),
            (Role::System, "second".to_string()),
        ];
        let (system, messages) = split_system(&transcript, "default");
        assert_eq!(system, "second");
        assert_eq!(messages, vec![Message::new(Role::User, "hi")]);
    }

    #[test]
    fn only_content_block_deltas_produce_text() {
        let mut decoder = AnthropicDecoder;
        assert_eq!(decoder.decode_line("event: content_block_delta"), Decoded::Skip);
        assert_eq!(
            decoder.decode_line(r#"data: {"type":"message_start","message":{"id":"m1"}}"#),
            Decoded::Skip
        );
        let delta = r#"data: {"type":"content_block_delta","delta":{"text":"Arr"}}"#;
        assert_eq!(decoder.decode_line(delta), Decoded::Fragment("Arr".to_string()));
        assert_eq!(decoder.decode_line("data: not-json"), Decoded::Skip);
        assert_eq!(decoder.decode_line(r#"data: {"type":"message_stop"}"#), Decoded::Done);
        assert_eq!(decoder.decode_line("data: [DONE]"), Decoded::Done);
    }
}
