use serde_json::json;
use tracing::{debug, warn};

use crate::config::OllamaConfig;
use crate::db::Role;
use crate::llm::decode::{Decoded, FrameDecoder};
use crate::llm::models::{with_system, ChatOptions};
use crate::llm::transport::HttpRequest;

/// Local model server speaking newline-delimited JSON.
#[derive(Debug, Clone)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    options: ChatOptions,
}

impl OllamaProvider {
    pub fn new(config: &OllamaConfig, options: ChatOptions) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            options,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn build_request(&self, transcript: &[(Role, String)]) -> HttpRequest {
        let messages = with_system(transcript, &self.options.system_prompt);

        HttpRequest {
            url: format!("{}/api/chat", self.base_url),
            headers: Vec::new(),
            body: json!({
                "model": self.model,
                "messages": messages,
                "stream": true,
                "options": {
                    "temperature": self.options.temperature,
                    "num_predict": self.options.max_tokens
                }
            }),
        }
    }
}

/// One JSON object per line; the stream has no sentinel and ends when the
/// server closes the connection.
#[derive(Debug, Default)]
pub struct OllamaDecoder {
    saw_done: bool,
}

impl FrameDecoder for OllamaDecoder {
    fn decode_line(&mut self, line: &str) -> Decoded {
        let line = line.trim();
        if line.is_empty() {
            return Decoded::Skip;
        }

        let json: serde_json::Value = match serde_json::from_str(line) {
            Ok(json) => json,
            Err(e) => {
                debug!("Skipping unparseable Ollama line: {}", e);
                return Decoded::Skip;
            }
        };

        if json["done"].as_bool() == Some(true) {
            self.saw_done = true;
        }

        match json["message"]["content"].as_str() {
            Some(content) if !content.is_empty() => Decoded::Fragment(content.to_string()),
            _ => Decoded::Skip,
        }
    }

    fn finish(&mut self) {
        if !self.saw_done {
            warn!("Ollama closed the stream without a final done marker; reply may be truncated");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(input: &str) -> Vec<String> {
        let mut decoder = OllamaDecoder::default();
        input
            .lines()
            .filter_map(|line| match decoder.decode_line(line) {
                Decoded::Fragment(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let input = concat!(
            "{\"message\":{\"content\":\"He\"}}\n",
            "not json\n",
            "{\"message\":{\"content\":\"llo\"}}\n",
        );
        assert_eq!(decode_all(input), vec!["He", "llo"]);
    }

    #[test]
    fn empty_content_and_done_frames_yield_nothing() {
        let mut decoder = OllamaDecoder::default();
        assert_eq!(
            decoder.decode_line(r#"{"message":{"role":"assistant","content":""},"done":true}"#),
            Decoded::Skip
        );
        assert!(decoder.saw_done);
    }

    #[test]
    fn request_injects_default_system_prompt() {
        let provider = OllamaProvider::new(
            &OllamaConfig {
                base_url: "http://localhost:11434/".to_string(),
                model: "llama3".to_string(),
            },
            ChatOptions {
                temperature: 0.3,
                max_tokens: 64,
                system_prompt: "Be terse.".to_string(),
            },
        );

        let request = provider.build_request(&[(Role::User, "hi".to_string())]);
        assert_eq!(request.url, "http://localhost:11434/api/chat");
        assert_eq!(request.body["stream"], true);
        assert_eq!(request.body["model"], "llama3");
        assert_eq!(request.body["options"]["num_predict"], 64);
        assert_eq!(request.body["messages"][0]["role"], "system");
        assert_eq!(request.body["messages"][0]["content"], "Be terse.");
        assert_eq!(request.body["messages"][1]["content"], "hi");
    }
}
