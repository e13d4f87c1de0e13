use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::db::Role;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Sampling settings shared by every backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub system_prompt: String,
}

impl From<&LlmConfig> for ChatOptions {
    fn from(cfg: &LlmConfig) -> Self {
        Self {
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            system_prompt: cfg.system_prompt.clone(),
        }
    }
}

pub fn to_messages(transcript: &[(Role, String)]) -> Vec<Message> {
    transcript
        .iter()
        .map(|(role, content)| Message::new(*role, content.clone()))
        .collect()
}

/// Prepends the default system prompt unless the transcript already carries one.
pub fn with_system(transcript: &[(Role, String)], default_prompt: &str) -> Vec<Message> {
    let mut messages = to_messages(transcript);
    if !messages.iter().any(|m| m.role == Role::System) {
        messages.insert(0, Message::new(Role::System, default_prompt));
    }
    messages
}
