//! Read-only projections of a session's messages for export and history views.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::str::FromStr;

use crate::db::models::{Message, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Txt,
}

impl ExportFormat {
    pub fn default_file_name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "conversation.json",
            ExportFormat::Txt => "conversation.txt",
        }
    }

    pub fn render(&self, messages: &[Message]) -> Result<String, serde_json::Error> {
        match self {
            ExportFormat::Json => to_json(messages),
            ExportFormat::Txt => Ok(to_transcript(messages)),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "txt" | "text" => Ok(ExportFormat::Txt),
            other => Err(format!("unsupported export format '{}'", other)),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExportRecord<'a> {
    pub role: Role,
    pub content: &'a str,
    pub created_at: String,
}

pub fn records(messages: &[Message]) -> Vec<ExportRecord<'_>> {
    messages
        .iter()
        .map(|m| ExportRecord {
            role: m.role,
            content: &m.content,
            created_at: stamp(&m.created_at),
        })
        .collect()
}

pub fn to_json(messages: &[Message]) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&records(messages))
}

/// `[created_at] ROLE: content`, one block per message.
pub fn to_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for m in messages {
        out.push_str(&format!(
            "[{}] {}: {}\n\n",
            stamp(&m.created_at),
            m.role.as_str().to_uppercase(),
            m.content
        ));
    }
    out
}

pub fn to_history(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("[{}] {}: {}", stamp(&m.created_at), m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn stamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}
