use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::config::Mode;
use crate::db::export::ExportFormat;

#[derive(Parser)]
#[command(
    name = "colloquy",
    version,
    about = "Chat with local or hosted LLMs from the terminal",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the config file path globally
    #[arg(short, long, global = true, default_value = "config.yaml")]
    pub config: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start a new session and enter the interactive chat REPL
    Chat {
        /// Backend to use instead of the configured one (local, openai, anthropic)
        #[arg(short, long)]
        mode: Option<Mode>,
    },

    /// List recorded sessions
    Sessions,

    /// Print the timestamped history of a session
    History {
        /// The UUID of the session
        session: Uuid,
    },

    /// Export a session as JSON or plain text
    Export {
        /// The UUID of the session to export
        session: Uuid,
        /// json or txt
        #[arg(short, long, default_value = "json")]
        format: ExportFormat,
        /// The path to the output file (defaults to conversation.json / conversation.txt)
        #[arg(short, long)]
        output: Option<String>,
    },
}
