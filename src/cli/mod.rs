pub mod commands;

use futures_util::StreamExt;
use std::io::{self, BufRead, Write};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::chat::{ChatError, ChatEvent, ChatService};
use crate::cli::commands::Commands;
use crate::config::{AppConfig, Mode};
use crate::db::{export, MessageStore, StoreError};
use crate::llm::{LlmError, ProviderFactory};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to load configuration: {0}")]
    Config(#[from] ::config::ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("Session {0} not found")]
    SessionNotFound(Uuid),
    #[error("Export failed: {0}")]
    Export(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub async fn run_cli(command: Commands, config_path: String) -> Result<(), CliError> {
    let config = AppConfig::load(&config_path)?;

    match command {
        Commands::Chat { mode } => {
            let config = match mode {
                Some(mode) => config.with_mode(mode),
                None => config,
            };
            run_repl(config).await
        }
        Commands::Sessions => {
            let store = MessageStore::open(&config.database)?;
            let sessions = store.list_sessions()?;
            if sessions.is_empty() {
                println!("No sessions found.");
            } else {
                println!("{:<38} | {}", "ID", "Created At");
                println!("{:-<38}-+-{:-<25}", "", "");
                for s in sessions {
                    println!("{:<38} | {}", s.id.to_string(), s.created_at);
                }
            }
            Ok(())
        }
        Commands::History { session } => {
            let store = MessageStore::open(&config.database)?;
            let messages = load_session(&store, session)?;
            println!("{}", export::to_history(&messages));
            Ok(())
        }
        Commands::Export {
            session,
            format,
            output,
        } => {
            let store = MessageStore::open(&config.database)?;
            let messages = load_session(&store, session)?;

            let export_path = output.unwrap_or_else(|| format.default_file_name().to_string());
            std::fs::write(&export_path, format.render(&messages)?)?;

            println!("Session exported successfully to: {}", export_path);
            Ok(())
        }
    }
}

fn load_session(store: &MessageStore, id: Uuid) -> Result<Vec<crate::db::Message>, CliError> {
    if store.get_session(id)?.is_none() {
        return Err(CliError::SessionNotFound(id));
    }
    Ok(store.list_messages(id)?)
}

// Blocking reads live on their own thread, outside the runtime.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

async fn run_repl(mut config: AppConfig) -> Result<(), CliError> {
    let store = MessageStore::open(&config.database)?;
    let session_id = store.create_session()?;
    let mut chat = ChatService::new(store.clone(), ProviderFactory::create(&config)?);

    println!("--- Colloquy Terminal Chat ---");
    println!("Session: {}", session_id);
    println!("Mode: {} ({})", config.llm.mode, chat.client().provider().model());
    println!("Commands: /mode <local|openai|anthropic>, /history, /exit. Ctrl-C stops a reply.");
    println!("------------------------------");

    let mut input = spawn_stdin_reader();

    loop {
        print!("\nYou> ");
        io::stdout().flush()?;

        let line = tokio::select! {
            line = input.recv() => line,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };
        let text = line.trim();

        if text.is_empty() {
            continue;
        }
        if text == "/exit" || text == "/quit" {
            break;
        }
        if text == "/history" {
            println!("{}", export::to_history(&store.list_messages(session_id)?));
            continue;
        }
        if let Some(arg) = text.strip_prefix("/mode") {
            match arg.parse::<Mode>() {
                Ok(mode) => {
                    // New snapshot, new adapter; the old one is dropped.
                    config = config.with_mode(mode);
                    chat = ChatService::new(store.clone(), ProviderFactory::create(&config)?);
                    println!("Mode: {} ({})", mode, chat.client().provider().model());
                }
                Err(e) => eprintln!("{}", e),
            }
            continue;
        }

        let cancel = CancellationToken::new();
        let mut reply = match chat.send_and_stream(session_id, text, cancel.clone()) {
            Ok(reply) => reply,
            Err(e) => {
                eprintln!("Error: {}", e);
                continue;
            }
        };

        print!("Assistant> ");
        io::stdout().flush()?;

        loop {
            let event = tokio::select! {
                event = reply.next() => event,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    continue;
                }
            };

            match event {
                Some(ChatEvent::Fragment(piece)) => {
                    print!("{}", piece);
                    io::stdout().flush()?;
                }
                Some(ChatEvent::Completed { .. }) => {
                    println!();
                    break;
                }
                Some(ChatEvent::Failed(e)) => {
                    println!();
                    eprintln!("Error: {}", e);
                    break;
                }
                Some(ChatEvent::Cancelled) => {
                    println!("\n[reply cancelled, not saved]");
                    break;
                }
                None => break,
            }
        }
    }

    Ok(())
}
