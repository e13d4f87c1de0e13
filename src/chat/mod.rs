//! Send a user turn, stream the reply, record the result.

use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::{MessageStore, Role, StoreError};
use crate::llm::stream::FragmentStream;
use crate::llm::{LlmClient, LlmError, StreamEvent};

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Llm(#[from] LlmError),
}

#[derive(Debug)]
pub enum ChatEvent {
    Fragment(String),
    /// The assistant reply has been stored.
    Completed { message_id: i64, content: String },
    Failed(ChatError),
    Cancelled,
}

pub struct ChatService {
    store: MessageStore,
    client: LlmClient,
}

impl ChatService {
    pub fn new(store: MessageStore, client: LlmClient) -> Self {
        Self { store, client }
    }

    pub fn store(&self) -> &MessageStore {
        &self.store
    }

    pub fn client(&self) -> &LlmClient {
        &self.client
    }

    /// Persists `user_text`, then streams the configured backend's reply to
    /// the whole transcript.
    ///
    /// The assistant turn is written only when the backend finishes
    /// normally; a failed or cancelled reply leaves the transcript ending
    /// with the user message.
    pub fn send_and_stream(
        &self,
        session_id: Uuid,
        user_text: &str,
        cancel: CancellationToken,
    ) -> Result<ReplyStream, ChatError> {
        self.store.append_message(session_id, Role::User.as_str(), user_text)?;
        let transcript = self.store.list_messages_as_pairs(session_id)?;

        let fragments = self.client.stream_chat(&transcript, cancel);
        Ok(ReplyStream {
            fragments,
            store: self.store.clone(),
            session_id,
            reply: String::new(),
            finished: false,
        })
    }
}

/// Forwards fragments unbuffered and stores the joined reply on completion.
pub struct ReplyStream {
    fragments: FragmentStream,
    store: MessageStore,
    session_id: Uuid,
    reply: String,
    finished: bool,
}

impl ReplyStream {
    /// Drains the stream; `Ok(None)` when it was cancelled.
    pub async fn into_reply(mut self) -> Result<Option<String>, ChatError> {
        while let Some(event) = self.next().await {
            match event {
                ChatEvent::Fragment(_) => {}
                ChatEvent::Completed { content, .. } => return Ok(Some(content)),
                ChatEvent::Failed(e) => return Err(e),
                ChatEvent::Cancelled => return Ok(None),
            }
        }
        Ok(None)
    }

    // One blocking insert per turn, on the single writer's connection.
    fn complete(&mut self) -> ChatEvent {
        let content = std::mem::take(&mut self.reply);
        match self
            .store
            .append_message(self.session_id, Role::Assistant.as_str(), &content)
        {
            Ok(message_id) => {
                info!("Stored assistant reply {} ({} bytes)", message_id, content.len());
                ChatEvent::Completed { message_id, content }
            }
            Err(e) => ChatEvent::Failed(e.into()),
        }
    }
}

impl Stream for ReplyStream {
    type Item = ChatEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.finished {
            return Poll::Ready(None);
        }

        let event = match Pin::new(&mut this.fragments).poll_next(cx) {
            Poll::Ready(Some(event)) => event,
            Poll::Ready(None) => {
                this.finished = true;
                return Poll::Ready(None);
            }
            Poll::Pending => return Poll::Pending,
        };

        let out = match event {
            StreamEvent::Fragment(text) => {
                this.reply.push_str(&text);
                ChatEvent::Fragment(text)
            }
            StreamEvent::Completed => {
                this.finished = true;
                this.complete()
            }
            StreamEvent::Failed(e) => {
                this.finished = true;
                warn!("Reply failed, discarding {} bytes of partial output", this.reply.len());
                ChatEvent::Failed(e.into())
            }
            StreamEvent::Cancelled => {
                this.finished = true;
                ChatEvent::Cancelled
            }
        };
        Poll::Ready(Some(out))
    }
}
