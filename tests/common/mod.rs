#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use colloquy::config::{AppConfig, Mode};
use colloquy::llm::transport::{ByteStream, HttpRequest, HttpTransport};
use colloquy::llm::LlmError;
use futures_util::{stream, Stream, StreamExt};
use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

pub enum FakeResponse {
    /// Body chunks, optionally followed by a connection that never closes.
    Body {
        chunks: Vec<Result<Vec<u8>, LlmError>>,
        hang: bool,
    },
    Reject(LlmError),
}

impl FakeResponse {
    pub fn lines(body: &str) -> Self {
        FakeResponse::Body {
            chunks: vec![Ok(body.as_bytes().to_vec())],
            hang: false,
        }
    }

    pub fn chunks(parts: &[&str]) -> Self {
        FakeResponse::Body {
            chunks: parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect(),
            hang: false,
        }
    }
}

/// Scripted transport that counts calls and remembers what it was sent.
#[derive(Default)]
pub struct FakeTransport {
    calls: AtomicUsize,
    responses: Mutex<VecDeque<FakeResponse>>,
    requests: Mutex<Vec<HttpRequest>>,
    body_dropped: Arc<AtomicBool>,
}

impl FakeTransport {
    pub fn new(responses: Vec<FakeResponse>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<HttpRequest> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn body_dropped(&self) -> bool {
        self.body_dropped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn post_stream(&self, request: HttpRequest) -> Result<ByteStream, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);

        let response = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FakeResponse::Body {
                chunks: Vec::new(),
                hang: false,
            });

        match response {
            FakeResponse::Reject(err) => Err(err),
            FakeResponse::Body { chunks, hang } => {
                let body = stream::iter(chunks.into_iter().map(|c| c.map(Bytes::from)));
                let inner: ByteStream = if hang {
                    Box::pin(body.chain(stream::pending()))
                } else {
                    Box::pin(body)
                };
                Ok(Box::pin(TrackedBody {
                    inner,
                    dropped: self.body_dropped.clone(),
                }))
            }
        }
    }
}

/// Flags when the consumer lets go of the response body.
struct TrackedBody {
    inner: ByteStream,
    dropped: Arc<AtomicBool>,
}

impl Stream for TrackedBody {
    type Item = Result<Bytes, LlmError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

impl Drop for TrackedBody {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

pub fn config_for(mode: Mode) -> AppConfig {
    let mut config = AppConfig::default().with_mode(mode);
    config.llm.openai.api_key = "sk-test".to_string();
    config.llm.anthropic.api_key = "anthropic-test".to_string();
    config
}

pub fn openai_delta(text: &str) -> String {
    format!(
        "data: {}\n\n",
        serde_json::json!({"choices": [{"delta": {"content": text}}]})
    )
}
