use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use reqwest::Client;
use std::pin::Pin;
use std::time::Duration;
use tracing::info;

use crate::llm::LlmError;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// A fully built streaming POST.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: serde_json::Value,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Issues the request and hands back the response body as it arrives.
///
/// Implementations map non-success statuses to [`LlmError::Remote`] and
/// connection failures to [`LlmError::Transport`]. Dropping the returned
/// stream closes the connection.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn post_stream(&self, request: HttpRequest) -> Result<ByteStream, LlmError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// `idle_timeout` bounds connecting and each gap between body chunks,
    /// never the whole reply, so a long generation that keeps streaming is
    /// not cut off.
    pub fn new(idle_timeout: Duration) -> Result<Self, LlmError> {
        let client = Client::builder()
            .connect_timeout(idle_timeout)
            .read_timeout(idle_timeout)
            .build()
            .map_err(|e| LlmError::Transport(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post_stream(&self, request: HttpRequest) -> Result<ByteStream, LlmError> {
        info!("POST {}", request.url);

        let mut builder = self.client.post(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(*name, value);
        }

        let response = builder
            .json(&request.body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::Remote {
                status: status.as_u16(),
                body: text,
            });
        }

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| LlmError::Transport(e.to_string())));
        Ok(Box::pin(stream))
    }
}
