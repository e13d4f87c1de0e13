pub mod anthropic;
pub mod decode;
pub mod models;
pub mod ollama;
pub mod openai;
pub mod stream;
pub mod transport;

use anthropic::{AnthropicDecoder, AnthropicProvider};
use ollama::{OllamaDecoder, OllamaProvider};
use openai::{OpenAiDecoder, OpenAiProvider};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::{AppConfig, Mode};
use crate::db::Role;
use decode::FrameDecoder;
use models::ChatOptions;
use stream::{spawn_stream, FragmentStream};
use transport::{HttpRequest, HttpTransport, ReqwestTransport};

pub use stream::StreamEvent;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing credential: set {0} or the api_key in the config file")]
    MissingCredential(&'static str),
    #[error("Network Error: {0}")]
    Transport(String),
    #[error("API Error {status}: {body}")]
    Remote { status: u16, body: String },
}

/// One backend, chosen once from the configured mode.
#[derive(Debug, Clone)]
pub enum Provider {
    Local(OllamaProvider),
    OpenAi(OpenAiProvider),
    Anthropic(AnthropicProvider),
}

impl Provider {
    pub fn from_config(config: &AppConfig) -> Self {
        let options = ChatOptions::from(&config.llm);
        match config.llm.mode {
            Mode::Local => Provider::Local(OllamaProvider::new(&config.llm.ollama, options)),
            Mode::OpenAi => Provider::OpenAi(OpenAiProvider::new(&config.llm.openai, options)),
            Mode::Anthropic => {
                Provider::Anthropic(AnthropicProvider::new(&config.llm.anthropic, options))
            }
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Provider::Local(_) => "ollama",
            Provider::OpenAi(_) => "openai",
            Provider::Anthropic(_) => "anthropic",
        }
    }

    pub fn model(&self) -> &str {
        match self {
            Provider::Local(p) => p.model(),
            Provider::OpenAi(p) => p.model(),
            Provider::Anthropic(p) => p.model(),
        }
    }

    fn prepare(
        &self,
        transcript: &[(Role, String)],
    ) -> Result<(HttpRequest, Box<dyn FrameDecoder>), LlmError> {
        let (request, decoder): (HttpRequest, Box<dyn FrameDecoder>) = match self {
            Provider::Local(p) => (p.build_request(transcript), Box::new(OllamaDecoder::default())),
            Provider::OpenAi(p) => (p.build_request(transcript)?, Box::new(OpenAiDecoder)),
            Provider::Anthropic(p) => (p.build_request(transcript)?, Box::new(AnthropicDecoder)),
        };
        Ok((request, decoder))
    }
}

/// A provider bound to the transport it talks through.
#[derive(Clone)]
pub struct LlmClient {
    provider: Provider,
    transport: Arc<dyn HttpTransport>,
}

impl LlmClient {
    pub fn new(provider: Provider, transport: Arc<dyn HttpTransport>) -> Self {
        Self { provider, transport }
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Issues one request and streams its reply.
    ///
    /// Credential problems surface as the first event without any network
    /// I/O. Cancelling `cancel` closes the connection and ends the stream
    /// with [`StreamEvent::Cancelled`].
    pub fn stream_chat(
        &self,
        transcript: &[(Role, String)],
        cancel: CancellationToken,
    ) -> FragmentStream {
        let (request, decoder) = match self.provider.prepare(transcript) {
            Ok(prepared) => prepared,
            Err(e) => return FragmentStream::failed(e),
        };

        info!(
            "Streaming {} turn(s) to {} ({})",
            transcript.len(),
            self.provider.name(),
            self.provider.model()
        );
        spawn_stream(self.transport.clone(), request, decoder, cancel)
    }
}

/// Builds clients from configuration snapshots.
pub struct ProviderFactory;

impl ProviderFactory {
    pub fn create(config: &AppConfig) -> Result<LlmClient, LlmError> {
        let transport = ReqwestTransport::new(Duration::from_secs(config.llm.timeout_secs))?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: &AppConfig, transport: Arc<dyn HttpTransport>) -> LlmClient {
        LlmClient::new(Provider::from_config(config), transport)
    }
}
