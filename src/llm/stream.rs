use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::llm::decode::{Decoded, FrameDecoder, LineSplitter};
use crate::llm::transport::{HttpRequest, HttpTransport};
use crate::llm::LlmError;

/// Fragments in network order, then exactly one terminal event.
#[derive(Debug)]
pub enum StreamEvent {
    Fragment(String),
    Completed,
    Failed(LlmError),
    Cancelled,
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Fragment(_))
    }
}

/// Single-pass view over one in-flight request.
///
/// The request runs on its own task; dropping this handle closes the
/// connection even while the backend is only sending frames that carry no
/// text.
pub struct FragmentStream {
    rx: mpsc::UnboundedReceiver<StreamEvent>,
    finished: bool,
}

impl FragmentStream {
    fn new(rx: mpsc::UnboundedReceiver<StreamEvent>) -> Self {
        Self { rx, finished: false }
    }

    /// A stream that has already failed, without touching the network.
    pub fn failed(err: LlmError) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(StreamEvent::Failed(err));
        Self::new(rx)
    }

    /// Drains the stream and joins the fragments.
    pub async fn collect_text(mut self) -> Result<Option<String>, LlmError> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event {
                StreamEvent::Fragment(piece) => text.push_str(&piece),
                StreamEvent::Completed => return Ok(Some(text)),
                StreamEvent::Failed(e) => return Err(e),
                StreamEvent::Cancelled => return Ok(None),
            }
        }
        Ok(None)
    }
}

impl Stream for FragmentStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.rx.poll_recv(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Poll::Ready(Some(event))
            }
            // The worker went away without saying how it ended.
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(Some(StreamEvent::Failed(LlmError::Transport(
                    "stream worker exited unexpectedly".to_string(),
                ))))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Starts the request on a fresh task and returns the consumer side.
pub(crate) fn spawn_stream(
    transport: Arc<dyn HttpTransport>,
    request: HttpRequest,
    decoder: Box<dyn FrameDecoder>,
    cancel: CancellationToken,
) -> FragmentStream {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let outcome = drive(transport, request, decoder, cancel, &tx).await;
        let _ = tx.send(outcome);
    });
    FragmentStream::new(rx)
}

async fn drive(
    transport: Arc<dyn HttpTransport>,
    request: HttpRequest,
    mut decoder: Box<dyn FrameDecoder>,
    cancel: CancellationToken,
    tx: &mpsc::UnboundedSender<StreamEvent>,
) -> StreamEvent {
    let mut body = tokio::select! {
        biased;
        _ = cancel.cancelled() => return StreamEvent::Cancelled,
        _ = tx.closed() => return StreamEvent::Cancelled,
        res = transport.post_stream(request) => match res {
            Ok(body) => body,
            Err(e) => return StreamEvent::Failed(e),
        },
    };

    let mut lines = LineSplitter::default();
    loop {
        // Dropping `body` on any return below closes the connection.
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return StreamEvent::Cancelled,
            _ = tx.closed() => {
                debug!("Consumer dropped the stream, closing connection");
                return StreamEvent::Cancelled;
            }
            chunk = body.next() => chunk,
        };

        match chunk {
            Some(Ok(bytes)) => {
                for line in lines.push(&bytes) {
                    if let Some(outcome) = forward(decoder.as_mut(), &line, tx) {
                        return outcome;
                    }
                }
            }
            Some(Err(e)) => return StreamEvent::Failed(e),
            None => {
                if let Some(line) = lines.finish() {
                    if let Some(outcome) = forward(decoder.as_mut(), &line, tx) {
                        return outcome;
                    }
                }
                decoder.finish();
                return StreamEvent::Completed;
            }
        }
    }
}

/// `Some` when the loop must stop.
fn forward(
    decoder: &mut dyn FrameDecoder,
    line: &str,
    tx: &mpsc::UnboundedSender<StreamEvent>,
) -> Option<StreamEvent> {
    match decoder.decode_line(line) {
        Decoded::Fragment(text) => {
            if tx.send(StreamEvent::Fragment(text)).is_err() {
                debug!("Consumer dropped the stream, closing connection");
                return Some(StreamEvent::Cancelled);
            }
            None
        }
        Decoded::Skip => None,
        Decoded::Done => Some(StreamEvent::Completed),
    }
}
