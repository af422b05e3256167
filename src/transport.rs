//! Chat backend transport
//!
//! A request yields a finite stream of cumulative text snapshots that ends
//! with exactly one terminal item. The transport never retries and never
//! touches the conversation.

mod http;

pub use http::HttpTransport;

use crate::conversation::Turn;
use crate::error::TransportError;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Body of `POST /api/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatRequest {
    pub message: String,
    /// Committed turns only, in order
    pub history: Vec<Turn>,
    pub user_id: String,
}

/// One item of a response stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Full text received so far (not a delta)
    Chunk(String),
    /// Stream ended cleanly
    Done { final_text: Option<String> },
    /// Stream ended with an error
    Failed(TransportError),
}

impl StreamEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Chunk(_))
    }
}

pub type ResponseStream = BoxStream<'static, StreamEvent>;

/// Client for the chat backend
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issue one request and return its response stream
    async fn send(&self, request: &ChatRequest) -> ResponseStream;
}

#[async_trait]
impl<T: ChatTransport + ?Sized> ChatTransport for Arc<T> {
    async fn send(&self, request: &ChatRequest) -> ResponseStream {
        (**self).send(request).await
    }
}

/// Stream holding a single failure
pub fn failed_stream(error: TransportError) -> ResponseStream {
    futures::stream::once(async move { StreamEvent::Failed(error) }).boxed()
}

/// Logging wrapper for chat transports
pub struct LoggingTransport<T> {
    inner: T,
}

impl<T: ChatTransport> LoggingTransport<T> {
    pub fn new(inner: T) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<T: ChatTransport> ChatTransport for LoggingTransport<T> {
    async fn send(&self, request: &ChatRequest) -> ResponseStream {
        let start = Instant::now();
        tracing::info!(
            history_len = request.history.len(),
            message_len = request.message.len(),
            "Chat request started"
        );

        let stream = self.inner.send(request).await;
        let mut chunks = 0usize;

        stream
            .inspect(move |event| match event {
                StreamEvent::Chunk(_) => chunks += 1,
                StreamEvent::Done { final_text } => {
                    tracing::info!(
                        duration_ms = %start.elapsed().as_millis(),
                        chunks,
                        final_len = final_text.as_ref().map_or(0, String::len),
                        "Chat request completed"
                    );
                }
                StreamEvent::Failed(e) => {
                    tracing::error!(
                        duration_ms = %start.elapsed().as_millis(),
                        chunks,
                        kind = %e.kind,
                        status = ?e.status,
                        error = %e.message,
                        "Chat request failed"
                    );
                }
            })
            .boxed()
    }
}
