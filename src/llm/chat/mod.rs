pub mod openai;
#[cfg(test)]
pub mod mock;

use async_trait::async_trait;
use futures::{ Stream, Future };
use serde_json::Value;
use std::pin::Pin;
use std::sync::Arc;
use super::LlmConfig;
use self::openai::OpenAIChatClient;
use crate::error::RelayError;
use crate::models::chat::Turn;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// One upstream event, reduced to what the relay forwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamChunk {
    pub delta_content: Option<String>,
    pub is_final: bool,
}

impl StreamChunk {
    pub fn delta(content: impl Into<String>) -> Self {
        Self { delta_content: Some(content.into()), is_final: false }
    }

    pub fn sentinel() -> Self {
        Self { delta_content: None, is_final: true }
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<StreamChunk, RelayError>> + Send>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub message: Turn,
    pub usage: Value,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, api_key: &str, turns: &[Turn]) -> Result<Completion, RelayError>;

    /// Opens a streaming completion. Failures after the stream is handed back
    /// arrive as `Err` items, never as a silently truncated stream.
    async fn complete_stream(
        &self,
        api_key: &str,
        turns: &[Turn]
    ) -> Result<ChunkStream, RelayError>;

    fn get_model(&self) -> String;
}

/// Runs `response_fn` on its own task and exposes what it sends as a stream.
/// Dropping the stream closes the channel, which the task observes through
/// `Sender::closed`.
pub fn create_streaming_response<F, Fut>(response_fn: F) -> ChunkStream
    where
        F: FnOnce(mpsc::Sender<Result<StreamChunk, RelayError>>) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static
{
    let (tx, rx) = mpsc::channel(32);

    tokio::spawn(async move {
        response_fn(tx).await;
    });

    Box::pin(ReceiverStream::new(rx))
}

pub fn new_client(config: &LlmConfig) -> Result<Arc<dyn ChatClient>, RelayError> {
    let client = OpenAIChatClient::from_config(config)?;
    Ok(Arc::new(client))
}
