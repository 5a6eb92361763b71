//! Scripted upstream used by unit tests to count and shape upstream calls.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{ AtomicUsize, Ordering };

use super::{ ChatClient, ChunkStream, Completion, StreamChunk };
use crate::error::RelayError;
use crate::models::chat::Turn;

#[derive(Debug, Clone)]
pub enum Step {
    Delta(&'static str),
    Empty,
    Done,
    Fail(&'static str),
}

pub struct ScriptedClient {
    steps: Vec<Step>,
    open_error: Option<&'static str>,
    completion_error: Option<&'static str>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps,
            open_error: None,
            completion_error: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_to_open(message: &'static str) -> Self {
        Self { open_error: Some(message), ..Self::new(Vec::new()) }
    }

    pub fn failing_completion(message: &'static str) -> Self {
        Self { completion_error: Some(message), ..Self::new(Vec::new()) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// The text a non-streaming call would return: every scripted delta up to
    /// the first terminal step.
    fn full_text(&self) -> String {
        self.steps
            .iter()
            .take_while(|step| matches!(step, Step::Delta(_) | Step::Empty))
            .filter_map(|step| match step {
                Step::Delta(text) => Some(*text),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ChatClient for ScriptedClient {
    async fn complete(&self, _api_key: &str, _turns: &[Turn]) -> Result<Completion, RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.completion_error {
            return Err(RelayError::Upstream(message.to_string()));
        }
        Ok(Completion {
            message: Turn::assistant(self.full_text()),
            usage: json!({ "prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8 }),
        })
    }

    async fn complete_stream(
        &self,
        _api_key: &str,
        _turns: &[Turn]
    ) -> Result<ChunkStream, RelayError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.open_error {
            return Err(RelayError::Upstream(message.to_string()));
        }
        let items: Vec<Result<StreamChunk, RelayError>> = self.steps
            .iter()
            .map(|step| match step {
                Step::Delta(text) => Ok(StreamChunk::delta(*text)),
                Step::Empty => Ok(StreamChunk::default()),
                Step::Done => Ok(StreamChunk::sentinel()),
                Step::Fail(message) => Err(RelayError::Upstream(message.to_string())),
            })
            .collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }

    fn get_model(&self) -> String {
        "scripted".to_string()
    }
}
