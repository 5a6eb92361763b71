use log::warn;

use crate::models::chat::{ ChatMessage, Role, Turn };
use crate::models::relay::RelayFrame;
use crate::sse::{ data_payload, LineBuffer };

pub const NO_RESPONSE_MESSAGE: &str = "I'm sorry, I couldn't generate a response. Please try again.";
pub const ERROR_RESPONSE_MESSAGE: &str =
    "I'm sorry, I encountered an error while processing your request. Please try again later.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Completed,
    Failed(String),
}

/// Result of draining one relayed stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    pub content: String,
    pub outcome: StreamOutcome,
}

impl Reconstruction {
    pub fn is_complete(&self) -> bool {
        self.outcome == StreamOutcome::Completed
    }

    /// The assistant message to persist. Partial content wins over an error,
    /// so whatever arrived before a failure is kept.
    pub fn into_message(self) -> ChatMessage {
        if !self.content.is_empty() {
            return ChatMessage::new(Role::Assistant, self.content);
        }
        match self.outcome {
            StreamOutcome::Completed => ChatMessage::new(Role::Assistant, NO_RESPONSE_MESSAGE),
            StreamOutcome::Failed(_) => ChatMessage::error(ERROR_RESPONSE_MESSAGE),
        }
    }

    pub fn into_turn(self) -> Turn {
        self.into_message().turn()
    }
}

/// Rebuilds one assistant message from relayed event-stream bytes.
#[derive(Debug, Default)]
pub struct StreamReconstructor {
    lines: LineBuffer,
    content: String,
    outcome: Option<StreamOutcome>,
}

impl StreamReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a body chunk and returns the deltas it completed, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut deltas = Vec::new();
        if self.is_finished() {
            return deltas;
        }
        self.lines.push(chunk);
        while let Some(line) = self.lines.next_line() {
            if let Some(delta) = self.apply_line(line) {
                deltas.push(delta);
            }
            if self.is_finished() {
                break;
            }
        }
        deltas
    }

    fn apply_line(&mut self, line: Result<String, std::str::Utf8Error>) -> Option<String> {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("Skipping undecodable stream line: {}", e);
                return None;
            }
        };
        let data = data_payload(&line)?;
        match RelayFrame::decode(data) {
            Ok(Some(RelayFrame::Delta(delta))) => {
                self.content.push_str(&delta);
                Some(delta)
            }
            Ok(Some(RelayFrame::Done)) => {
                self.outcome = Some(StreamOutcome::Completed);
                None
            }
            Ok(Some(RelayFrame::Error(message))) => {
                warn!("Relay reported a stream error: {}", message);
                self.outcome = Some(StreamOutcome::Failed(message));
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!("Error parsing streaming data: {} ({})", e, data);
                None
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Closes out a body that ended normally. A body that ends before any
    /// terminal frame counts as a failure.
    pub fn finish(mut self) -> Reconstruction {
        if !self.is_finished() {
            if let Some(line) = self.lines.take_remainder() {
                self.apply_line(line);
            }
        }
        let outcome = self.outcome.unwrap_or_else(|| {
            StreamOutcome::Failed("stream ended before completion".to_string())
        });
        Reconstruction { content: self.content, outcome }
    }

    /// Closes out a body cut short by a transport failure.
    pub fn fail(self, reason: impl Into<String>) -> Reconstruction {
        let outcome = self.outcome.unwrap_or_else(|| StreamOutcome::Failed(reason.into()));
        Reconstruction { content: self.content, outcome }
    }
}
