//! Streaming event types and utilities

use crate::types::{Completion, StopReason, Usage};
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use tokio_stream::Stream;

/// Events emitted while a completion streams in
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextEvent {
    /// The server accepted the request
    Start { model: String },
    /// A text fragment
    Delta { delta: String },
    /// Completion finished successfully
    Done {
        stop_reason: Option<StopReason>,
        usage: Usage,
    },
    /// Error occurred; no further events follow
    Error { message: String },
}

impl TextEvent {
    /// Check if this is a terminal event (Done or Error)
    pub fn is_terminal(&self) -> bool {
        matches!(self, TextEvent::Done { .. } | TextEvent::Error { .. })
    }

    /// Get the text fragment if this is a Delta event
    pub fn as_delta(&self) -> Option<&str> {
        match self {
            TextEvent::Delta { delta } => Some(delta),
            _ => None,
        }
    }
}

/// A stream of text events
pub type TextEventStream = Pin<Box<dyn Stream<Item = TextEvent> + Send>>;

/// Builder for assembling a completion from streaming events
#[derive(Debug, Default)]
pub struct TextBuilder {
    text: String,
    usage: Usage,
    stop_reason: Option<StopReason>,
    error: Option<String>,
    finished: bool,
}

impl TextBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a streaming event
    pub fn process_event(&mut self, event: &TextEvent) {
        match event {
            TextEvent::Delta { delta } => self.text.push_str(delta),
            TextEvent::Done { stop_reason, usage } => {
                self.stop_reason = *stop_reason;
                self.usage = usage.clone();
                self.finished = true;
            }
            TextEvent::Error { message } => {
                self.error = Some(message.clone());
            }
            TextEvent::Start { .. } => {}
        }
    }

    /// Text accumulated so far
    pub fn current_text(&self) -> &str {
        &self.text
    }

    /// Whether a Done event has been seen
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The error message, if the stream reported one
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Build the final completion
    pub fn build(self) -> Completion {
        Completion {
            text: self.text,
            usage: self.usage,
            stop_reason: self.stop_reason,
            finished_at: chrono::Utc::now().timestamp_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_accumulates_deltas() {
        let mut builder = TextBuilder::new();
        builder.process_event(&TextEvent::Start {
            model: "llama3".into(),
        });
        builder.process_event(&TextEvent::Delta { delta: "Hi".into() });
        builder.process_event(&TextEvent::Delta {
            delta: " there".into(),
        });
        assert_eq!(builder.current_text(), "Hi there");
        assert!(!builder.is_finished());

        builder.process_event(&TextEvent::Done {
            stop_reason: Some(StopReason::Stop),
            usage: Usage {
                input: 10,
                output: 2,
            },
        });
        assert!(builder.is_finished());

        let completion = builder.build();
        assert_eq!(completion.text, "Hi there");
        assert_eq!(completion.stop_reason, Some(StopReason::Stop));
        assert_eq!(completion.usage.output, 2);
    }

    #[test]
    fn test_builder_records_error() {
        let mut builder = TextBuilder::new();
        builder.process_event(&TextEvent::Delta { delta: "par".into() });
        builder.process_event(&TextEvent::Error {
            message: "connection reset".into(),
        });
        assert_eq!(builder.error(), Some("connection reset"));
        assert_eq!(builder.current_text(), "par");
    }

    #[test]
    fn test_terminal_events() {
        assert!(TextEvent::Error { message: "x".into() }.is_terminal());
        assert!(
            TextEvent::Done {
                stop_reason: None,
                usage: Usage::default()
            }
            .is_terminal()
        );
        assert!(!TextEvent::Delta { delta: "x".into() }.is_terminal());
        assert_eq!(TextEvent::Delta { delta: "x".into() }.as_delta(), Some("x"));
    }
}
