//! Error types for vnchat-core

use thiserror::Error;

use crate::{orchestrator::TurnOutput, service::Agent, transcript::MessageRef};

/// Result type alias using vnchat-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a chat session
#[derive(Error, Debug)]
pub enum Error {
    /// Narration or dialogue generation failed; the turn was aborted
    #[error("{agent} generation failed: {message}")]
    Generation { agent: Agent, message: String },

    /// The summarization service failed
    #[error("Summary update failed: {0}")]
    Summary(String),

    /// The extraction service call failed
    #[error("Fact extraction failed: {0}")]
    Extraction(String),

    /// Extraction output was not a JSON array of records
    #[error("Malformed extraction output: {0}")]
    MalformedExtraction(String),

    /// Version index outside `0..len`
    #[error("Version index {index} out of range (reply has {len} versions)")]
    OutOfRange { index: usize, len: usize },

    #[error("Unknown message {0}")]
    UnknownMessage(MessageRef),

    #[error("Message is not a user message")]
    NotAUserMessage,

    #[error("Message is not a character reply")]
    NotAReply,

    /// A reply with zero versions was used where a version is required
    #[error("Reply has no versions yet")]
    IncompleteReply,

    /// Memory update failed after the turn's text was fully produced
    #[error("Memory update failed: {source}")]
    MemoryUpdate {
        output: Box<TurnOutput>,
        #[source]
        source: Box<Error>,
    },

    /// A turn was requested while another is still running
    #[error("A turn is already in progress")]
    TurnInProgress,

    /// An error from the generation client layer
    #[error(transparent)]
    Ai(#[from] vnchat_ai::Error),
}

impl Error {
    /// Whether the turn's narration/dialogue content was lost
    pub fn is_generation_failure(&self) -> bool {
        matches!(self, Error::Generation { .. })
    }

    /// Whether only long-term memory failed to update
    pub fn is_memory_failure(&self) -> bool {
        matches!(
            self,
            Error::MemoryUpdate { .. } | Error::Summary(_) | Error::Extraction(_)
        )
    }

    /// The produced turn output carried by a memory failure
    pub fn turn_output(&self) -> Option<&TurnOutput> {
        match self {
            Error::MemoryUpdate { output, .. } => Some(output),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classification() {
        let generation = Error::Generation {
            agent: Agent::Narrator,
            message: "connection refused".into(),
        };
        assert!(generation.is_generation_failure());
        assert!(!generation.is_memory_failure());

        let memory = Error::MemoryUpdate {
            output: Box::new(TurnOutput::default()),
            source: Box::new(Error::Summary("timeout".into())),
        };
        assert!(memory.is_memory_failure());
        assert!(!memory.is_generation_failure());
        assert!(memory.turn_output().is_some());
        assert_eq!(memory.to_string(), "Memory update failed: Summary update failed: timeout");
    }

    #[test]
    fn test_out_of_range_message() {
        let e = Error::OutOfRange { index: 3, len: 2 };
        assert_eq!(e.to_string(), "Version index 3 out of range (reply has 2 versions)");
    }
}
