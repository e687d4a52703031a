//! vnchat-core: conversation memory and the two-agent turn pipeline
//!
//! This crate holds the editable transcript, the long-term memory (rolling
//! summary plus extracted facts), context assembly, and the orchestrator that
//! runs a narrator and a character agent for each turn. It has no rendering
//! dependency; interactive surfaces drive a [`ChatSession`] and subscribe to
//! its [`TurnEvent`]s.

pub mod character;
pub mod context;
pub mod error;
pub mod events;
pub mod facts;
mod handle;
pub mod memory;
pub mod orchestrator;
pub mod prompts;
pub mod service;
pub mod session;
pub mod summary;
pub mod transcript;
pub mod utils;

pub use character::{Character, Style};
pub use context::ContextAssembler;
pub use error::{Error, Result};
pub use events::{TurnEvent, TurnKind};
pub use facts::{Fact, FactKind, FactStore};
pub use memory::{MemoryDelta, MemoryManager, MemorySnapshot};
pub use orchestrator::{TurnOrchestrator, TurnOutput, TurnRequest, TurnState};
pub use service::{
    Agent, FragmentStream, GenerationService, LlmGenerationService, ModelEndpoint, RetryConfig,
};
pub use session::{ChatSession, SessionSnapshot, TurnReport};
pub use summary::RollingSummary;
pub use transcript::{Message, MessageRef, Transcript, Version};
