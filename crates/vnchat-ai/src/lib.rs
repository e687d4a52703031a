//! vnchat-ai: streaming text generation against locally hosted models
//!
//! Wraps Ollama's native API and OpenAI-compatible servers behind a single
//! [`providers::LlmProvider`] trait that yields text fragments as they arrive.

pub mod error;
pub mod models;
pub mod providers;
pub mod stream;
pub mod types;

pub use error::{Error, Result};
pub use stream::{TextBuilder, TextEvent, TextEventStream};
pub use types::*;
