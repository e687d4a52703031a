//! Model lookup for locally hosted servers.
//!
//! Local servers have no fixed catalog, so models are described by a short
//! spec string (`ollama:llama3`, `openai:mistral-7b`, or a bare id which
//! defaults to Ollama).

use crate::{Api, Error, Model, Result};

/// Default model for character narration and dialogue
pub const DEFAULT_CHARACTER_MODEL: &str = "llama3";

/// Default model for memory summarization and fact extraction
pub const DEFAULT_MEMORY_MODEL: &str = "llama3.2";

const DEFAULT_CONTEXT_WINDOW: u32 = 8192;
const DEFAULT_MAX_TOKENS: u32 = 1024;

/// Build a model for the given protocol with default limits.
pub fn local_model(api: Api, id: &str, base_url: Option<&str>) -> Model {
    Model {
        id: id.to_string(),
        api,
        base_url: base_url
            .unwrap_or(api.default_base_url())
            .trim_end_matches('/')
            .to_string(),
        context_window: DEFAULT_CONTEXT_WINDOW,
        max_tokens: DEFAULT_MAX_TOKENS,
        headers: Default::default(),
    }
}

/// Parse a `api:id` model spec. A bare id selects Ollama.
pub fn parse_model_spec(spec: &str, base_url: Option<&str>) -> Result<Model> {
    let spec = spec.trim();
    if spec.is_empty() {
        return Err(Error::InvalidConfig("empty model spec".to_string()));
    }

    let (api, id) = match spec.split_once(':') {
        Some((prefix, rest)) => match Api::parse(prefix) {
            Some(api) => (api, rest),
            // Ollama tags use a colon too (`llama3:8b`)
            None => (Api::Ollama, spec),
        },
        None => (Api::Ollama, spec),
    };

    if id.is_empty() {
        return Err(Error::InvalidConfig(format!("missing model id in '{spec}'")));
    }

    Ok(local_model(api, id, base_url))
}
