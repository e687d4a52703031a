//! Provider implementations for local generation servers

pub mod ollama;
pub mod openai;

use crate::{
    Api, CompletionRequest, Error, Model, Result, TextBuilder, TextEventStream,
    types::Completion,
};
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;

/// Trait for text-generation providers
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Open a streaming completion.
    ///
    /// Connection and status failures are returned here; failures after the
    /// stream is open arrive as a terminal `TextEvent::Error`.
    async fn stream(&self, model: &Model, request: &CompletionRequest)
    -> Result<TextEventStream>;

    /// Run a completion to the end and collect its text
    async fn complete(&self, model: &Model, request: &CompletionRequest) -> Result<Completion> {
        let mut events = self.stream(model, request).await?;
        let mut builder = TextBuilder::new();
        while let Some(event) = events.next().await {
            builder.process_event(&event);
            if event.is_terminal() {
                break;
            }
        }
        if let Some(message) = builder.error() {
            return Err(Error::Stream(message.to_string()));
        }
        Ok(builder.build())
    }
}

/// Build the provider matching a model's protocol
pub fn provider_for(model: &Model, api_key: Option<&str>) -> Arc<dyn LlmProvider> {
    match model.api {
        Api::Ollama => Arc::new(ollama::OllamaProvider::new()),
        Api::OpenAICompletions => {
            let key = get_api_key(api_key, "OPENAI_API_KEY").ok();
            Arc::new(openai::OpenAIProvider::new(key))
        }
    }
}

/// Get an API key from a provided value or the environment
pub fn get_api_key(provided: Option<&str>, env_var: &str) -> Result<String> {
    if let Some(key) = provided {
        return Ok(key.to_string());
    }

    std::env::var(env_var).map_err(|_| Error::InvalidApiKey)
}

/// Map a non-success HTTP response to an API error
pub(crate) async fn status_error(response: reqwest::Response) -> Error {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Error::api(format!("http_{status}"), extract_error_message(&body))
}

/// Pull `error` or `error.message` out of a JSON error body, if present
fn extract_error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return body.to_string();
    };
    match value.get("error") {
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(obj) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| body.to_string()),
        None => body.to_string(),
    }
}
