//! Generation service seam between the turn pipeline and language models

use std::{fmt, pin::Pin, sync::Arc, time::Duration};

use async_stream::stream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;
use vnchat_ai::{
    CompletionRequest, Model, StreamOptions, TextEvent, TextEventStream, providers::LlmProvider,
};

use crate::{
    character::Character,
    error::{Error, Result},
    prompts,
};

/// Which generative agent produced a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agent {
    Narrator,
    Character,
}

impl fmt::Display for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Agent::Narrator => write!(f, "Narrator"),
            Agent::Character => write!(f, "Character"),
        }
    }
}

/// A lazy, finite, non-restartable sequence of text fragments
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// The four text services a turn depends on
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Stream stage-direction text for the latest user line
    async fn complete_narration(
        &self,
        character: &Character,
        context: &str,
        user_input: &str,
    ) -> Result<FragmentStream>;

    /// Stream the character's spoken reply
    async fn complete_dialogue(
        &self,
        character: &Character,
        context: &str,
        user_input: &str,
    ) -> Result<FragmentStream>;

    /// Produce an updated rolling summary
    async fn summarize(
        &self,
        old_summary: &str,
        user_input: &str,
        reply: &str,
    ) -> Result<String>;

    /// Produce JSON array text describing new facts and feelings
    async fn extract(&self, user_input: &str, reply: &str) -> Result<String>;
}

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    pub max_retries: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Calculate delay for a given attempt (0-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// A provider bound to a model and sampling options
#[derive(Clone)]
pub struct ModelEndpoint {
    pub provider: Arc<dyn LlmProvider>,
    pub model: Model,
    pub options: StreamOptions,
}

impl ModelEndpoint {
    pub fn new(provider: Arc<dyn LlmProvider>, model: Model) -> Self {
        Self {
            provider,
            model,
            options: StreamOptions::default(),
        }
    }

    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }

    fn request(&self, prompt: String) -> CompletionRequest {
        CompletionRequest::new(prompt).with_options(self.options.clone())
    }
}

/// [`GenerationService`] backed by `vnchat-ai` providers.
///
/// Narration and dialogue use the character endpoint; summary and extraction
/// use the memory endpoint. Retries only cover opening a request.
pub struct LlmGenerationService {
    character: ModelEndpoint,
    memory: ModelEndpoint,
    retry_config: RetryConfig,
}

impl LlmGenerationService {
    pub fn new(character: ModelEndpoint, memory: ModelEndpoint) -> Self {
        Self {
            character,
            memory,
            retry_config: RetryConfig::default(),
        }
    }

    /// Set retry configuration
    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry_config = config;
        self
    }

    async fn open_with_retry(
        &self,
        endpoint: &ModelEndpoint,
        request: &CompletionRequest,
    ) -> vnchat_ai::Result<TextEventStream> {
        let mut attempt = 0u32;
        loop {
            match endpoint.provider.stream(&endpoint.model, request).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    if attempt < self.retry_config.max_retries && e.is_retryable() {
                        let delay = self.retry_config.delay_for_attempt(attempt);
                        tracing::warn!(
                            "Request to {} failed (attempt {}/{}): {}. Retrying in {:?}...",
                            endpoint.model.id,
                            attempt + 1,
                            self.retry_config.max_retries + 1,
                            e,
                            delay
                        );
                        attempt += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(e);
                }
            }
        }
    }

    async fn open_fragments(&self, agent: Agent, prompt: String) -> Result<FragmentStream> {
        tracing::debug!(%agent, prompt_chars = prompt.chars().count(), "opening generation stream");
        let request = self.character.request(prompt);
        let events = self
            .open_with_retry(&self.character, &request)
            .await
            .map_err(|e| Error::Generation {
                agent,
                message: e.to_string(),
            })?;
        Ok(fragments(agent, events))
    }

    async fn collect(&self, prompt: String) -> vnchat_ai::Result<String> {
        let request = self.memory.request(prompt);
        let mut events = self.open_with_retry(&self.memory, &request).await?;
        let mut text = String::new();
        while let Some(event) = events.next().await {
            match event {
                TextEvent::Delta { delta } => text.push_str(&delta),
                TextEvent::Error { message } => return Err(vnchat_ai::Error::Stream(message)),
                TextEvent::Done { .. } => break,
                TextEvent::Start { .. } => {}
            }
        }
        Ok(text)
    }
}

/// Turn provider events into agent-tagged text fragments
fn fragments(agent: Agent, mut events: TextEventStream) -> FragmentStream {
    Box::pin(stream! {
        while let Some(event) = events.next().await {
            match event {
                TextEvent::Delta { delta } => yield Ok(delta),
                TextEvent::Error { message } => {
                    yield Err(Error::Generation { agent, message });
                    return;
                }
                TextEvent::Done { .. } => return,
                TextEvent::Start { .. } => {}
            }
        }
    })
}

#[async_trait]
impl GenerationService for LlmGenerationService {
    async fn complete_narration(
        &self,
        character: &Character,
        context: &str,
        user_input: &str,
    ) -> Result<FragmentStream> {
        let prompt = prompts::narrator_prompt(character, context, user_input);
        self.open_fragments(Agent::Narrator, prompt).await
    }

    async fn complete_dialogue(
        &self,
        character: &Character,
        context: &str,
        user_input: &str,
    ) -> Result<FragmentStream> {
        let prompt = prompts::character_prompt(character, context, user_input);
        self.open_fragments(Agent::Character, prompt).await
    }

    async fn summarize(&self, old_summary: &str, user_input: &str, reply: &str) -> Result<String> {
        let prompt = prompts::summary_prompt(old_summary, user_input, reply);
        self.collect(prompt)
            .await
            .map_err(|e| Error::Summary(e.to_string()))
    }

    async fn extract(&self, user_input: &str, reply: &str) -> Result<String> {
        let prompt = prompts::extraction_prompt(user_input, reply);
        self.collect(prompt)
            .await
            .map_err(|e| Error::Extraction(e.to_string()))
    }
}
