//! Core types for text-generation requests

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Supported wire protocols
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Api {
    /// Ollama native `/api/generate` (NDJSON streaming)
    Ollama,
    /// OpenAI-compatible `/chat/completions` (SSE streaming), as served by
    /// llama.cpp, LM Studio, vLLM and friends
    OpenAICompletions,
}

impl Api {
    /// Short identifier used in config files and model specs
    pub fn id(&self) -> &'static str {
        match self {
            Api::Ollama => "ollama",
            Api::OpenAICompletions => "openai",
        }
    }

    /// Default base URL for a server speaking this protocol on localhost
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Api::Ollama => "http://localhost:11434",
            Api::OpenAICompletions => "http://localhost:8080/v1",
        }
    }

    /// Parse an identifier (`ollama`, `openai`)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Some(Api::Ollama),
            "openai" | "openai-completions" | "llamacpp" | "lmstudio" => {
                Some(Api::OpenAICompletions)
            }
            _ => None,
        }
    }
}

/// Model definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    /// Model identifier as the server knows it (e.g., "llama3")
    pub id: String,
    /// Protocol to use
    pub api: Api,
    /// Base URL for API calls
    pub base_url: String,
    /// Context window size in tokens
    pub context_window: u32,
    /// Maximum output tokens
    pub max_tokens: u32,
    /// Additional headers for API calls
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Token usage information
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input: u32,
    pub output: u32,
}

/// Reason why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of response
    Stop,
    /// Maximum tokens reached
    Length,
}

impl StopReason {
    /// Map the reason strings used by both protocols
    pub fn from_wire(reason: &str) -> Option<Self> {
        match reason {
            "stop" => Some(StopReason::Stop),
            "length" => Some(StopReason::Length),
            _ => None,
        }
    }
}

/// Options for streaming requests
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Maximum tokens to generate
    pub max_tokens: Option<u32>,
    /// Temperature (0.0 - 2.0)
    pub temperature: Option<f32>,
    /// Stop sequences
    #[serde(default)]
    pub stop_sequences: Vec<String>,
}

/// A single-prompt completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    /// Optional system prompt
    pub system: Option<String>,
    /// The fully rendered prompt
    pub prompt: String,
    /// Sampling options
    pub options: StreamOptions,
}

impl CompletionRequest {
    /// Create a request from a rendered prompt
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            options: StreamOptions::default(),
        }
    }

    /// Attach a system prompt
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Replace the sampling options
    pub fn with_options(mut self, options: StreamOptions) -> Self {
        self.options = options;
        self
    }
}

/// A fully collected completion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub text: String,
    #[serde(default)]
    pub usage: Usage,
    pub stop_reason: Option<StopReason>,
    /// Unix millis when the stream finished
    #[serde(default)]
    pub finished_at: i64,
}
