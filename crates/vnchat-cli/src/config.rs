//! Configuration file support

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use vnchat_ai::{Api, Model, StreamOptions, models};

/// Configuration for vnchat
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model for narration and dialogue
    pub model: Option<String>,
    /// Model for summaries and fact extraction
    pub memory_model: Option<String>,
    /// Wire protocol (ollama, openai)
    pub api: Option<String>,
    /// Server base URL
    pub base_url: Option<String>,
    /// API key for OpenAI-compatible servers that require one
    pub api_key: Option<String>,
    /// Root of the character library
    pub characters_dir: Option<PathBuf>,
    /// Directory holding user tag ledgers
    pub users_dir: Option<PathBuf>,
    /// Profile name used for the tag ledger
    pub username: Option<String>,
    /// Whether to autosave sessions
    pub sessions: Option<bool>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vnchat")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("VNCHAT_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from the default location
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    /// Load config from a file, falling back to defaults on any problem
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("Warning: Failed to parse config file: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    /// Save config to a file
    pub fn save_to(&self, path: &Path) -> std::io::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            model: Some(models::DEFAULT_CHARACTER_MODEL.to_string()),
            memory_model: Some(models::DEFAULT_MEMORY_MODEL.to_string()),
            api: Some(Api::Ollama.id().to_string()),
            sessions: Some(true),
            ..Default::default()
        };

        default_config.save_to(&path)?;
        Ok(path)
    }

    /// Protocol, defaulting to Ollama when unset or unknown
    pub fn api(&self) -> Api {
        match self.api.as_deref() {
            Some(s) => Api::parse(s).unwrap_or_else(|| {
                eprintln!("Warning: Unknown api '{}', using ollama", s);
                Api::Ollama
            }),
            None => Api::Ollama,
        }
    }

    pub fn characters_dir(&self) -> PathBuf {
        self.characters_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("characters"))
    }

    pub fn users_dir(&self) -> PathBuf {
        self.users_dir
            .clone()
            .unwrap_or_else(|| data_dir().join("users"))
    }

    pub fn username(&self) -> String {
        self.username
            .clone()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| "default".to_string())
    }

    pub fn sessions_enabled(&self) -> bool {
        self.sessions.unwrap_or(true)
    }

    /// Model for narration and dialogue
    pub fn resolve_character_model(&self) -> vnchat_ai::Result<Model> {
        self.resolve_model(
            self.model
                .as_deref()
                .unwrap_or(models::DEFAULT_CHARACTER_MODEL),
        )
    }

    /// Model for summaries and fact extraction
    pub fn resolve_memory_model(&self) -> vnchat_ai::Result<Model> {
        self.resolve_model(
            self.memory_model
                .as_deref()
                .unwrap_or(models::DEFAULT_MEMORY_MODEL),
        )
    }

    /// An `api:` prefix in the model spec wins over the configured protocol
    fn resolve_model(&self, spec: &str) -> vnchat_ai::Result<Model> {
        let base_url = self.base_url.as_deref();
        let prefixed = spec
            .split_once(':')
            .and_then(|(prefix, _)| Api::parse(prefix))
            .is_some();
        if prefixed || spec.trim().is_empty() {
            return models::parse_model_spec(spec, base_url);
        }
        Ok(models::local_model(self.api(), spec.trim(), base_url))
    }

    /// Sampling options for generation requests
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stop_sequences: Vec::new(),
        }
    }
}

/// Base directory for vnchat's local data
pub fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("vnchat")
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# vnchat configuration file
# Place at ~/.config/vnchat/config.toml (Linux/Mac) or %APPDATA%\vnchat\config.toml (Windows)

# Model for narration and character dialogue
model = "llama3"

# Model for rolling summaries and fact extraction
memory_model = "llama3.2"

# Server protocol (ollama, openai)
api = "ollama"

# Server base URL (defaults to the protocol's localhost port)
# base_url = "http://localhost:11434"

# API key, only for OpenAI-compatible servers that require one
# api_key = "..."

# Character library root: <characters_dir>/<ip>/**/<name>.json
# characters_dir = "~/.local/share/vnchat/characters"

# Tag ledgers live at <users_dir>/<username>.json
# users_dir = "~/.local/share/vnchat/users"
# username = "default"

# Autosave sessions (true by default)
sessions = true

# Sampling
# temperature = 0.8
# max_tokens = 512
"#
}
