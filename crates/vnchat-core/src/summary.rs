//! Rolling natural-language summary of the conversation

use serde::{Deserialize, Serialize};

use crate::{error::Result, service::GenerationService};

/// One evolving digest, replaced on every update.
///
/// A failed update keeps the previous text and marks it stale until the next
/// successful update.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollingSummary {
    text: String,
    #[serde(default)]
    stale: bool,
}

impl RollingSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            stale: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Whether the last update attempt failed
    pub fn is_stale(&self) -> bool {
        self.stale
    }

    pub fn mark_stale(&mut self) {
        self.stale = true;
    }

    /// Replace the summary with trimmed text
    pub fn replace(&mut self, text: &str) {
        self.text = text.trim().to_string();
        self.stale = false;
    }

    /// Ask the service for an updated summary and store it
    pub async fn update(
        &mut self,
        service: &dyn GenerationService,
        user_input: &str,
        assistant_reply: &str,
    ) -> Result<&str> {
        match service.summarize(&self.text, user_input, assistant_reply).await {
            Ok(new_summary) => {
                self.replace(&new_summary);
                tracing::debug!(chars = self.text.chars().count(), "summary updated");
                Ok(&self.text)
            }
            Err(e) => {
                self.mark_stale();
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_trims_and_clears_stale() {
        let mut s = RollingSummary::from_text("old");
        s.mark_stale();
        s.replace("  Ada met the user.\n");
        assert_eq!(s.text(), "Ada met the user.");
        assert!(!s.is_stale());
    }

    #[test]
    fn test_stale_flag_defaults_on_deserialize() {
        let s: RollingSummary = serde_json::from_str(r#"{"text":"x"}"#).unwrap();
        assert_eq!(s.text(), "x");
        assert!(!s.is_stale());
    }
}
