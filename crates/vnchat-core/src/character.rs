//! Character records supplied by the caller

use serde::{Deserialize, Serialize};

/// How a character speaks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Style {
    /// Short label for the speaking style (e.g. "tsundere", "formal")
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Persona description
    #[serde(default)]
    pub description: String,
}

/// A read-only persona definition
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub name: String,
    #[serde(default)]
    pub background: String,
    #[serde(default)]
    pub style: Style,
    #[serde(default)]
    pub greeting: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Category the character was loaded from
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ip: String,
    /// Path within the category, without extension
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,
}

fn is_stage_direction(line: &str) -> bool {
    line.trim().starts_with('*')
}

impl Character {
    /// Greeting lines that are spoken aloud
    pub fn visible_greeting(&self) -> String {
        self.greeting
            .lines()
            .filter(|l| !is_stage_direction(l))
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    /// Greeting lines wrapped in `*` markers
    pub fn hidden_greeting(&self) -> String {
        self.greeting
            .lines()
            .filter(|l| is_stage_direction(l))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Initial raw context: stage directions first, then the spoken greeting
    pub fn opening_context(&self) -> String {
        [self.hidden_greeting(), self.visible_greeting()]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Non-empty tags, trimmed
    pub fn tags(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ada() -> Character {
        serde_json::from_str(
            r#"{
                "name": "Ada",
                "background": "A clockmaker's apprentice.",
                "style": {"type": "cheerful", "description": "Curious and warm"},
                "greeting": "Oh! A visitor.\n*She wipes her hands on her apron.*\nWelcome to the shop.",
                "tags": ["steampunk", " ", "romance"]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_opening_context_orders_stage_directions_first() {
        let c = ada();
        assert_eq!(
            c.opening_context(),
            "*She wipes her hands on her apron.*\n\nOh! A visitor.\nWelcome to the shop."
        );
        assert_eq!(c.visible_greeting(), "Oh! A visitor.\nWelcome to the shop.");
    }

    #[test]
    fn test_minimal_record_uses_defaults() {
        let c: Character = serde_json::from_str(r#"{"name": "Bo"}"#).unwrap();
        assert_eq!(c.opening_context(), "");
        assert!(c.tags().is_empty());
        assert_eq!(c.style, Style::default());
    }

    #[test]
    fn test_tags_skip_blank() {
        assert_eq!(ada().tags(), vec!["steampunk", "romance"]);
    }
}
