//! Extracted long-term facts and the naive keyword recall over them

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{Error, Result};

/// What kind of memory item a fact is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FactKind {
    Fact,
    Feeling,
}

impl FactKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "fact" => Some(FactKind::Fact),
            "feeling" => Some(FactKind::Feeling),
            _ => None,
        }
    }

    /// Capitalized label used when rendering facts into a prompt
    pub fn label(&self) -> &'static str {
        match self {
            FactKind::Fact => "Fact",
            FactKind::Feeling => "Feeling",
        }
    }
}

impl<'de> Deserialize<'de> for FactKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        FactKind::parse(&raw)
            .ok_or_else(|| serde::de::Error::unknown_variant(&raw, &["fact", "feeling"]))
    }
}

/// An immutable memory item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    #[serde(rename = "type")]
    pub kind: FactKind,
    pub text: String,
}

impl Fact {
    pub fn new(kind: FactKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    pub fn fact(text: impl Into<String>) -> Self {
        Self::new(FactKind::Fact, text)
    }

    pub fn feeling(text: impl Into<String>) -> Self {
        Self::new(FactKind::Feeling, text)
    }
}

impl fmt::Display for Fact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.label(), self.text)
    }
}

/// Append-only fact collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactStore {
    facts: Vec<Fact>,
}

impl FactStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_facts(facts: Vec<Fact>) -> Self {
        Self { facts }
    }

    pub fn all(&self) -> &[Fact] {
        &self.facts
    }

    pub fn len(&self) -> usize {
        self.facts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facts.is_empty()
    }

    /// Append every well-shaped record and return the ones accepted.
    /// Malformed records are dropped individually.
    pub fn append_valid(&mut self, items: &[serde_json::Value]) -> Vec<Fact> {
        let accepted: Vec<Fact> = items.iter().filter_map(decode_record).collect();
        let dropped = items.len() - accepted.len();
        if dropped > 0 {
            tracing::debug!(dropped, "dropped malformed fact records");
        }
        self.facts.extend(accepted.iter().cloned());
        accepted
    }

    /// The first `top_k` facts, in storage order, whose text contains any
    /// whitespace-separated query token (case-insensitive).
    pub fn relevant(&self, query: &str, top_k: usize) -> Vec<&Fact> {
        let query = query.to_lowercase();
        let tokens: HashSet<&str> = query.split_whitespace().collect();
        if tokens.is_empty() {
            return Vec::new();
        }
        self.facts
            .iter()
            .filter(|f| {
                let text = f.text.to_lowercase();
                tokens.iter().any(|t| text.contains(t))
            })
            .take(top_k)
            .collect()
    }
}

fn decode_record(item: &serde_json::Value) -> Option<Fact> {
    let fact: Fact = serde_json::from_value(item.clone()).ok()?;
    if fact.text.trim().is_empty() {
        return None;
    }
    Some(fact)
}

static CODE_FENCE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)```").ok());

/// Decode extraction output into raw records.
///
/// Accepts a bare JSON array, an array inside a Markdown code fence, or the
/// outermost `[...]` span of surrounding prose.
pub fn parse_extraction(raw: &str) -> Result<Vec<serde_json::Value>> {
    let trimmed = raw.trim();
    if let Ok(items) = serde_json::from_str::<Vec<serde_json::Value>>(trimmed) {
        return Ok(items);
    }

    if let Some(fenced) = CODE_FENCE
        .as_ref()
        .and_then(|re| re.captures(trimmed))
        .and_then(|caps| caps.get(1))
    {
        if let Ok(items) = serde_json::from_str::<Vec<serde_json::Value>>(fenced.as_str().trim()) {
            return Ok(items);
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) {
        if start < end {
            if let Ok(items) = serde_json::from_str::<Vec<serde_json::Value>>(&trimmed[start..=end]) {
                return Ok(items);
            }
        }
    }

    Err(Error::MalformedExtraction(crate::utils::truncate_chars(trimmed, 80)))
}
