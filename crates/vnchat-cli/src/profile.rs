//! Per-user tag ledger

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Number of preferred tags fed to the recommender
pub const TOP_TAGS: usize = 10;

/// How often the user has chatted with characters carrying each tag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub username: String,
    #[serde(default)]
    pub interactions: BTreeMap<String, u64>,
}

impl UserProfile {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            interactions: BTreeMap::new(),
        }
    }

    fn path_in(dir: &Path, username: &str) -> PathBuf {
        dir.join(format!("{username}.json"))
    }

    /// Load a profile, creating and saving an empty one if it doesn't exist
    pub fn load_or_create(dir: &Path, username: &str) -> anyhow::Result<Self> {
        let path = Self::path_in(dir, username);
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            return Ok(serde_json::from_str(&content)?);
        }

        let profile = Self::new(username);
        profile.save(dir)?;
        Ok(profile)
    }

    pub fn save(&self, dir: &Path) -> anyhow::Result<()> {
        fs::create_dir_all(dir)?;
        let content = serde_json::to_string_pretty(self)?;
        fs::write(Self::path_in(dir, &self.username), content)?;
        Ok(())
    }

    /// Bump the counter of every non-empty tag
    pub fn record<S: AsRef<str>>(&mut self, tags: &[S]) {
        for tag in tags {
            let tag = tag.as_ref().trim();
            if tag.is_empty() {
                continue;
            }
            *self.interactions.entry(tag.to_string()).or_insert(0) += 1;
        }
    }

    /// Most frequent tags, highest count first. Ties are alphabetical.
    pub fn top_tags(&self, k: usize) -> Vec<String> {
        let mut counts: Vec<_> = self.interactions.iter().collect();
        counts.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
        counts
            .into_iter()
            .take(k)
            .map(|(tag, _)| tag.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_created_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let users = dir.path().join("users");
        let profile = UserProfile::load_or_create(&users, "sam").unwrap();
        assert_eq!(profile, UserProfile::new("sam"));

        let raw = fs::read_to_string(users.join("sam.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value["username"], "sam");
        assert!(value["interactions"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_record_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut profile = UserProfile::load_or_create(dir.path(), "sam").unwrap();
        profile.record(&["kind", "", "  ", "leader"]);
        profile.record(&["kind".to_string()]);
        profile.save(dir.path()).unwrap();

        let reloaded = UserProfile::load_or_create(dir.path(), "sam").unwrap();
        assert_eq!(reloaded.interactions.get("kind"), Some(&2));
        assert_eq!(reloaded.interactions.get("leader"), Some(&1));
        assert_eq!(reloaded.interactions.len(), 2);
    }

    #[test]
    fn test_top_tags_order_and_limit() {
        let mut profile = UserProfile::new("sam");
        profile.record(&["b", "a", "c"]);
        profile.record(&["c"]);
        profile.record(&["c", "a"]);
        assert_eq!(profile.top_tags(TOP_TAGS), vec!["c", "a", "b"]);
        assert_eq!(profile.top_tags(1), vec!["c"]);
    }
}
