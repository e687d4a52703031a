//! /memory, /context and /tags commands - read-only views

use super::CommandResult;
use crate::profile::{TOP_TAGS, UserProfile};
use vnchat_core::ChatSession;

pub struct MemoryCommand;

impl MemoryCommand {
    /// Show the memory snapshot as JSON
    pub fn execute(session: &ChatSession) -> CommandResult {
        let snapshot = session.memory_snapshot();
        match serde_json::to_string_pretty(&snapshot) {
            Ok(json) => CommandResult::Message(json),
            Err(e) => CommandResult::Message(format!("Failed to render memory: {}", e)),
        }
    }
}

pub struct ContextCommand;

impl ContextCommand {
    pub fn execute(session: &ChatSession) -> CommandResult {
        CommandResult::Message(session.context().to_string())
    }
}

pub struct TagsCommand;

impl TagsCommand {
    pub fn execute(session: &ChatSession, profile: &UserProfile) -> CommandResult {
        let top = profile.top_tags(TOP_TAGS);
        let yours = if top.is_empty() {
            "(none yet)".to_string()
        } else {
            top.iter()
                .map(|tag| {
                    let count = profile.interactions.get(tag).copied().unwrap_or(0);
                    format!("{} ({})", tag, count)
                })
                .collect::<Vec<_>>()
                .join(", ")
        };
        let character = session.character();
        let theirs = character.tags();
        let theirs = if theirs.is_empty() {
            "(none)".to_string()
        } else {
            theirs.join(", ")
        };
        CommandResult::Message(format!(
            "Your top tags ({}): {}\n{}'s tags: {}",
            profile.username, yours, character.name, theirs
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::session;
    use super::*;

    #[test]
    fn test_memory_is_json() {
        let CommandResult::Message(json) = MemoryCommand::execute(&session()) else {
            panic!("expected message");
        };
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"], "");
        assert!(value["facts"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_context() {
        let CommandResult::Message(text) = ContextCommand::execute(&session()) else {
            panic!("expected message");
        };
        assert!(text.starts_with("Welcome.\n\nUser: hi\n\nAda: Hey."));
    }

    #[test]
    fn test_tags() {
        let mut profile = UserProfile::new("sam");
        profile.record(&["kind", "kind", "cool"]);
        let CommandResult::Message(text) = TagsCommand::execute(&session(), &profile) else {
            panic!("expected message");
        };
        assert_eq!(
            text,
            "Your top tags (sam): kind (2), cool (1)\nAda's tags: kind, scientist"
        );
    }
}
