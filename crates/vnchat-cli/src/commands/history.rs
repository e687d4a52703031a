//! /history command - list the transcript with indices

use super::CommandResult;
use vnchat_core::utils::truncate_chars;
use vnchat_core::{ChatSession, Message};

pub struct HistoryCommand;

impl HistoryCommand {
    pub fn execute(session: &ChatSession) -> CommandResult {
        let messages = session.transcript().messages();
        if messages.is_empty() {
            return CommandResult::Message("No messages yet.".to_string());
        }

        let name = &session.character().name;
        let mut lines = vec!["Messages in conversation:".to_string()];
        for (i, message) in messages.iter().enumerate() {
            let line = match message {
                Message::User { text, .. } => format!("  {}: [you] {}", i, preview(text)),
                Message::Reply { .. } => match message.active_version() {
                    Some(version) => format!(
                        "  {}: [{} {}/{}] {}",
                        i,
                        name,
                        message.active_index() + 1,
                        message.version_count(),
                        preview(&version.dialogue)
                    ),
                    None => format!("  {}: [{}] (incomplete)", i, name),
                },
            };
            lines.push(line);
        }
        CommandResult::Message(lines.join("\n"))
    }
}

fn preview(text: &str) -> String {
    truncate_chars(text, 60).replace('\n', " ")
}
