//! /edit and /edit-reply commands

use super::{CommandResult, resolve_index};
use vnchat_core::ChatSession;

/// Which kind of message an edit applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditTarget {
    User,
    Reply,
}

pub struct EditCommand;

impl EditCommand {
    /// Execute `/edit <n> <text>` or `/edit-reply <n> <text>`
    pub fn execute(args: &str, session: &ChatSession, target: EditTarget) -> CommandResult {
        let (id, text) = match resolve_index(args, session) {
            Ok(resolved) => resolved,
            Err(msg) => return CommandResult::Message(msg),
        };
        if text.is_empty() {
            return CommandResult::Message(
                "Nothing to edit: give the new text after the index.".to_string(),
            );
        }

        let is_user = session
            .transcript()
            .get(id)
            .map(|m| m.is_user())
            .unwrap_or(false);

        match (target, is_user) {
            (EditTarget::User, true) => CommandResult::EditUser {
                id,
                text: text.to_string(),
            },
            (EditTarget::Reply, false) => CommandResult::EditReply {
                id,
                text: text.to_string(),
            },
            (EditTarget::User, false) => {
                CommandResult::Message("That is a reply. Use /edit-reply instead.".to_string())
            }
            (EditTarget::Reply, true) => {
                CommandResult::Message("That is your message. Use /edit instead.".to_string())
            }
        }
    }
}
