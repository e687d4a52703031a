//! /regen, /prev and /next commands - reply versions

use super::{CommandResult, resolve_index};
use vnchat_core::{ChatSession, MessageRef};

fn resolve_reply<'a>(args: &'a str, session: &ChatSession) -> Result<(MessageRef, &'a str), String> {
    let (id, rest) = resolve_index(args, session)?;
    match session.transcript().get(id) {
        Some(message) if !message.is_user() => Ok((id, rest)),
        _ => Err("That is your message. Pick a reply index from /history.".to_string()),
    }
}

pub struct RegenCommand;

impl RegenCommand {
    /// Execute `/regen <n> [instruction]`
    pub fn execute(args: &str, session: &ChatSession) -> CommandResult {
        match resolve_reply(args, session) {
            Ok((id, instruction)) => CommandResult::Regenerate {
                id,
                instruction: (!instruction.is_empty()).then(|| instruction.to_string()),
            },
            Err(msg) => CommandResult::Message(msg),
        }
    }
}

pub struct FlipCommand;

impl FlipCommand {
    /// Execute `/prev <n>` (step -1) or `/next <n>` (step 1)
    pub fn execute(args: &str, session: &ChatSession, step: isize) -> CommandResult {
        match resolve_reply(args, session) {
            Ok((id, _)) => CommandResult::Flip { id, step },
            Err(msg) => CommandResult::Message(msg),
        }
    }
}
