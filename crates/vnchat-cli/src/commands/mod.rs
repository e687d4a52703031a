//! Slash commands for interactive mode

mod edit;
mod history;
mod memory;
mod version;

pub use edit::{EditCommand, EditTarget};
pub use history::HistoryCommand;
pub use memory::{ContextCommand, MemoryCommand, TagsCommand};
pub use version::{FlipCommand, RegenCommand};

use crate::profile::UserProfile;
use vnchat_core::{ChatSession, MessageRef};

/// Result of executing a slash command
#[derive(Debug, PartialEq)]
pub enum CommandResult {
    /// Show a message to the user (not sent to the session)
    Message(String),
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
    /// Replace a user message's text
    EditUser { id: MessageRef, text: String },
    /// Replace a reply's active dialogue
    EditReply { id: MessageRef, text: String },
    /// Delete a message and everything after it
    Delete(MessageRef),
    /// Generate a new version of a reply
    Regenerate {
        id: MessageRef,
        instruction: Option<String>,
    },
    /// Move a reply's active version by `step`
    Flip { id: MessageRef, step: isize },
    /// Extend the active reply
    Continue,
}

/// Parse and execute a slash command
pub fn execute_command(
    input: &str,
    session: &ChatSession,
    profile: &UserProfile,
) -> Option<CommandResult> {
    let input = input.trim();

    let rest = input.strip_prefix('/')?;
    let (command, args) = match rest.split_once(char::is_whitespace) {
        Some((command, args)) => (command, args.trim()),
        None => (rest, ""),
    };
    let command = command.to_lowercase();

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "quit" | "exit" | "q" => CommandResult::Exit,

        "history" => HistoryCommand::execute(session),

        "memory" => MemoryCommand::execute(session),

        "context" => ContextCommand::execute(session),

        "tags" => TagsCommand::execute(session, profile),

        "edit" => EditCommand::execute(args, session, EditTarget::User),

        "edit-reply" => EditCommand::execute(args, session, EditTarget::Reply),

        "delete" => match resolve_index(args, session) {
            Ok((id, _)) => CommandResult::Delete(id),
            Err(msg) => CommandResult::Message(msg),
        },

        "regen" | "r" => RegenCommand::execute(args, session),

        "prev" => FlipCommand::execute(args, session, -1),

        "next" => FlipCommand::execute(args, session, 1),

        "continue" | "c" => CommandResult::Continue,

        _ => CommandResult::Unknown(command),
    })
}

/// Split `"<index> rest"` and resolve the index to a message reference
pub(crate) fn resolve_index<'a>(
    args: &'a str,
    session: &ChatSession,
) -> Result<(MessageRef, &'a str), String> {
    let count = session.transcript().len();
    if count == 0 {
        return Err("No messages yet.".to_string());
    }

    let (index, rest) = match args.split_once(char::is_whitespace) {
        Some((index, rest)) => (index, rest.trim()),
        None => (args, ""),
    };
    let valid = format!("Valid range: 0-{}", count - 1);

    let index = index
        .parse::<usize>()
        .map_err(|_| format!("Invalid index '{}'. {}", index, valid))?;
    let id = session
        .message_at(index)
        .ok_or_else(|| format!("Invalid index {}. {}", index, valid))?;
    Ok((id, rest))
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?               Show this help message
  /history                    List messages with their indices
  /memory                     Show the rolling summary and stored facts
  /context                    Show the raw conversation context
  /tags                       Show your most frequent tags
  /edit <n> <text>            Replace the text of user message n
  /edit-reply <n> <text>      Replace the dialogue of reply n
  /delete <n>                 Delete message n and everything after it
  /regen, /r <n> [note]       Generate a new version of reply n
  /prev <n>, /next <n>        Switch reply n to another version
  /continue, /c               Continue the last reply
  /quit, /exit, /q            Exit vnchat

An empty line continues the last reply, or regenerates it after /delete.

Examples:
  /history
  /edit 2 I'd rather have coffee.
  /regen 3 Be more playful this time.
  /prev 3"#
        .to_string()
}
