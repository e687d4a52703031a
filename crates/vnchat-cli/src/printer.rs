//! Renders turn events to the terminal as they stream in

use std::io::{self, Write};
use vnchat_core::{TurnEvent, TurnState};

/// Turns [`TurnEvent`]s into terminal text.
///
/// Narration is shown in `*` markers, dialogue behind the character's name.
pub struct EventPrinter {
    name: String,
    verbose: bool,
}

impl EventPrinter {
    pub fn new(name: impl Into<String>, verbose: bool) -> Self {
        Self {
            name: name.into(),
            verbose,
        }
    }

    /// Text for stdout, if the event shows anything
    pub fn render(&self, event: &TurnEvent) -> Option<String> {
        match event {
            TurnEvent::StateChanged {
                state: TurnState::Narrating,
            } => Some("*".to_string()),
            TurnEvent::NarrationDelta { delta } => Some(delta.trim_matches('*').to_string()),
            TurnEvent::NarrationEnd { .. } => Some("*\n".to_string()),
            TurnEvent::StateChanged {
                state: TurnState::Replying,
            } => Some(format!("{}: ", self.name)),
            TurnEvent::DialogueDelta { delta } => Some(delta.clone()),
            TurnEvent::DialogueEnd { .. } => Some("\n".to_string()),
            TurnEvent::MemoryUpdated { new_facts, .. } if self.verbose => Some(format!(
                "[memory updated, {} new fact{}]\n",
                new_facts.len(),
                if new_facts.len() == 1 { "" } else { "s" }
            )),
            _ => None,
        }
    }

    pub fn print(&self, event: &TurnEvent) {
        if let Some(text) = self.render(event) {
            print!("{}", text);
            io::stdout().flush().ok();
        }
    }
}
