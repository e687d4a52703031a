//! Turn event types

use serde::{Deserialize, Serialize};

use crate::{facts::Fact, orchestrator::TurnState};

/// Which entry path a turn took
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnKind {
    /// Non-empty user input
    Normal,
    /// Empty input extending the active reply
    Continuation,
    /// Empty input after the active reply was deleted
    RegenerateAfterDelete,
    /// Explicit regeneration of an existing reply
    Regenerate,
    /// Empty input with nothing to continue or regenerate
    Ignored,
}

/// Events emitted while a turn runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// A turn started
    TurnStart { kind: TurnKind },

    /// The pipeline moved to a new state
    StateChanged { state: TurnState },

    /// Narration fragment
    NarrationDelta { delta: String },

    /// Narration stream drained
    NarrationEnd { narration: String },

    /// Dialogue fragment
    DialogueDelta { delta: String },

    /// Dialogue stream drained
    DialogueEnd { dialogue: String },

    /// Long-term memory was updated
    MemoryUpdated {
        summary: String,
        new_facts: Vec<Fact>,
    },

    /// The turn completed
    TurnEnd { kind: TurnKind },

    /// The turn failed. `memory_only` means the produced text survived.
    Error { message: String, memory_only: bool },
}
