//! Session facade tying transcript, memory and the turn pipeline together.
//!
//! Every mutating operation takes `&mut self`, so a session can never run two
//! turns at once or be edited while a turn is in flight.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    character::Character,
    error::{Error, Result},
    events::{TurnEvent, TurnKind},
    memory::{MemoryManager, MemorySnapshot},
    orchestrator::{TurnOrchestrator, TurnOutput, TurnRequest},
    service::GenerationService,
    transcript::{MessageRef, Transcript},
    utils::wrap_narration,
};

/// What a turn changed in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReport {
    pub kind: TurnKind,
    /// The reply that received new text
    pub reply: Option<MessageRef>,
    /// Narration as stored, wrapped in `*` markers
    pub narration: String,
    /// Dialogue produced by this turn
    pub dialogue: String,
    /// Character tags to count toward the user's profile (normal turns only)
    pub tags: Vec<String>,
}

impl TurnReport {
    fn ignored() -> Self {
        Self {
            kind: TurnKind::Ignored,
            reply: None,
            narration: String::new(),
            dialogue: String::new(),
            tags: Vec::new(),
        }
    }
}

/// Everything needed to resume a session later
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub character: Character,
    pub transcript: Transcript,
    pub memory: MemorySnapshot,
    pub context: String,
}

/// How a finished turn lands in the transcript
#[derive(Debug, Clone, Copy)]
enum Placement {
    NewVersion(MessageRef),
    AppendDialogue(MessageRef),
}

pub struct ChatSession {
    character: Character,
    transcript: Transcript,
    memory: MemoryManager,
    orchestrator: TurnOrchestrator,
    context: String,
}

impl ChatSession {
    /// Start a fresh session opening on the character's greeting
    pub fn new(character: Character, service: Arc<dyn GenerationService>) -> Self {
        let context = character.opening_context();
        tracing::info!(character = %character.name, "session started");
        Self {
            character,
            transcript: Transcript::new(),
            memory: MemoryManager::new(),
            orchestrator: TurnOrchestrator::new(service),
            context,
        }
    }

    /// Resume a session from a snapshot
    pub fn restore(snapshot: SessionSnapshot, service: Arc<dyn GenerationService>) -> Self {
        tracing::info!(
            character = %snapshot.character.name,
            messages = snapshot.transcript.len(),
            "session restored"
        );
        Self {
            character: snapshot.character,
            transcript: snapshot.transcript,
            memory: MemoryManager::restore(snapshot.memory),
            orchestrator: TurnOrchestrator::new(service),
            context: snapshot.context,
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            character: self.character.clone(),
            transcript: self.transcript.clone(),
            memory: self.memory.snapshot(),
            context: self.context.clone(),
        }
    }

    pub fn character(&self) -> &Character {
        &self.character
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// The cached raw context
    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn memory(&self) -> &MemoryManager {
        &self.memory
    }

    /// Read-only export of summary and facts
    pub fn memory_snapshot(&self) -> MemorySnapshot {
        self.memory.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.orchestrator.subscribe()
    }

    /// Reference of the message at a transcript position
    pub fn message_at(&self, index: usize) -> Option<MessageRef> {
        self.transcript.messages().get(index).map(|m| m.id())
    }

    fn rebuild(&mut self) {
        self.context = self
            .transcript
            .rebuild_context(&self.character.name, &self.character.greeting);
    }

    /// Submit user input.
    ///
    /// Non-empty input runs a normal turn. Empty input continues the active
    /// reply, or regenerates after the active reply was deleted, or does
    /// nothing when there is no earlier user message.
    pub async fn submit(&mut self, input: &str) -> Result<TurnReport> {
        let input = input.trim();
        if !input.is_empty() {
            return self.normal_turn(input).await;
        }

        if self.transcript.active_reply().is_some() {
            return self.continue_reply().await;
        }
        if self.transcript.last_user_text().is_some() {
            return self.regenerate_after_delete().await;
        }
        Ok(TurnReport::ignored())
    }

    async fn normal_turn(&mut self, input: &str) -> Result<TurnReport> {
        self.transcript.append_user(input);
        let reply = self.transcript.append_reply();
        let mut report = self
            .run(input, TurnKind::Normal, Placement::NewVersion(reply))
            .await?;
        report.tags = self.character.tags();
        Ok(report)
    }

    /// Extend the active reply's dialogue with a continuation turn.
    ///
    /// An active reply without versions gets a fresh version instead.
    pub async fn continue_reply(&mut self) -> Result<TurnReport> {
        let Some(reply) = self.transcript.active_reply() else {
            return Ok(TurnReport::ignored());
        };
        let complete = self
            .transcript
            .get(reply)
            .is_some_and(|m| m.version_count() > 0);
        if complete {
            self.run("", TurnKind::Continuation, Placement::AppendDialogue(reply))
                .await
        } else {
            self.run("", TurnKind::RegenerateAfterDelete, Placement::NewVersion(reply))
                .await
        }
    }

    async fn regenerate_after_delete(&mut self) -> Result<TurnReport> {
        let reply = self.transcript.append_reply();
        self.run("", TurnKind::RegenerateAfterDelete, Placement::NewVersion(reply))
            .await
    }

    /// Generate a new version of `reply`.
    ///
    /// The input is the last user message in the transcript, followed by the
    /// optional instruction. The stored user message is not changed.
    pub async fn regenerate(
        &mut self,
        reply: MessageRef,
        instruction: Option<&str>,
    ) -> Result<TurnReport> {
        match self.transcript.get(reply) {
            Some(m) if m.is_user() => return Err(Error::NotAReply),
            Some(_) => {}
            None => return Err(Error::UnknownMessage(reply)),
        }

        let base = self
            .transcript
            .last_user_text()
            .unwrap_or_default()
            .to_string();
        let input = match instruction.map(str::trim) {
            Some(extra) if !extra.is_empty() => format!("{base}\n\n{extra}"),
            _ => base,
        };
        self.run(&input, TurnKind::Regenerate, Placement::NewVersion(reply))
            .await
    }

    async fn run(
        &mut self,
        user_input: &str,
        kind: TurnKind,
        placement: Placement,
    ) -> Result<TurnReport> {
        let request = TurnRequest::new(&self.character, &self.context, user_input).with_kind(kind);
        let result = self
            .orchestrator
            .process_turn(&mut self.memory, request)
            .await;

        match result {
            Ok(output) => self.commit(kind, placement, &output),
            Err(Error::MemoryUpdate { output, source }) => {
                // The text survived; keep it in the transcript
                self.commit(kind, placement, &output)?;
                Err(Error::MemoryUpdate { output, source })
            }
            Err(e) => Err(e),
        }
    }

    fn commit(
        &mut self,
        kind: TurnKind,
        placement: Placement,
        output: &TurnOutput,
    ) -> Result<TurnReport> {
        let (reply, narration) = match placement {
            Placement::NewVersion(reply) => {
                let narration = wrap_narration(&output.narration);
                self.transcript
                    .add_version(reply, narration.clone(), output.dialogue.clone())?;
                (reply, narration)
            }
            Placement::AppendDialogue(reply) => {
                self.transcript
                    .append_active_dialogue(reply, &output.dialogue)?;
                (reply, String::new())
            }
        };
        self.rebuild();
        Ok(TurnReport {
            kind,
            reply: Some(reply),
            narration,
            dialogue: output.dialogue.clone(),
            tags: Vec::new(),
        })
    }

    /// Replace a user message's text and refresh the context
    pub fn edit_user(&mut self, id: MessageRef, new_text: &str) -> Result<()> {
        let old = self.transcript.edit_user_text(id, new_text)?;
        if !old.is_empty() {
            self.context = self.context.replace(&old, new_text);
        }
        self.rebuild();
        Ok(())
    }

    /// Replace the active version's dialogue. Blank text is ignored.
    /// Returns whether anything changed.
    pub fn edit_reply(&mut self, id: MessageRef, new_dialogue: &str) -> Result<bool> {
        if new_dialogue.trim().is_empty() {
            return Ok(false);
        }
        self.transcript.edit_active_reply_dialogue(id, new_dialogue)?;
        self.rebuild();
        Ok(true)
    }

    /// Cascade-delete from `id` on. Returns the number of messages removed.
    pub fn delete(&mut self, id: MessageRef) -> usize {
        let removed = self.transcript.delete(id);
        if removed > 0 {
            tracing::debug!(%id, removed, "messages deleted");
            self.rebuild();
        }
        removed
    }

    pub fn set_active_version(&mut self, id: MessageRef, index: usize) -> Result<()> {
        self.transcript.set_active_version(id, index)?;
        self.rebuild();
        Ok(())
    }

    /// Move the active version by `step` (negative for previous).
    /// Returns the new index.
    pub fn flip_version(&mut self, id: MessageRef, step: isize) -> Result<usize> {
        let message = self
            .transcript
            .get(id)
            .ok_or(Error::UnknownMessage(id))?;
        if message.is_user() {
            return Err(Error::NotAReply);
        }
        let len = message.version_count();
        let target = message.active_index() as isize + step;
        if target < 0 || target as usize >= len {
            return Err(Error::OutOfRange {
                index: target.max(0) as usize,
                len,
            });
        }
        self.set_active_version(id, target as usize)?;
        Ok(target as usize)
    }

    /// Drop a trailing reply left without versions by a failed turn
    pub fn discard_incomplete_reply(&mut self) -> bool {
        let removed = self.transcript.discard_incomplete_reply();
        if removed {
            self.rebuild();
        }
        removed
    }
}
