//! The two-agent turn pipeline.
//!
//! A turn extends the raw context with memory, drains the narrator stream,
//! drains the character stream, and only then updates long-term memory. Both
//! agents see the same extended context; the character never sees the
//! narration produced in the same turn.

use std::sync::Arc;

use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{
    character::Character,
    context::ContextAssembler,
    error::{Error, Result},
    events::{TurnEvent, TurnKind},
    handle::SessionHandle,
    memory::{MemoryDelta, MemoryManager},
    service::{Agent, FragmentStream, GenerationService},
};

/// Pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnState {
    Idle,
    ExtendingContext,
    Narrating,
    Replying,
    UpdatingMemory,
    Done,
}

impl TurnState {
    /// Whether `next` may follow `self`. Any state may fall back to `Idle`.
    pub fn can_transition_to(self, next: TurnState) -> bool {
        use TurnState::*;
        matches!(
            (self, next),
            (Idle, ExtendingContext)
                | (ExtendingContext, Narrating)
                // Continuation turns produce no narration
                | (ExtendingContext, Replying)
                | (Narrating, Replying)
                | (Replying, UpdatingMemory)
                | (UpdatingMemory, Done)
                | (_, Idle)
        )
    }
}

/// Input for one turn
#[derive(Debug, Clone, Copy)]
pub struct TurnRequest<'a> {
    pub character: &'a Character,
    pub raw_context: &'a str,
    pub user_input: &'a str,
    pub kind: TurnKind,
}

impl<'a> TurnRequest<'a> {
    pub fn new(character: &'a Character, raw_context: &'a str, user_input: &'a str) -> Self {
        Self {
            character,
            raw_context,
            user_input,
            kind: TurnKind::Normal,
        }
    }

    pub fn with_kind(mut self, kind: TurnKind) -> Self {
        self.kind = kind;
        self
    }

    fn narrates(&self) -> bool {
        self.kind != TurnKind::Continuation
    }
}

/// Everything a completed turn produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnOutput {
    /// Narrator text, empty for continuation turns
    pub narration: String,
    /// The character's full reply
    pub dialogue: String,
    /// Raw context with this exchange appended
    pub new_context: String,
    /// Memory changes, absent when the memory update failed
    pub memory: Option<MemoryDelta>,
}

/// Runs turns one at a time against a generation service
pub struct TurnOrchestrator {
    service: Arc<dyn GenerationService>,
    assembler: ContextAssembler,
    handle: SessionHandle,
    event_tx: broadcast::Sender<TurnEvent>,
}

impl TurnOrchestrator {
    pub fn new(service: Arc<dyn GenerationService>) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            service,
            assembler: ContextAssembler::default(),
            handle: SessionHandle::new(),
            event_tx,
        }
    }

    /// Subscribe to turn events
    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.event_tx.subscribe()
    }

    pub fn state(&self) -> TurnState {
        self.handle.state()
    }

    pub fn service(&self) -> &Arc<dyn GenerationService> {
        &self.service
    }

    fn transition(&self, next: TurnState) {
        let current = self.handle.state();
        debug_assert!(
            current.can_transition_to(next),
            "invalid turn transition {current:?} -> {next:?}"
        );
        tracing::debug!(from = ?current, to = ?next, "turn state");
        self.handle.set_state(next);
        let _ = self.event_tx.send(TurnEvent::StateChanged { state: next });
    }

    fn fail(&self, error: Error, memory_only: bool) -> Error {
        let _ = self.event_tx.send(TurnEvent::Error {
            message: error.to_string(),
            memory_only,
        });
        self.handle.set_state(TurnState::Idle);
        error
    }

    /// Run one turn to completion.
    ///
    /// Generation failures abort before memory is touched. A memory failure
    /// returns [`Error::MemoryUpdate`] carrying the produced text.
    pub async fn process_turn(
        &mut self,
        memory: &mut MemoryManager,
        request: TurnRequest<'_>,
    ) -> Result<TurnOutput> {
        let _guard = self.handle.begin()?;
        let _ = self.event_tx.send(TurnEvent::TurnStart { kind: request.kind });
        tracing::debug!(kind = ?request.kind, input_chars = request.user_input.chars().count(), "turn start");

        self.transition(TurnState::ExtendingContext);
        let extended = self
            .assembler
            .assemble(memory, request.raw_context, request.user_input);

        let narration = if request.narrates() {
            self.transition(TurnState::Narrating);
            let opened = self
                .service
                .complete_narration(request.character, &extended, request.user_input)
                .await;
            match self.drain(Agent::Narrator, opened).await {
                Ok(text) => text,
                Err(e) => return Err(self.fail(e, false)),
            }
        } else {
            String::new()
        };

        self.transition(TurnState::Replying);
        let opened = self
            .service
            .complete_dialogue(request.character, &extended, request.user_input)
            .await;
        let dialogue = match self.drain(Agent::Character, opened).await {
            Ok(text) => text,
            Err(e) => return Err(self.fail(e, false)),
        };

        let new_context = format!(
            "{}\n\nUser: {}\n{}: {}",
            request.raw_context, request.user_input, request.character.name, dialogue
        );

        self.transition(TurnState::UpdatingMemory);
        let update = memory
            .update(self.service.as_ref(), request.user_input, &dialogue)
            .await;

        let mut output = TurnOutput {
            narration,
            dialogue,
            new_context,
            memory: None,
        };

        match update {
            Ok(delta) => {
                let _ = self.event_tx.send(TurnEvent::MemoryUpdated {
                    summary: delta.summary.clone(),
                    new_facts: delta.new_facts.clone(),
                });
                output.memory = Some(delta);
            }
            Err(e) => {
                tracing::warn!(error = %e, "memory update failed; keeping turn output");
                return Err(self.fail(
                    Error::MemoryUpdate {
                        output: Box::new(output),
                        source: Box::new(e),
                    },
                    true,
                ));
            }
        }

        self.transition(TurnState::Done);
        let _ = self.event_tx.send(TurnEvent::TurnEnd { kind: request.kind });
        Ok(output)
    }

    /// Drain one agent's stream fully, forwarding fragments as events
    async fn drain(&self, agent: Agent, opened: Result<FragmentStream>) -> Result<String> {
        let mut stream = opened?;
        let mut text = String::new();
        while let Some(fragment) = stream.next().await {
            let fragment = fragment?;
            text.push_str(&fragment);
            let event = match agent {
                Agent::Narrator => TurnEvent::NarrationDelta { delta: fragment },
                Agent::Character => TurnEvent::DialogueDelta { delta: fragment },
            };
            let _ = self.event_tx.send(event);
        }
        let end = match agent {
            Agent::Narrator => TurnEvent::NarrationEnd {
                narration: text.clone(),
            },
            Agent::Character => TurnEvent::DialogueEnd {
                dialogue: text.clone(),
            },
        };
        let _ = self.event_tx.send(end);
        Ok(text)
    }
}
