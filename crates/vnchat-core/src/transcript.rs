//! The ordered, editable record of a conversation.
//!
//! A transcript is a stack of user messages and character replies. Replies
//! carry alternative versions produced by regeneration; exactly one is active
//! and feeds the rebuilt context. Deleting a message removes it and everything
//! after it.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// Maximum number of entries (greeting included) kept by [`Transcript::rebuild_context`]
pub const MAX_CONTEXT_ENTRIES: usize = 300;

/// Separator between context entries
pub const ENTRY_SEPARATOR: &str = "\n\n";

/// Opaque, stable reference to a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageRef(u64);

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One generated alternative of a character reply
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Version {
    /// Stage-direction text, conventionally wrapped in `*` markers
    pub narration: String,
    /// The spoken line
    pub dialogue: String,
}

impl Version {
    pub fn new(narration: impl Into<String>, dialogue: impl Into<String>) -> Self {
        Self {
            narration: narration.into(),
            dialogue: dialogue.into(),
        }
    }
}

/// A message in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Message {
    User {
        id: MessageRef,
        text: String,
    },
    Reply {
        id: MessageRef,
        versions: Vec<Version>,
        active_index: usize,
    },
}

impl Message {
    pub fn id(&self) -> MessageRef {
        match self {
            Message::User { id, .. } | Message::Reply { id, .. } => *id,
        }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Message::User { .. })
    }

    /// Text of a user message
    pub fn user_text(&self) -> Option<&str> {
        match self {
            Message::User { text, .. } => Some(text),
            Message::Reply { .. } => None,
        }
    }

    /// Active version of a reply, if it has any
    pub fn active_version(&self) -> Option<&Version> {
        match self {
            Message::Reply {
                versions,
                active_index,
                ..
            } => versions.get(*active_index),
            Message::User { .. } => None,
        }
    }

    /// Number of versions (zero for user messages)
    pub fn version_count(&self) -> usize {
        match self {
            Message::Reply { versions, .. } => versions.len(),
            Message::User { .. } => 0,
        }
    }

    /// Index of the active version (zero for user messages)
    pub fn active_index(&self) -> usize {
        match self {
            Message::Reply { active_index, .. } => *active_index,
            Message::User { .. } => 0,
        }
    }
}

/// Ordered sequence of messages with cascade-delete semantics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    messages: Vec<Message>,
    next_id: u64,
    /// The most recently created reply that still exists
    active_reply: Option<MessageRef>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Position of a message in transcript order
    pub fn position(&self, id: MessageRef) -> Option<usize> {
        self.messages.iter().position(|m| m.id() == id)
    }

    pub fn get(&self, id: MessageRef) -> Option<&Message> {
        self.messages.iter().find(|m| m.id() == id)
    }

    /// The reply that continuation turns extend
    pub fn active_reply(&self) -> Option<MessageRef> {
        self.active_reply
    }

    /// Text of the most recent user message
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages.iter().rev().find_map(Message::user_text)
    }

    fn allocate(&mut self) -> MessageRef {
        let id = MessageRef(self.next_id);
        self.next_id += 1;
        id
    }

    /// Add a user message at the end
    pub fn append_user(&mut self, text: impl Into<String>) -> MessageRef {
        let id = self.allocate();
        self.messages.push(Message::User {
            id,
            text: text.into(),
        });
        id
    }

    /// Add an empty reply at the end and make it the active reply.
    ///
    /// The reply is incomplete until [`Transcript::add_version`] is called.
    pub fn append_reply(&mut self) -> MessageRef {
        let id = self.allocate();
        self.messages.push(Message::Reply {
            id,
            versions: Vec::new(),
            active_index: 0,
        });
        self.active_reply = Some(id);
        id
    }

    fn reply_mut(&mut self, id: MessageRef) -> Result<(&mut Vec<Version>, &mut usize)> {
        match self.messages.iter_mut().find(|m| m.id() == id) {
            Some(Message::Reply {
                versions,
                active_index,
                ..
            }) => Ok((versions, active_index)),
            Some(Message::User { .. }) => Err(Error::NotAReply),
            None => Err(Error::UnknownMessage(id)),
        }
    }

    /// Append a version to a reply and make it active. Returns its index.
    pub fn add_version(
        &mut self,
        id: MessageRef,
        narration: impl Into<String>,
        dialogue: impl Into<String>,
    ) -> Result<usize> {
        let (versions, active_index) = self.reply_mut(id)?;
        versions.push(Version::new(narration, dialogue));
        *active_index = versions.len() - 1;
        Ok(*active_index)
    }

    /// Switch the active version. State is unchanged on error.
    pub fn set_active_version(&mut self, id: MessageRef, index: usize) -> Result<()> {
        let (versions, active_index) = self.reply_mut(id)?;
        if index >= versions.len() {
            return Err(Error::OutOfRange {
                index,
                len: versions.len(),
            });
        }
        *active_index = index;
        Ok(())
    }

    /// Replace a user message's text, returning the old text
    pub fn edit_user_text(&mut self, id: MessageRef, new_text: impl Into<String>) -> Result<String> {
        match self.messages.iter_mut().find(|m| m.id() == id) {
            Some(Message::User { text, .. }) => Ok(std::mem::replace(text, new_text.into())),
            Some(Message::Reply { .. }) => Err(Error::NotAUserMessage),
            None => Err(Error::UnknownMessage(id)),
        }
    }

    fn active_version_mut(&mut self, id: MessageRef) -> Result<&mut Version> {
        let (versions, active_index) = self.reply_mut(id)?;
        let index = *active_index;
        versions.get_mut(index).ok_or(Error::IncompleteReply)
    }

    /// Replace the dialogue of the active version. Narration is untouched.
    pub fn edit_active_reply_dialogue(
        &mut self,
        id: MessageRef,
        new_text: impl Into<String>,
    ) -> Result<()> {
        self.active_version_mut(id)?.dialogue = new_text.into();
        Ok(())
    }

    /// Append text to the active version's dialogue
    pub fn append_active_dialogue(&mut self, id: MessageRef, fragment: &str) -> Result<()> {
        self.active_version_mut(id)?.dialogue.push_str(fragment);
        Ok(())
    }

    /// Remove `id` and every message after it. Returns the number removed;
    /// zero if `id` is absent.
    pub fn delete(&mut self, id: MessageRef) -> usize {
        let Some(pos) = self.position(id) else {
            return 0;
        };
        let removed = self.messages.len() - pos;
        self.messages.truncate(pos);
        if let Some(active) = self.active_reply {
            if self.position(active).is_none() {
                self.active_reply = None;
            }
        }
        removed
    }

    /// Remove the trailing reply if it has no versions. Returns whether one was removed.
    pub fn discard_incomplete_reply(&mut self) -> bool {
        match self.messages.last() {
            Some(m @ Message::Reply { .. }) if m.version_count() == 0 => {
                let id = m.id();
                self.delete(id) > 0
            }
            _ => false,
        }
    }

    /// Reconstruct the raw context: the greeting followed by one entry per
    /// message, keeping only the last [`MAX_CONTEXT_ENTRIES`] entries.
    ///
    /// Replies contribute their active dialogue only; replies without
    /// versions are skipped.
    pub fn rebuild_context(&self, character_name: &str, greeting: &str) -> String {
        let mut pieces = Vec::with_capacity(self.messages.len() + 1);
        pieces.push(greeting.to_string());
        for message in &self.messages {
            match message {
                Message::User { text, .. } => pieces.push(format!("User: {text}")),
                Message::Reply { .. } => {
                    if let Some(version) = message.active_version() {
                        pieces.push(format!("{character_name}: {}", version.dialogue));
                    }
                }
            }
        }
        let start = pieces.len().saturating_sub(MAX_CONTEXT_ENTRIES);
        pieces[start..].join(ENTRY_SEPARATOR)
    }

    /// A copy holding only messages before position `end`
    pub fn truncated(&self, end: usize) -> Transcript {
        let mut copy = self.clone();
        if let Some(m) = copy.messages.get(end) {
            let id = m.id();
            copy.delete(id);
        }
        copy
    }

    /// A copy holding only the messages from position `start` on
    pub fn suffix(&self, start: usize) -> Transcript {
        let messages: Vec<Message> = self.messages.iter().skip(start).cloned().collect();
        let active_reply = self
            .active_reply
            .filter(|id| messages.iter().any(|m| m.id() == *id));
        Transcript {
            messages,
            next_id: self.next_id,
            active_reply,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (Transcript, Vec<MessageRef>) {
        let mut t = Transcript::new();
        let mut ids = Vec::new();
        for i in 0..3 {
            ids.push(t.append_user(format!("question {i}")));
            let r = t.append_reply();
            t.add_version(r, "*nods*", format!("answer {i}")).unwrap();
            ids.push(r);
        }
        (t, ids)
    }

    #[test]
    fn test_rebuild_context_layout() {
        let (t, _) = sample();
        let ctx = t.rebuild_context("Ada", "Hello there.");
        assert_eq!(
            ctx,
            "Hello there.\n\nUser: question 0\n\nAda: answer 0\n\nUser: question 1\n\nAda: answer 1\n\nUser: question 2\n\nAda: answer 2"
        );
        assert!(!ctx.contains("*nods*"));
    }

    #[test]
    fn test_rebuild_uses_active_version() {
        let mut t = Transcript::new();
        t.append_user("hi");
        let r = t.append_reply();
        t.add_version(r, "", "first").unwrap();
        t.add_version(r, "", "second").unwrap();
        assert!(t.rebuild_context("Ada", "G").ends_with("Ada: second"));
        t.set_active_version(r, 0).unwrap();
        assert!(t.rebuild_context("Ada", "G").ends_with("Ada: first"));
    }

    #[test]
    fn test_rebuild_skips_incomplete_reply() {
        let mut t = Transcript::new();
        t.append_user("hi");
        t.append_reply();
        assert_eq!(t.rebuild_context("Ada", "G"), "G\n\nUser: hi");
    }

    #[test]
    fn test_cascade_delete_matches_truncated_rebuild() {
        let (original, ids) = sample();
        for (i, id) in ids.iter().enumerate() {
            let mut t = original.clone();
            let removed = t.delete(*id);
            assert_eq!(removed, original.len() - i);
            assert_eq!(t.len(), i);
            assert_eq!(
                t.rebuild_context("Ada", "G"),
                original.truncated(i).rebuild_context("Ada", "G")
            );
            assert_eq!(t.messages(), &original.messages()[..i]);
        }
    }

    #[test]
    fn test_delete_absent_is_noop() {
        let (mut t, ids) = sample();
        t.delete(ids[2]);
        let before = t.clone();
        assert_eq!(t.delete(ids[4]), 0);
        assert_eq!(t, before);
    }

    #[test]
    fn test_delete_clears_active_reply() {
        let (mut t, ids) = sample();
        assert_eq!(t.active_reply(), Some(ids[5]));
        t.delete(ids[4]);
        assert_eq!(t.active_reply(), None);
    }

    #[test]
    fn test_set_active_version_bounds() {
        let mut t = Transcript::new();
        let r = t.append_reply();
        t.add_version(r, "", "a").unwrap();
        t.add_version(r, "", "b").unwrap();
        let before = t.clone();

        let err = t.set_active_version(r, 2).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { index: 2, len: 2 }));
        assert_eq!(t, before);

        t.set_active_version(r, 0).unwrap();
        assert_eq!(t.get(r).unwrap().active_index(), 0);
    }

    #[test]
    fn test_truncation_idempotence() {
        let mut t = Transcript::new();
        for i in 0..200 {
            t.append_user(format!("u{i}"));
            let r = t.append_reply();
            t.add_version(r, "", format!("r{i}")).unwrap();
        }
        assert_eq!(t.len(), 400);

        let full = t.rebuild_context("Ada", "Greeting");
        let suffix = t.suffix(t.len() - MAX_CONTEXT_ENTRIES);
        assert_eq!(full, suffix.rebuild_context("Ada", "Greeting"));
        assert_eq!(full.split(ENTRY_SEPARATOR).count(), MAX_CONTEXT_ENTRIES);
        assert!(!full.contains("Greeting"));
    }

    #[test]
    fn test_edit_user_text_returns_old() {
        let (mut t, ids) = sample();
        let old = t.edit_user_text(ids[0], "changed").unwrap();
        assert_eq!(old, "question 0");
        assert!(matches!(
            t.edit_user_text(ids[1], "x"),
            Err(Error::NotAUserMessage)
        ));
    }

    #[test]
    fn test_edit_reply_dialogue_keeps_narration() {
        let (mut t, ids) = sample();
        t.edit_active_reply_dialogue(ids[1], "edited").unwrap();
        let v = t.get(ids[1]).unwrap().active_version().unwrap();
        assert_eq!(v.dialogue, "edited");
        assert_eq!(v.narration, "*nods*");
    }

    #[test]
    fn test_incomplete_reply_rejects_edits() {
        let mut t = Transcript::new();
        let r = t.append_reply();
        assert!(matches!(
            t.edit_active_reply_dialogue(r, "x"),
            Err(Error::IncompleteReply)
        ));
        assert!(t.discard_incomplete_reply());
        assert!(t.is_empty());
        assert_eq!(t.active_reply(), None);
    }

    #[test]
    fn test_last_user_text() {
        let (t, _) = sample();
        assert_eq!(t.last_user_text(), Some("question 2"));
        assert_eq!(Transcript::new().last_user_text(), None);
    }
}
