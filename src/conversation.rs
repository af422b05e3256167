//! Conversation history for one chat session
//!
//! Committed turns are append-only. The only mutable slot is the pending
//! assistant reply, which is never part of the history sent upstream.


use crate::error::SessionError;
use serde::{Deserialize, Serialize};

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One committed message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered turn history plus the in-progress assistant reply
#[derive(Debug, Clone)]
pub struct ConversationStore {
    greeting: String,
    turns: Vec<Turn>,
    pending: Option<String>,
    /// A user turn has been appended and has not received its reply yet
    awaiting_reply: bool,
}

impl ConversationStore {
    /// Create a store seeded with the assistant greeting
    pub fn new(greeting: impl Into<String>) -> Self {
        let greeting = greeting.into();
        Self {
            turns: vec![Turn::assistant(greeting.clone())],
            greeting,
            pending: None,
            awaiting_reply: false,
        }
    }

    /// Append the patient's message. Rejected while a reply is outstanding.
    pub fn append_user_turn(&mut self, text: impl Into<String>) -> Result<(), SessionError> {
        if self.pending.is_some() {
            return Err(SessionError::InvalidState(
                "a reply is still streaming".to_string(),
            ));
        }
        if self.awaiting_reply {
            return Err(SessionError::InvalidState(
                "previous message has not been answered".to_string(),
            ));
        }
        self.turns.push(Turn::user(text));
        self.awaiting_reply = true;
        Ok(())
    }

    /// Replace the pending reply with the cumulative text so far
    pub fn set_pending(&mut self, text: impl Into<String>) {
        self.pending = Some(text.into());
    }

    /// Commit the pending reply. A non-blank `final_text` wins over what
    /// was streamed. Returns `None` when there is nothing to commit.
    pub fn commit_pending(&mut self, final_text: Option<&str>) -> Option<&Turn> {
        let pending = self.pending.take();
        let content = match final_text {
            Some(text) if !text.trim().is_empty() => text.to_string(),
            _ => pending.filter(|text| !text.trim().is_empty())?,
        };
        self.push_reply(Turn::assistant(content));
        self.turns.last()
    }

    /// Drop the pending reply without committing it
    pub fn discard_pending(&mut self) -> Option<String> {
        self.pending.take()
    }

    /// Commit an assistant turn that did not come from the stream
    pub fn append_assistant_turn(&mut self, text: impl Into<String>) -> Turn {
        let turn = Turn::assistant(text);
        self.pending = None;
        self.push_reply(turn.clone());
        turn
    }

    fn push_reply(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.awaiting_reply = false;
    }

    /// Back to the single greeting turn
    pub fn reset(&mut self) {
        self.turns.clear();
        self.turns.push(Turn::assistant(self.greeting.clone()));
        self.pending = None;
        self.awaiting_reply = false;
    }

    /// Committed turns in order, without the pending reply
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.clone()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
