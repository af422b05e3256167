//! Turns the transport's chunk stream into conversation writes
//!
//! Chunks carry the cumulative text so far, so each one replaces the
//! pending reply. Every accepted user turn receives exactly one assistant
//! turn: the streamed answer, or an error message if the stream failed.

use crate::config::ErrorMessages;
use crate::conversation::{ConversationStore, Turn};
use crate::error::{ErrorKind, TransportError};

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Answered(Turn),
    Failed { turn: Turn, kind: ErrorKind },
}

impl Outcome {
    pub fn turn(&self) -> &Turn {
        match self {
            Outcome::Answered(turn) | Outcome::Failed { turn, .. } => turn,
        }
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Outcome::Answered(_) => None,
            Outcome::Failed { kind, .. } => Some(*kind),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    messages: ErrorMessages,
    /// Whether the current turn still owes its assistant reply
    open: bool,
    chunks: usize,
}

impl Reconciler {
    pub fn new(messages: ErrorMessages) -> Self {
        Self {
            messages,
            open: false,
            chunks: 0,
        }
    }

    /// Start reconciling the reply to a freshly appended user turn
    pub fn begin_turn(&mut self) {
        self.open = true;
        self.chunks = 0;
    }

    /// Forget the current turn without committing (conversation was reset)
    pub fn abandon(&mut self) {
        self.open = false;
        self.chunks = 0;
    }

    /// Chunks applied to the current turn
    pub fn chunk_count(&self) -> usize {
        self.chunks
    }

    pub fn on_chunk(&mut self, store: &mut ConversationStore, text: &str) {
        if !self.open {
            tracing::warn!("Chunk received after the turn was committed, ignoring");
            return;
        }
        self.chunks += 1;
        store.set_pending(text);
    }

    /// Commit the reply. Blank final text falls back to what was streamed;
    /// if nothing usable arrived at all the turn is answered with the
    /// unknown-error message.
    pub fn on_complete(
        &mut self,
        store: &mut ConversationStore,
        final_text: Option<&str>,
    ) -> Option<Outcome> {
        if !self.take_open() {
            return None;
        }

        if final_text.is_none_or(|text| text.trim().is_empty()) && store.pending().is_some() {
            // Server sent no final payload; keep the locally streamed text.
            tracing::debug!(chunks = self.chunks, "Committing streamed text as final reply");
        }

        if let Some(turn) = store.commit_pending(final_text) {
            return Some(Outcome::Answered(turn.clone()));
        }

        // A successful response with an empty body still owes the patient a
        // reply; it is reported as an unknown error rather than committed blank.
        tracing::warn!("Stream completed without any text");
        Some(self.commit_failure(store, ErrorKind::Unknown))
    }

    /// Discard whatever streamed and answer with the error message
    pub fn on_failure(
        &mut self,
        store: &mut ConversationStore,
        error: &TransportError,
    ) -> Option<Outcome> {
        if !self.take_open() {
            return None;
        }
        if let Some(partial) = store.discard_pending() {
            tracing::debug!(
                discarded_len = partial.len(),
                kind = %error.kind,
                "Discarding partial reply"
            );
        }
        Some(self.commit_failure(store, error.kind))
    }

    fn commit_failure(&self, store: &mut ConversationStore, kind: ErrorKind) -> Outcome {
        let turn = store.append_assistant_turn(self.messages.for_kind(kind));
        Outcome::Failed { turn, kind }
    }

    fn take_open(&mut self) -> bool {
        if !self.open {
            tracing::warn!("Turn already committed, ignoring duplicate completion");
            return false;
        }
        self.open = false;
        true
    }
}
