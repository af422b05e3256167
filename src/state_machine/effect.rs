//! Effects produced by state transitions

use super::state::RequestId;
use crate::error::TransportError;

/// Effects to be applied, in order, after a transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Hide the error banner
    ClearError,

    /// Send the message to the backend. History is captured when this
    /// effect is applied, before the user turn below is appended.
    OpenStream { request_id: RequestId, message: String },

    /// Record the patient's message
    AppendUserTurn { text: String },

    /// Replace the pending reply with the cumulative text
    UpdatePending { text: String },

    /// Commit the reply for the finished request
    CommitResponse { final_text: Option<String> },

    /// Drop the partial reply and commit an error reply instead
    CommitFailure { error: TransportError },

    /// Start over with the greeting for a new identity
    ResetConversation { user_id: Option<String> },
}

impl Effect {
    pub fn open_stream(request_id: RequestId, message: impl Into<String>) -> Self {
        Effect::OpenStream {
            request_id,
            message: message.into(),
        }
    }

    pub fn append_user_turn(text: impl Into<String>) -> Self {
        Effect::AppendUserTurn { text: text.into() }
    }

    /// Whether this effect commits the assistant turn for a request
    pub fn is_commit(&self) -> bool {
        matches!(
            self,
            Effect::CommitResponse { .. } | Effect::CommitFailure { .. }
        )
    }
}
