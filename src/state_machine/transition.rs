//! Pure state transition function
//!
//! Given the same state, context and event this always produces the same
//! result and performs no I/O.

use super::{ChatState, Effect, Event, SessionContext};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug, PartialEq, Eq)]
pub struct TransitionResult {
    pub new_state: ChatState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ChatState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    #[must_use]
    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("A reply is still in progress, wait for it before sending")]
    Busy,
    #[error("Message is empty")]
    EmptyMessage,
    #[error("Response for request {request_id} does not match the request in flight")]
    StaleResponse { request_id: u64 },
}

pub fn transition(
    state: &ChatState,
    context: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (state, event) {
        // ============================================================
        // Submission
        // ============================================================

        // Idle + UserSubmit -> AwaitingResponse
        (ChatState::Idle, Event::UserSubmit { text, request_id }) => {
            let message = text.trim();
            if message.is_empty() {
                return Err(TransitionError::EmptyMessage);
            }
            Ok(
                TransitionResult::new(ChatState::AwaitingResponse { request_id }).with_effects([
                    Effect::ClearError,
                    Effect::open_stream(request_id, message),
                    Effect::append_user_turn(message),
                ]),
            )
        }

        // One request at a time; nothing is queued
        (ChatState::AwaitingResponse { .. }, Event::UserSubmit { .. }) => {
            Err(TransitionError::Busy)
        }

        // ============================================================
        // Streaming
        // ============================================================

        (
            ChatState::AwaitingResponse { request_id: current },
            Event::ResponseChunk { request_id, text },
        ) if *current == request_id => {
            Ok(TransitionResult::new(*state).with_effect(Effect::UpdatePending { text }))
        }

        (
            ChatState::AwaitingResponse { request_id: current },
            Event::ResponseComplete {
                request_id,
                final_text,
            },
        ) if *current == request_id => Ok(TransitionResult::new(ChatState::Idle)
            .with_effect(Effect::CommitResponse { final_text })),

        (
            ChatState::AwaitingResponse { request_id: current },
            Event::ResponseFailed { request_id, error },
        ) if *current == request_id => Ok(TransitionResult::new(ChatState::Idle)
            .with_effect(Effect::CommitFailure { error })),

        // Late or foreign transport events (e.g. after an identity reset)
        (
            _,
            Event::ResponseChunk { request_id, .. }
            | Event::ResponseComplete { request_id, .. }
            | Event::ResponseFailed { request_id, .. },
        ) => Err(TransitionError::StaleResponse { request_id }),

        // ============================================================
        // Identity
        // ============================================================

        (_, Event::IdentityChanged { user_id }) => {
            if context.user_id == user_id {
                return Ok(TransitionResult::new(*state));
            }
            Ok(TransitionResult::new(ChatState::Idle)
                .with_effect(Effect::ResetConversation { user_id }))
        }
    }
}
