//! Session controller
//!
//! Owns the session state, widget visibility and the conversation. Every
//! mutation goes through [`transition`] and the effects it returns, so the
//! controller is the single writer between transport events.

use crate::config::ChatConfig;
use crate::conversation::{ConversationStore, Turn};
use crate::error::{ErrorKind, SessionError, TransportError};
use crate::reconciler::{Outcome, Reconciler};
use crate::state_machine::{
    transition, ChatState, Effect, Event, RequestId, SessionContext, TransitionError, Visibility,
};
use crate::transport::{ChatRequest, StreamEvent};
use serde::Serialize;

/// Error banner shown until the next accepted submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LastError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Changes the widget has to render
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WidgetEvent {
    TurnCommitted { turn: Turn },
    PendingUpdated { text: String },
    PendingCleared,
    StateChanged { state: ChatState },
    VisibilityChanged { visibility: Visibility },
    ErrorRaised { error: LastError },
    ErrorCleared,
    ConversationReset { turns: Vec<Turn> },
    /// A command was refused (e.g. submit while a reply is in progress)
    Rejected { reason: String },
}

/// Everything the widget needs to draw itself from scratch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub turns: Vec<Turn>,
    pub pending: Option<String>,
    pub state: ChatState,
    pub visibility: Visibility,
    pub last_error: Option<LastError>,
}

/// An accepted submission
#[derive(Debug)]
pub struct Submission {
    pub request_id: RequestId,
    pub request: ChatRequest,
    pub events: Vec<WidgetEvent>,
}

#[derive(Debug, Default)]
struct Applied {
    events: Vec<WidgetEvent>,
    request: Option<(RequestId, ChatRequest)>,
}

pub struct SessionController {
    context: SessionContext,
    state: ChatState,
    visibility: Visibility,
    last_error: Option<LastError>,
    store: ConversationStore,
    reconciler: Reconciler,
    next_request_id: RequestId,
}

impl SessionController {
    pub fn new(config: &ChatConfig) -> Self {
        Self {
            context: SessionContext::new(config.user_id.clone()),
            state: ChatState::Idle,
            visibility: Visibility::Collapsed,
            last_error: None,
            store: ConversationStore::new(config.greeting.clone()),
            reconciler: Reconciler::new(config.error_messages.clone()),
            next_request_id: 1,
        }
    }

    /// Submit the patient's message. On success the caller must send the
    /// returned request and feed its stream back through
    /// [`Self::on_stream_event`].
    pub fn submit(&mut self, text: &str) -> Result<Submission, SessionError> {
        let request_id = self.next_request_id;
        let applied = match self.process(Event::UserSubmit {
            text: text.to_string(),
            request_id,
        }) {
            Ok(applied) => applied,
            Err(ProcessError::Transition(TransitionError::EmptyMessage)) => {
                return Err(SessionError::EmptyMessage);
            }
            Err(ProcessError::Transition(e)) => {
                tracing::warn!(
                    session_id = %self.context.session_id,
                    error = %e,
                    "Submit rejected"
                );
                return Err(SessionError::InvalidState(e.to_string()));
            }
            Err(ProcessError::Session(e)) => return Err(e),
        };

        let Some((request_id, request)) = applied.request else {
            return Err(SessionError::InvalidState(
                "accepted submit produced no request".to_string(),
            ));
        };
        self.next_request_id += 1;

        tracing::info!(
            session_id = %self.context.session_id,
            request_id,
            history_len = request.history.len(),
            "Message submitted"
        );

        Ok(Submission {
            request_id,
            request,
            events: applied.events,
        })
    }

    /// Apply one item of a request's response stream
    pub fn on_stream_event(&mut self, request_id: RequestId, event: StreamEvent) -> Vec<WidgetEvent> {
        match self.process(Event::from_stream(request_id, event)) {
            Ok(applied) => applied.events,
            Err(ProcessError::Transition(TransitionError::StaleResponse { request_id })) => {
                tracing::debug!(
                    session_id = %self.context.session_id,
                    request_id,
                    "Dropping event for a request that is no longer in flight"
                );
                vec![]
            }
            Err(e) => {
                tracing::error!(session_id = %self.context.session_id, error = %e, "Stream event failed");
                vec![]
            }
        }
    }

    /// Login, logout or a different patient. Resets the conversation when
    /// the identity actually changes.
    pub fn switch_identity(&mut self, user_id: Option<String>) -> Vec<WidgetEvent> {
        match self.process(Event::IdentityChanged { user_id }) {
            Ok(applied) => applied.events,
            Err(e) => {
                tracing::error!(session_id = %self.context.session_id, error = %e, "Identity change failed");
                vec![]
            }
        }
    }

    pub fn expand(&mut self) -> Option<WidgetEvent> {
        self.set_visibility(Visibility::Expanded)
    }

    pub fn collapse(&mut self) -> Option<WidgetEvent> {
        self.set_visibility(Visibility::Collapsed)
    }

    pub fn toggle(&mut self) -> Option<WidgetEvent> {
        self.set_visibility(self.visibility.toggled())
    }

    // Visibility never touches the request in flight.
    fn set_visibility(&mut self, visibility: Visibility) -> Option<WidgetEvent> {
        if self.visibility == visibility {
            return None;
        }
        self.visibility = visibility;
        Some(WidgetEvent::VisibilityChanged { visibility })
    }

    /// Whether the send control is enabled for this input
    pub fn can_submit(&self, input: &str) -> bool {
        !self.state.is_awaiting() && !input.trim().is_empty()
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    pub fn visibility(&self) -> Visibility {
        self.visibility
    }

    pub fn last_error(&self) -> Option<&LastError> {
        self.last_error.as_ref()
    }

    pub fn turns(&self) -> &[Turn] {
        self.store.turns()
    }

    pub fn pending(&self) -> Option<&str> {
        self.store.pending()
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            turns: self.store.snapshot(),
            pending: self.store.pending().map(str::to_string),
            state: self.state,
            visibility: self.visibility,
            last_error: self.last_error.clone(),
        }
    }

    fn process(&mut self, event: Event) -> Result<Applied, ProcessError> {
        let result = transition(&self.state, &self.context, event)?;

        let mut applied = Applied::default();
        for effect in result.effects {
            self.apply_effect(effect, &mut applied)?;
        }

        if result.new_state != self.state {
            self.state = result.new_state;
            applied
                .events
                .push(WidgetEvent::StateChanged { state: self.state });
        }
        Ok(applied)
    }

    fn apply_effect(&mut self, effect: Effect, applied: &mut Applied) -> Result<(), SessionError> {
        match effect {
            Effect::ClearError => {
                if self.last_error.take().is_some() {
                    applied.events.push(WidgetEvent::ErrorCleared);
                }
            }

            Effect::OpenStream {
                request_id,
                message,
            } => {
                let request = ChatRequest {
                    message,
                    history: self.store.snapshot(),
                    user_id: self.context.wire_user_id().to_string(),
                };
                applied.request = Some((request_id, request));
            }

            Effect::AppendUserTurn { text } => {
                // The transition only accepts a submit while Idle, and Idle
                // means the previous turn was answered or reset.
                debug_assert!(
                    !self.store.is_awaiting_reply() && self.store.pending().is_none(),
                    "store still owes a reply while the session is idle"
                );
                self.store.append_user_turn(text.clone())?;
                self.reconciler.begin_turn();
                applied.events.push(WidgetEvent::TurnCommitted {
                    turn: Turn::user(text),
                });
            }

            Effect::UpdatePending { text } => {
                self.reconciler.on_chunk(&mut self.store, &text);
                applied.events.push(WidgetEvent::PendingUpdated { text });
            }

            Effect::CommitResponse { final_text } => {
                let had_pending = self.store.pending().is_some();
                let outcome = self
                    .reconciler
                    .on_complete(&mut self.store, final_text.as_deref());
                self.record_outcome(outcome, had_pending, applied);
            }

            Effect::CommitFailure { error } => {
                let had_pending = self.store.pending().is_some();
                let outcome = self.reconciler.on_failure(&mut self.store, &error);
                self.log_failure(&error);
                self.record_outcome(outcome, had_pending, applied);
            }

            Effect::ResetConversation { user_id } => {
                tracing::info!(
                    session_id = %self.context.session_id,
                    abandoned_request = ?self.state.request_id(),
                    "Identity changed, resetting conversation"
                );
                let had_pending = self.store.pending().is_some();
                self.store.reset();
                self.reconciler.abandon();
                self.context.user_id = user_id;

                if had_pending {
                    applied.events.push(WidgetEvent::PendingCleared);
                }
                if self.last_error.take().is_some() {
                    applied.events.push(WidgetEvent::ErrorCleared);
                }
                applied.events.push(WidgetEvent::ConversationReset {
                    turns: self.store.snapshot(),
                });
            }
        }
        Ok(())
    }

    fn record_outcome(&mut self, outcome: Option<Outcome>, had_pending: bool, applied: &mut Applied) {
        if had_pending {
            applied.events.push(WidgetEvent::PendingCleared);
        }
        let Some(outcome) = outcome else {
            return;
        };
        if let Some(kind) = outcome.error_kind() {
            let error = LastError {
                kind,
                message: outcome.turn().content.clone(),
            };
            self.last_error = Some(error.clone());
            applied.events.push(WidgetEvent::TurnCommitted {
                turn: outcome.turn().clone(),
            });
            applied.events.push(WidgetEvent::ErrorRaised { error });
        } else {
            applied.events.push(WidgetEvent::TurnCommitted {
                turn: outcome.turn().clone(),
            });
        }
    }

    fn log_failure(&self, error: &TransportError) {
        tracing::warn!(
            session_id = %self.context.session_id,
            request_id = ?self.state.request_id(),
            chunks = self.reconciler.chunk_count(),
            kind = %error.kind,
            status = ?error.status,
            error = %error.message,
            "Reply failed"
        );
    }
}

#[derive(Debug, thiserror::Error)]
enum ProcessError {
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Session(#[from] SessionError),
}
