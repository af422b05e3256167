//! Session state types

use crate::config::ANONYMOUS_USER_ID;
use serde::{Deserialize, Serialize};

/// Identifies one submitted turn's request
pub type RequestId = u64;

/// Whether a reply is in flight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatState {
    /// Ready for input
    #[default]
    Idle,

    /// Request sent, reply streaming or not yet started
    AwaitingResponse { request_id: RequestId },
}

impl ChatState {
    pub fn is_awaiting(&self) -> bool {
        matches!(self, ChatState::AwaitingResponse { .. })
    }

    /// Request currently in flight
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            ChatState::Idle => None,
            ChatState::AwaitingResponse { request_id } => Some(*request_id),
        }
    }
}

/// Launcher collapsed or panel open. Only changed by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Collapsed,
    Expanded,
}

impl Visibility {
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Visibility::Collapsed => Visibility::Expanded,
            Visibility::Expanded => Visibility::Collapsed,
        }
    }
}

/// Identity of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionContext {
    /// Widget instance, for logs
    pub session_id: String,
    /// Logged-in patient, `None` when anonymous
    pub user_id: Option<String>,
}

impl SessionContext {
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id,
        }
    }

    /// Identity sent with each request
    pub fn wire_user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or(ANONYMOUS_USER_ID)
    }
}
