//! Events that drive the session

use super::state::RequestId;
use crate::error::TransportError;
use crate::transport::StreamEvent;

/// Events that trigger state transitions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    // User events
    UserSubmit {
        text: String,
        /// Id the request will carry if the submit is accepted
        request_id: RequestId,
    },
    IdentityChanged {
        user_id: Option<String>,
    },

    // Transport events
    ResponseChunk {
        request_id: RequestId,
        text: String,
    },
    ResponseComplete {
        request_id: RequestId,
        final_text: Option<String>,
    },
    ResponseFailed {
        request_id: RequestId,
        error: TransportError,
    },
}

impl Event {
    /// Tag a transport stream item with the request it belongs to
    pub fn from_stream(request_id: RequestId, event: StreamEvent) -> Self {
        match event {
            StreamEvent::Chunk(text) => Event::ResponseChunk { request_id, text },
            StreamEvent::Done { final_text } => Event::ResponseComplete {
                request_id,
                final_text,
            },
            StreamEvent::Failed(error) => Event::ResponseFailed { request_id, error },
        }
    }

    /// Request id for transport events
    pub fn response_id(&self) -> Option<RequestId> {
        match self {
            Event::ResponseChunk { request_id, .. }
            | Event::ResponseComplete { request_id, .. }
            | Event::ResponseFailed { request_id, .. } => Some(*request_id),
            Event::UserSubmit { .. } | Event::IdentityChanged { .. } => None,
        }
    }
}
