//! Medchat - streaming chat session engine for the patient portal assistant
//!
//! The widget sends the patient's message together with the conversation so
//! far, renders the reply as it streams in and commits it once the stream
//! ends. All session logic lives in a pure state machine driven by an async
//! runtime; the HTTP client sits behind a transport trait.

pub mod config;
pub mod controller;
pub mod conversation;
pub mod error;
pub mod reconciler;
pub mod runtime;
pub mod state_machine;
pub mod transport;

pub use config::ChatConfig;
pub use controller::{SessionController, SessionSnapshot, WidgetEvent};
pub use runtime::{spawn_session, SessionHandle};
pub use transport::{ChatTransport, HttpTransport, LoggingTransport};
