//! Chat session state machine
//!
//! Pure transitions in the Elm Architecture style: the controller feeds
//! events in and applies the returned effects to the conversation.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;


pub use effect::Effect;
pub use event::Event;
pub use state::{ChatState, RequestId, SessionContext, Visibility};
pub use transition::{transition, TransitionError, TransitionResult};
