//! Runtime for driving a chat session
//!
//! One task owns the [`SessionController`]; widgets talk to it through a
//! cloneable [`SessionHandle`] and render the [`WidgetEvent`]s it
//! broadcasts. Transport streams run as background tasks that feed their
//! items back into the same loop.

mod executor;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;

use crate::config::ChatConfig;
use crate::controller::{SessionController, SessionSnapshot, WidgetEvent};
use crate::error::SessionError;
use crate::transport::ChatTransport;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::BroadcastStream;

const COMMAND_BUFFER: usize = 32;
const EVENT_BUFFER: usize = 256;

/// Requests from the widget
#[derive(Debug)]
pub enum Command {
    Submit { text: String },
    Expand,
    Collapse,
    Toggle,
    SwitchIdentity { user_id: Option<String> },
    Snapshot { reply: oneshot::Sender<SessionSnapshot> },
}

/// Handle to interact with a running session
#[derive(Clone)]
pub struct SessionHandle {
    command_tx: mpsc::Sender<Command>,
    broadcast_tx: broadcast::Sender<WidgetEvent>,
}

impl SessionHandle {
    /// Submit a message. Rejections arrive as [`WidgetEvent::Rejected`].
    pub async fn submit(&self, text: impl Into<String>) -> Result<(), SessionError> {
        self.send(Command::Submit { text: text.into() }).await
    }

    pub async fn expand(&self) -> Result<(), SessionError> {
        self.send(Command::Expand).await
    }

    pub async fn collapse(&self) -> Result<(), SessionError> {
        self.send(Command::Collapse).await
    }

    pub async fn toggle(&self) -> Result<(), SessionError> {
        self.send(Command::Toggle).await
    }

    /// Login, logout or patient switch
    pub async fn switch_identity(&self, user_id: Option<String>) -> Result<(), SessionError> {
        self.send(Command::SwitchIdentity { user_id }).await
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply }).await?;
        rx.await.map_err(|_| SessionError::Closed)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WidgetEvent> {
        self.broadcast_tx.subscribe()
    }

    /// Widget events as a stream; lagged receivers see an error item
    pub fn events(&self) -> BroadcastStream<WidgetEvent> {
        BroadcastStream::new(self.subscribe())
    }

    async fn send(&self, command: Command) -> Result<(), SessionError> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SessionError::Closed)
    }
}

/// Start a session on the current tokio runtime. The session stops once
/// every handle has been dropped.
pub fn spawn_session<T>(config: &ChatConfig, transport: T) -> (SessionHandle, JoinHandle<()>)
where
    T: ChatTransport + 'static,
{
    let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
    let (broadcast_tx, _) = broadcast::channel(EVENT_BUFFER);

    let runtime = SessionRuntime::new(
        SessionController::new(config),
        transport,
        command_rx,
        broadcast_tx.clone(),
    );
    let task = tokio::spawn(runtime.run());

    (
        SessionHandle {
            command_tx,
            broadcast_tx,
        },
        task,
    )
}
