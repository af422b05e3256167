//! Session event loop

use super::Command;
use crate::controller::{SessionController, WidgetEvent};
use crate::error::{SessionError, TransportError};
use crate::state_machine::RequestId;
use crate::transport::{ChatRequest, ChatTransport, StreamEvent};
use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

const STREAM_BUFFER: usize = 64;

/// Transport item tagged with the request that produced it
type Tagged = (RequestId, StreamEvent);

pub struct SessionRuntime<T>
where
    T: ChatTransport + 'static,
{
    controller: SessionController,
    transport: Arc<T>,
    command_rx: mpsc::Receiver<Command>,
    stream_tx: mpsc::Sender<Tagged>,
    stream_rx: mpsc::Receiver<Tagged>,
    broadcast_tx: broadcast::Sender<WidgetEvent>,
}

impl<T> SessionRuntime<T>
where
    T: ChatTransport + 'static,
{
    pub fn new(
        controller: SessionController,
        transport: T,
        command_rx: mpsc::Receiver<Command>,
        broadcast_tx: broadcast::Sender<WidgetEvent>,
    ) -> Self {
        let (stream_tx, stream_rx) = mpsc::channel(STREAM_BUFFER);
        Self {
            controller,
            transport: Arc::new(transport),
            command_rx,
            stream_tx,
            stream_rx,
            broadcast_tx,
        }
    }

    pub async fn run(mut self) {
        let session_id = self.controller.context().session_id.clone();
        tracing::info!(session_id = %session_id, "Starting chat session");

        loop {
            tokio::select! {
                command = self.command_rx.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                Some((request_id, event)) = self.stream_rx.recv() => {
                    let events = self.controller.on_stream_event(request_id, event);
                    self.broadcast(events);
                }
            }
        }

        tracing::info!(session_id = %session_id, "Chat session stopped");
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Submit { text } => match self.controller.submit(&text) {
                Ok(submission) => {
                    self.broadcast(submission.events);
                    self.spawn_request(submission.request_id, submission.request);
                }
                Err(e) => self.reject(&e),
            },
            Command::Expand => {
                let event = self.controller.expand();
                self.broadcast(event);
            }
            Command::Collapse => {
                let event = self.controller.collapse();
                self.broadcast(event);
            }
            Command::Toggle => {
                let event = self.controller.toggle();
                self.broadcast(event);
            }
            Command::SwitchIdentity { user_id } => {
                let events = self.controller.switch_identity(user_id);
                self.broadcast(events);
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.controller.snapshot());
            }
        }
    }

    fn reject(&self, error: &SessionError) {
        tracing::debug!(error = %error, "Command rejected");
        let _ = self.broadcast_tx.send(WidgetEvent::Rejected {
            reason: error.to_string(),
        });
    }

    fn broadcast(&self, events: impl IntoIterator<Item = WidgetEvent>) {
        for event in events {
            // No subscribers is fine; the widget may not be rendered yet
            let _ = self.broadcast_tx.send(event);
        }
    }

    /// Run the request in the background and forward its stream. A stream
    /// that ends without a terminal item is reported as a failure so the
    /// turn still gets its reply.
    fn spawn_request(&self, request_id: RequestId, request: ChatRequest) {
        let transport = Arc::clone(&self.transport);
        let stream_tx = self.stream_tx.clone();

        tokio::spawn(async move {
            let mut stream = transport.send(&request).await;
            while let Some(event) = stream.next().await {
                let terminal = event.is_terminal();
                if stream_tx.send((request_id, event)).await.is_err() {
                    return;
                }
                if terminal {
                    return;
                }
            }

            tracing::warn!(request_id, "Response stream ended without completing");
            let error = TransportError::unknown("Response stream ended without completing");
            let _ = stream_tx.send((request_id, StreamEvent::Failed(error))).await;
        });
    }
}
