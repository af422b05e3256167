//! Mock implementations for testing
//!
//! These mocks enable integration testing without real I/O.

use crate::config::ChatConfig;
use crate::controller::WidgetEvent;
use crate::conversation::{Role, Turn};
use crate::error::TransportError;
use crate::runtime::{spawn_session, SessionHandle};
use crate::transport::{ChatRequest, ChatTransport, ResponseStream, StreamEvent};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

// ============================================================================
// Mock Transport
// ============================================================================

/// One step of a scripted reply
#[derive(Debug, Clone)]
pub enum MockStep {
    Chunk(String),
    Done(Option<String>),
    Fail(TransportError),
    /// Hold the stream until the gate is notified
    Wait(Arc<Notify>),
}

/// Mock transport that plays back queued replies
pub struct MockTransport {
    replies: Mutex<VecDeque<Vec<MockStep>>>,
    /// Record of all requests made
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue cumulative chunks followed by a clean end
    pub fn queue_reply(&self, chunks: &[&str], final_text: Option<&str>) {
        let mut steps = chunk_steps(chunks);
        steps.push(MockStep::Done(final_text.map(str::to_string)));
        self.queue_script(steps);
    }

    /// Queue chunks followed by a failure
    pub fn queue_failure(&self, chunks: &[&str], error: TransportError) {
        let mut steps = chunk_steps(chunks);
        steps.push(MockStep::Fail(error));
        self.queue_script(steps);
    }

    pub fn queue_script(&self, steps: Vec<MockStep>) {
        self.replies.lock().unwrap().push_back(steps);
    }

    /// Get recorded requests
    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

fn chunk_steps(chunks: &[&str]) -> Vec<MockStep> {
    chunks
        .iter()
        .map(|chunk| MockStep::Chunk((*chunk).to_string()))
        .collect()
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send(&self, request: &ChatRequest) -> ResponseStream {
        self.requests.lock().unwrap().push(request.clone());
        let steps = self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            vec![MockStep::Fail(TransportError::network(
                "No mock reply queued",
            ))]
        });

        stream::iter(steps)
            .filter_map(|step| async move {
                match step {
                    MockStep::Chunk(text) => Some(StreamEvent::Chunk(text)),
                    MockStep::Done(final_text) => Some(StreamEvent::Done { final_text }),
                    MockStep::Fail(error) => Some(StreamEvent::Failed(error)),
                    MockStep::Wait(gate) => {
                        gate.notified().await;
                        None
                    }
                }
            })
            .boxed()
    }
}

// ============================================================================
// Test Runtime
// ============================================================================

/// Helper for building test sessions with minimal boilerplate
pub struct TestRuntime {
    pub handle: SessionHandle,
    pub events: broadcast::Receiver<WidgetEvent>,
    pub transport: Arc<MockTransport>,
    _runtime_handle: tokio::task::JoinHandle<()>,
}

impl TestRuntime {
    pub fn new() -> TestRuntimeBuilder {
        TestRuntimeBuilder::new()
    }
}

pub struct TestRuntimeBuilder {
    transport: Option<MockTransport>,
    user_id: Option<String>,
    greeting: String,
}

impl TestRuntimeBuilder {
    pub fn new() -> Self {
        Self {
            transport: None,
            user_id: None,
            greeting: "greeting".to_string(),
        }
    }

    pub fn transport(mut self, transport: MockTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn user_id(mut self, id: impl Into<String>) -> Self {
        self.user_id = Some(id.into());
        self
    }

    pub fn build(self) -> TestRuntime {
        let transport = Arc::new(self.transport.unwrap_or_default());
        let config = ChatConfig {
            user_id: self.user_id,
            greeting: self.greeting,
            ..ChatConfig::default()
        };

        let (handle, task) = spawn_session(&config, Arc::clone(&transport));
        let events = handle.subscribe();

        TestRuntime {
            handle,
            events,
            transport,
            _runtime_handle: task,
        }
    }
}

impl Default for TestRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestRuntime {
    /// Wait for the first event matching `pred`, collecting everything seen
    /// on the way
    pub async fn wait_for(
        &mut self,
        pred: impl Fn(&WidgetEvent) -> bool,
        timeout: Duration,
    ) -> Option<Vec<WidgetEvent>> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut seen = Vec::new();
        while tokio::time::Instant::now() < deadline {
            match tokio::time::timeout(Duration::from_millis(50), self.events.recv()).await {
                Ok(Ok(event)) => {
                    let done = pred(&event);
                    seen.push(event);
                    if done {
                        return Some(seen);
                    }
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return None,
                _ => continue,
            }
        }
        None
    }

    /// Wait for the next committed assistant turn
    pub async fn wait_for_reply(&mut self) -> Option<Turn> {
        let seen = self
            .wait_for(
                |e| matches!(e, WidgetEvent::TurnCommitted { turn } if turn.role == Role::Assistant),
                Duration::from_secs(2),
            )
            .await?;
        match seen.last() {
            Some(WidgetEvent::TurnCommitted { turn }) => Some(turn.clone()),
            _ => None,
        }
    }

    pub async fn submit(&self, text: &str) {
        self.handle.submit(text).await.expect("Failed to submit");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ErrorMessages;
    use crate::error::ErrorKind;
    use crate::state_machine::{ChatState, Visibility};

    const WAIT: Duration = Duration::from_secs(2);

    fn is_pending(event: &WidgetEvent) -> bool {
        matches!(event, WidgetEvent::PendingUpdated { .. })
    }

    #[tokio::test]
    async fn test_mock_transport_defaults_to_network_failure() {
        let transport = MockTransport::new();
        let request = ChatRequest {
            message: "Hi".to_string(),
            history: vec![],
            user_id: "default".to_string(),
        };
        let events: Vec<_> = transport.send(&request).await.collect().await;
        assert!(matches!(
            events.as_slice(),
            [StreamEvent::Failed(TransportError { kind: ErrorKind::Network, .. })]
        ));
        assert_eq!(transport.recorded_requests(), vec![request]);
    }

    /// Integration test: the opening-hours exchange
    #[tokio::test]
    async fn test_simple_reply() {
        let transport = MockTransport::new();
        transport.queue_reply(&["Lun", "Lun - Ven: 8h - 18h"], Some("Lun - Ven: 8h - 18h"));

        let mut rt = TestRuntime::new().transport(transport).build();
        rt.submit("What are your hours?").await;

        let reply = rt.wait_for_reply().await.unwrap();
        assert_eq!(reply, Turn::assistant("Lun - Ven: 8h - 18h"));

        let snapshot = rt.handle.snapshot().await.unwrap();
        assert_eq!(
            snapshot.turns,
            vec![
                Turn::assistant("greeting"),
                Turn::user("What are your hours?"),
                Turn::assistant("Lun - Ven: 8h - 18h"),
            ]
        );
        assert_eq!(snapshot.state, ChatState::Idle);
        assert!(snapshot.pending.is_none());

        let requests = rt.transport.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].history, vec![Turn::assistant("greeting")]);
        assert_eq!(requests[0].user_id, "default");
    }

    #[tokio::test]
    async fn test_cumulative_chunks_commit_once() {
        let transport = MockTransport::new();
        transport.queue_reply(&["H", "He", "Hello"], Some("Hello"));

        let mut rt = TestRuntime::new().transport(transport).build();
        rt.submit("Hi").await;

        let seen = rt
            .wait_for(
                |e| matches!(e, WidgetEvent::StateChanged { state: ChatState::Idle }),
                WAIT,
            )
            .await
            .unwrap();

        let pending: Vec<_> = seen
            .iter()
            .filter_map(|e| match e {
                WidgetEvent::PendingUpdated { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(pending, vec!["H", "He", "Hello"]);

        let assistant_commits = seen
            .iter()
            .filter(|e| matches!(e, WidgetEvent::TurnCommitted { turn } if turn.role == Role::Assistant))
            .count();
        assert_eq!(assistant_commits, 1);
        assert!(seen.contains(&WidgetEvent::PendingCleared));
    }

    #[tokio::test]
    async fn test_partial_reply_then_network_failure() {
        let transport = MockTransport::new();
        transport.queue_failure(&["Par"], TransportError::network("connection reset"));

        let mut rt = TestRuntime::new().transport(transport).build();
        rt.submit("Hello").await;

        let seen = rt
            .wait_for(|e| matches!(e, WidgetEvent::ErrorRaised { .. }), WAIT)
            .await
            .unwrap();
        assert!(seen.iter().any(is_pending));

        let network = ErrorMessages::default().network;
        let snapshot = rt.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.turns.len(), 3);
        assert_eq!(snapshot.turns[2], Turn::assistant(network.clone()));
        assert!(snapshot.turns.iter().all(|t| t.content != "Par"));
        assert!(snapshot.pending.is_none());

        let error = snapshot.last_error.unwrap();
        assert_eq!(error.kind, ErrorKind::Network);
        assert_eq!(error.message, network);
    }

    #[tokio::test]
    async fn test_submit_while_awaiting_is_rejected() {
        let gate = Arc::new(Notify::new());
        let transport = MockTransport::new();
        transport.queue_script(vec![
            MockStep::Chunk("Par".to_string()),
            MockStep::Wait(gate.clone()),
            MockStep::Done(Some("Partout".to_string())),
        ]);

        let mut rt = TestRuntime::new().transport(transport).build();
        rt.submit("first").await;
        assert!(rt.wait_for(is_pending, WAIT).await.is_some());

        rt.submit("second").await;
        assert!(rt
            .wait_for(|e| matches!(e, WidgetEvent::Rejected { .. }), WAIT)
            .await
            .is_some());

        let snapshot = rt.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.turns.len(), 2);
        assert_eq!(snapshot.pending.as_deref(), Some("Par"));

        gate.notify_one();
        assert_eq!(rt.wait_for_reply().await, Some(Turn::assistant("Partout")));
        assert_eq!(rt.transport.recorded_requests().len(), 1);
    }

    /// Collapsing the widget does not cancel the reply in progress
    #[tokio::test]
    async fn test_collapse_during_reply() {
        let gate = Arc::new(Notify::new());
        let transport = MockTransport::new();
        transport.queue_script(vec![
            MockStep::Chunk("Bon".to_string()),
            MockStep::Wait(gate.clone()),
            MockStep::Chunk("Bonjour".to_string()),
            MockStep::Done(None),
        ]);

        let mut rt = TestRuntime::new().transport(transport).build();
        rt.handle.expand().await.unwrap();
        rt.submit("Hello").await;
        assert!(rt.wait_for(is_pending, WAIT).await.is_some());

        rt.handle.collapse().await.unwrap();
        assert!(rt
            .wait_for(
                |e| matches!(e, WidgetEvent::VisibilityChanged { visibility: Visibility::Collapsed }),
                WAIT,
            )
            .await
            .is_some());

        gate.notify_one();
        assert_eq!(rt.wait_for_reply().await, Some(Turn::assistant("Bonjour")));

        let snapshot = rt.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.visibility, Visibility::Collapsed);
        assert_eq!(snapshot.turns.len(), 3);
    }

    #[tokio::test]
    async fn test_identity_change_mid_reply() {
        let gate = Arc::new(Notify::new());
        let transport = MockTransport::new();
        transport.queue_script(vec![
            MockStep::Chunk("Hel".to_string()),
            MockStep::Wait(gate.clone()),
            MockStep::Chunk("Hello".to_string()),
            MockStep::Done(Some("Hello".to_string())),
        ]);
        transport.queue_reply(&["Salut"], Some("Salut"));

        let mut rt = TestRuntime::new().transport(transport).build();
        rt.submit("Hi").await;
        assert!(rt.wait_for(is_pending, WAIT).await.is_some());

        rt.handle
            .switch_identity(Some("patient-2".to_string()))
            .await
            .unwrap();
        let seen = rt
            .wait_for(|e| matches!(e, WidgetEvent::ConversationReset { .. }), WAIT)
            .await
            .unwrap();
        assert_eq!(
            seen.last(),
            Some(&WidgetEvent::ConversationReset {
                turns: vec![Turn::assistant("greeting")]
            })
        );

        // The abandoned request finishes after the reset
        gate.notify_one();
        rt.submit("Bonjour").await;
        assert_eq!(rt.wait_for_reply().await, Some(Turn::assistant("Salut")));

        let snapshot = rt.handle.snapshot().await.unwrap();
        assert_eq!(
            snapshot.turns,
            vec![
                Turn::assistant("greeting"),
                Turn::user("Bonjour"),
                Turn::assistant("Salut"),
            ]
        );

        let requests = rt.transport.recorded_requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].user_id, "default");
        assert_eq!(requests[1].user_id, "patient-2");
        assert_eq!(requests[1].history, vec![Turn::assistant("greeting")]);
    }

    #[tokio::test]
    async fn test_error_cleared_by_next_submit() {
        let transport = MockTransport::new();
        transport.queue_failure(&[], TransportError::from_status(500, "boom"));
        transport.queue_reply(&["Oui"], Some("Oui"));

        let mut rt = TestRuntime::new().transport(transport).build();
        rt.submit("Hello").await;
        let failed = rt.wait_for_reply().await.unwrap();
        assert_eq!(failed.content, ErrorMessages::default().server);
        assert!(rt.handle.snapshot().await.unwrap().last_error.is_some());

        rt.submit("Again").await;
        let seen = rt
            .wait_for(|e| matches!(e, WidgetEvent::ErrorCleared), WAIT)
            .await
            .unwrap();
        assert!(!seen.iter().any(is_pending));

        assert_eq!(rt.wait_for_reply().await, Some(Turn::assistant("Oui")));
        assert!(rt.handle.snapshot().await.unwrap().last_error.is_none());
    }

    #[tokio::test]
    async fn test_rounds_grow_history() {
        let transport = MockTransport::new();
        for i in 0..3 {
            let reply = format!("reply {i}");
            transport.queue_reply(&[reply.as_str()], Some(reply.as_str()));
        }

        let mut rt = TestRuntime::new().transport(transport).user_id("patient-1").build();
        for i in 0..3 {
            rt.submit(&format!("question {i}")).await;
            assert_eq!(
                rt.wait_for_reply().await,
                Some(Turn::assistant(format!("reply {i}")))
            );
        }

        let snapshot = rt.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.turns.len(), 7);

        let requests = rt.transport.recorded_requests();
        for (i, request) in requests.iter().enumerate() {
            assert_eq!(request.history.len(), 1 + 2 * i);
            assert_eq!(request.message, format!("question {i}"));
            assert_eq!(request.user_id, "patient-1");
        }
    }

    #[tokio::test]
    async fn test_stream_without_terminal_still_answers() {
        let transport = MockTransport::new();
        transport.queue_script(vec![MockStep::Chunk("Bon".to_string())]);

        let mut rt = TestRuntime::new().transport(transport).build();
        rt.submit("Hello").await;

        let reply = rt.wait_for_reply().await.unwrap();
        assert_eq!(reply.content, ErrorMessages::default().unknown);

        let snapshot = rt.handle.snapshot().await.unwrap();
        assert_eq!(snapshot.last_error.map(|e| e.kind), Some(ErrorKind::Unknown));
        assert_eq!(snapshot.state, ChatState::Idle);
    }

    #[tokio::test]
    async fn test_session_stops_when_handles_dropped() {
        let (handle, task) = spawn_session(&ChatConfig::default(), MockTransport::new());
        let clone = handle.clone();
        drop(handle);
        assert!(clone.snapshot().await.is_ok());
        drop(clone);

        tokio::time::timeout(WAIT, task)
            .await
            .expect("session did not stop")
            .unwrap();
    }

    #[tokio::test]
    async fn test_event_stream_sees_visibility() {
        let rt = TestRuntime::new().build();
        let mut events = rt.handle.events();
        rt.handle.toggle().await.unwrap();

        let event = tokio::time::timeout(WAIT, events.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(
            event,
            WidgetEvent::VisibilityChanged {
                visibility: Visibility::Expanded
            }
        );
    }
}
