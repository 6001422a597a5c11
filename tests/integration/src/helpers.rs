//! Test helpers for integration tests
//!
//! [`ScriptedConnector`] hands out in-memory transports. Every accepted
//! connection yields a [`ServerEnd`] the test uses to play the Pusher server:
//! push frames, inject errors, close with a code and read what the client
//! sent.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_core::{ChatEvent, RoomId};
use chat_realtime::protocol::names;
use chat_realtime::{
    AuthError, AuthProvider, ChannelAuth, Connector, PusherEnvelope, Transport, TransportError,
    TransportEvent,
};
use chat_resilience::{CircuitState, ErrorRateSignal, ErrorRecord, MetricsSink, RetryReport};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

/// Longest a helper waits for something to happen
///
/// Session tests run with paused time, so this is virtual time.
pub const WAIT: Duration = Duration::from_secs(3600);

// ============================================================================
// Scripted transport
// ============================================================================

/// What the connector does with the next connect call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectPlan {
    Accept,
    Refuse,
}

#[derive(Debug)]
pub struct ScriptedConnector {
    plans: Mutex<VecDeque<ConnectPlan>>,
    fallback: ConnectPlan,
    attempts: AtomicU32,
    accepted: mpsc::UnboundedSender<ServerEnd>,
}

impl ScriptedConnector {
    /// Connector that accepts every connection
    pub fn accepting() -> (Arc<Self>, ServerQueue) {
        Self::with_fallback(ConnectPlan::Accept)
    }

    /// Connector that refuses every connection with ECONNREFUSED
    pub fn refusing() -> (Arc<Self>, ServerQueue) {
        Self::with_fallback(ConnectPlan::Refuse)
    }

    fn with_fallback(fallback: ConnectPlan) -> (Arc<Self>, ServerQueue) {
        let (accepted, rx) = mpsc::unbounded_channel();
        let connector = Self {
            plans: Mutex::new(VecDeque::new()),
            fallback,
            attempts: AtomicU32::new(0),
            accepted,
        };
        (Arc::new(connector), ServerQueue(rx))
    }

    /// Plans consumed in order before the fallback applies
    pub fn script(&self, plans: impl IntoIterator<Item = ConnectPlan>) {
        self.plans.lock().extend(plans);
    }

    /// Connect calls made so far
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let plan = self.plans.lock().pop_front().unwrap_or(self.fallback);

        match plan {
            ConnectPlan::Refuse => Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connect ECONNREFUSED 127.0.0.1:443",
            )
            .into()),
            ConnectPlan::Accept => {
                let (to_client, inbound) = mpsc::unbounded_channel();
                let (outbound, from_client) = mpsc::unbounded_channel();
                // Tests that never accept just leave the end queued
                let _ = self.accepted.send(ServerEnd {
                    to_client,
                    from_client,
                });
                Ok(Box::new(ScriptedTransport { inbound, outbound }))
            }
        }
    }
}

struct ScriptedTransport {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.inbound.close();
        Ok(())
    }
}

/// Server ends in the order the connector accepted them
pub struct ServerQueue(mpsc::UnboundedReceiver<ServerEnd>);

impl ServerQueue {
    /// Wait for the next accepted connection
    pub async fn accept(&mut self) -> ServerEnd {
        tokio::time::timeout(WAIT, self.0.recv())
            .await
            .expect("no connection accepted in time")
            .expect("connector dropped")
    }

    /// A connection accepted but not yet taken, if any
    pub fn try_accept(&mut self) -> Option<ServerEnd> {
        self.0.try_recv().ok()
    }
}

/// The server side of one scripted connection
pub struct ServerEnd {
    to_client: mpsc::UnboundedSender<TransportEvent>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ServerEnd {
    pub fn push(&self, frame: &Value) {
        self.push_raw(&frame.to_string());
    }

    pub fn push_raw(&self, text: &str) {
        let _ = self.to_client.send(TransportEvent::Message(text.to_string()));
    }

    /// Report a socket error without closing
    pub fn fail(&self, message: &str) {
        let error = TransportError::Io(io::Error::other(message.to_string()));
        let _ = self.to_client.send(TransportEvent::Error(error));
    }

    /// Stop reading, so every later client send fails while the socket
    /// still looks open
    pub fn stop_reading(&mut self) {
        self.from_client.close();
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(TransportEvent::Closed {
            code: Some(code),
            reason: reason.to_string(),
        });
    }

    /// Next frame from the client; `None` once the client let go
    pub async fn recv(&mut self) -> Option<PusherEnvelope> {
        let text = tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .ok()
            .flatten()?;
        Some(PusherEnvelope::from_json(&text).expect("client sent an invalid frame"))
    }

    /// Skip frames until one with the given event name arrives
    pub async fn expect(&mut self, event: &str) -> PusherEnvelope {
        loop {
            match self.recv().await {
                Some(frame) if frame.is(event) => return frame,
                Some(_) => {}
                None => panic!("client went away before sending {event}"),
            }
        }
    }

    /// Channels named by the next `count` subscribe frames
    pub async fn subscriptions(&mut self, count: usize) -> Vec<(String, Option<String>)> {
        let mut subscribed = Vec::with_capacity(count);
        while subscribed.len() < count {
            let frame = self.expect(names::SUBSCRIBE).await;
            let data = frame.data_json().expect("subscribe data");
            let channel = data["channel"].as_str().expect("channel").to_string();
            let auth = data["auth"].as_str().map(str::to_string);
            subscribed.push((channel, auth));
        }
        subscribed
    }

    /// True once the client has dropped its transport
    pub async fn released(&mut self) -> bool {
        loop {
            match tokio::time::timeout(WAIT, self.from_client.recv()).await {
                Ok(Some(_)) => {}
                Ok(None) => return true,
                Err(_) => return false,
            }
        }
    }
}

// ============================================================================
// Collaborators
// ============================================================================

/// Everything a sink was told
#[derive(Debug, Default, Clone)]
pub struct Recorded {
    pub successes: Vec<(RoomId, u32)>,
    pub failures: Vec<(RoomId, u32, u32)>,
    pub reconnects: Vec<(RoomId, u32, Duration)>,
    pub errors: Vec<ErrorRecord>,
    pub retries: Vec<RetryReport>,
    pub transitions: Vec<(String, CircuitState, CircuitState)>,
    pub rate_signals: Vec<ErrorRateSignal>,
}

#[derive(Debug, Default)]
pub struct RecordingSink {
    recorded: Mutex<Recorded>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn recorded(&self) -> Recorded {
        self.recorded.lock().clone()
    }
}

impl MetricsSink for RecordingSink {
    fn connection_succeeded(&self, room_id: RoomId, _elapsed: Duration, reconnect_attempts: u32) {
        self.recorded
            .lock()
            .successes
            .push((room_id, reconnect_attempts));
    }

    fn connection_failed(&self, room_id: RoomId, reconnect_attempts: u32, consecutive_errors: u32) {
        self.recorded
            .lock()
            .failures
            .push((room_id, reconnect_attempts, consecutive_errors));
    }

    fn reconnect_scheduled(&self, room_id: RoomId, attempt: u32, delay: Duration) {
        self.recorded
            .lock()
            .reconnects
            .push((room_id, attempt, delay));
    }

    fn error_recorded(&self, record: &ErrorRecord) {
        self.recorded.lock().errors.push(record.clone());
    }

    fn retry_completed(&self, report: &RetryReport) {
        self.recorded.lock().retries.push(report.clone());
    }

    fn breaker_transitioned(&self, name: &str, from: CircuitState, to: CircuitState) {
        self.recorded
            .lock()
            .transitions
            .push((name.to_string(), from, to));
    }

    fn error_rate_exceeded(&self, signal: &ErrorRateSignal) {
        self.recorded.lock().rate_signals.push(signal.clone());
    }
}

/// Signs every channel except the denied ones
#[derive(Debug, Default)]
pub struct FakeAuth {
    denied: Vec<String>,
    requests: Mutex<Vec<(String, String)>>,
}

impl FakeAuth {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn denying(channel: &str) -> Arc<Self> {
        Arc::new(Self {
            denied: vec![channel.to_string()],
            ..Self::default()
        })
    }

    /// `(channel, socket_id)` pairs in request order
    pub fn requests(&self) -> Vec<(String, String)> {
        self.requests.lock().clone()
    }

    pub fn signature(channel: &str, socket_id: &str) -> String {
        format!("app-key:{socket_id}:{channel}")
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn auth_for_channel(
        &self,
        channel: &str,
        socket_id: &str,
    ) -> Result<ChannelAuth, AuthError> {
        self.requests
            .lock()
            .push((channel.to_string(), socket_id.to_string()));

        if self.denied.iter().any(|c| c == channel) {
            return Err(AuthError::Status {
                status: 403,
                body: "Forbidden".to_string(),
            });
        }
        Ok(ChannelAuth {
            auth: Self::signature(channel, socket_id),
        })
    }
}

// ============================================================================
// Event helpers
// ============================================================================

/// Next consumer event, skipping over lag
pub async fn next_event(events: &mut broadcast::Receiver<ChatEvent>) -> Option<ChatEvent> {
    loop {
        match tokio::time::timeout(WAIT, events.recv()).await {
            Ok(Ok(event)) => return Some(event),
            Ok(Err(RecvError::Lagged(_))) => {}
            Ok(Err(RecvError::Closed)) | Err(_) => return None,
        }
    }
}

/// Every event up to and including the first one with the given name
pub async fn events_until(
    events: &mut broadcast::Receiver<ChatEvent>,
    name: &str,
) -> Vec<ChatEvent> {
    let mut seen = Vec::new();
    while let Some(event) = next_event(events).await {
        let done = event.name() == name;
        seen.push(event);
        if done {
            return seen;
        }
    }
    panic!(
        "event stream ended before {name}; saw {:?}",
        seen.iter().map(ChatEvent::name).collect::<Vec<_>>()
    );
}

/// The first event with the given name
pub async fn wait_for(events: &mut broadcast::Receiver<ChatEvent>, name: &str) -> ChatEvent {
    events_until(events, name)
        .await
        .pop()
        .expect("events_until returns at least one event")
}

/// Event names in order
pub fn names_of(events: &[ChatEvent]) -> Vec<&'static str> {
    events.iter().map(ChatEvent::name).collect()
}
