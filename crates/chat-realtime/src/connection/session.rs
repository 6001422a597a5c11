//! Session driver
//!
//! Owns one [`SessionMachine`] and performs its actions: opens transports
//! through the retry executor, sends frames, runs timers and publishes
//! events. Consumers talk to it through the [`ConnectionSession`] handle.

use chat_common::config::{AppConfig, ReconnectConfig};
use chat_core::{ChatEvent, RoomId, RoomIdentity};
use chat_resilience::{
    Classify, ErrorContext, ErrorSignal, ResilienceRegistry, RetryError, RetryExecutor,
    RetryOptions,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use super::machine::{
    AuthOutcome, SessionAction, SessionMachine, SessionPhase, SessionSnapshot, SessionTimer,
};
use crate::collaborators::{AuthProvider, IdentityStore};
use crate::error::{SessionError, SessionResult};
use crate::protocol::{channels, PusherEnvelope};
use crate::transport::{Connector, Transport, TransportEvent};

/// Backoff preset for opening the WebSocket
pub const CONNECT_PRESET: &str = "websocket";

/// Backoff preset for channel authorization requests
pub const AUTH_PRESET: &str = "api";

const CONTROL_BUFFER: usize = 16;
const AUTH_BUFFER: usize = 4;
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Pusher WebSocket URL
    pub url: String,
    pub room: RoomIdentity,
    pub reconnect: ReconnectConfig,
    /// Capacity of the consumer event channel
    pub event_buffer: usize,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>, room: RoomIdentity) -> Self {
        Self {
            url: url.into(),
            room,
            reconnect: ReconnectConfig::default(),
            event_buffer: 1024,
        }
    }

    pub fn from_app_config(config: &AppConfig) -> Self {
        let mut room = RoomIdentity::new(config.room.room_id, config.room.streamer_id);
        if let Some(name) = &config.room.display_name {
            room = room.with_display_name(name.clone());
        }
        Self::new(config.pusher.url.clone(), room).reconnect(config.reconnect.clone())
    }

    #[must_use]
    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn event_buffer(mut self, size: usize) -> Self {
        self.event_buffer = size;
        self
    }
}

/// Everything a session borrows from the process
#[derive(Clone)]
pub struct SessionDeps {
    pub registry: Arc<ResilienceRegistry>,
    pub connector: Arc<dyn Connector>,
    pub auth: Arc<dyn AuthProvider>,
    pub identity: Arc<dyn IdentityStore>,
}

impl SessionDeps {
    pub fn new(
        registry: Arc<ResilienceRegistry>,
        connector: Arc<dyn Connector>,
        auth: Arc<dyn AuthProvider>,
        identity: Arc<dyn IdentityStore>,
    ) -> Self {
        Self {
            registry,
            connector,
            auth,
            identity,
        }
    }
}

impl fmt::Debug for SessionDeps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDeps")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    Connect,
    Close,
}

/// Handle to a running session
///
/// Dropping the handle closes the session.
pub struct ConnectionSession {
    id: String,
    room_id: RoomId,
    control: mpsc::Sender<Control>,
    events: broadcast::Sender<ChatEvent>,
    snapshot: watch::Receiver<SessionSnapshot>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionSession {
    /// Start the driver task; the session stays idle until [`connect`](Self::connect)
    pub fn spawn(config: SessionConfig, deps: SessionDeps) -> SessionResult<Self> {
        let room_id = config.room.room_id;
        let machine = SessionMachine::new(config.room, config.reconnect, deps.registry.clone())?
            .with_actor(deps.identity.actor_id());

        let id = Uuid::new_v4().to_string();
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        let (control_tx, control_rx) = mpsc::channel(CONTROL_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(machine.snapshot());
        let (auth_tx, auth_rx) = mpsc::channel(AUTH_BUFFER);

        let driver = SessionDriver {
            executor: RetryExecutor::new(deps.registry.clone()),
            machine,
            url: config.url,
            deps,
            transport: None,
            timers: Timers::default(),
            pending: VecDeque::new(),
            events: events.clone(),
            snapshot: snapshot_tx,
            control: control_rx,
            auth_tx,
            auth_rx,
            auth_task: None,
        };

        let span = tracing::info_span!("session", session_id = %id, room_id = %room_id);
        let task = tokio::spawn(driver.run().instrument(span));

        Ok(Self {
            id,
            room_id,
            control: control_tx,
            events,
            snapshot: snapshot_rx,
            task: Mutex::new(Some(task)),
        })
    }

    /// Unique id of this session, used in traces
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Events emitted after this call
    pub fn subscribe_events(&self) -> broadcast::Receiver<ChatEvent> {
        self.events.subscribe()
    }

    pub async fn connect(&self) -> SessionResult<()> {
        self.control
            .send(Control::Connect)
            .await
            .map_err(|_| SessionError::Stopped(self.room_id))
    }

    /// Stop the session and wait until it is closed
    ///
    /// Pending reconnect timers are cancelled. Calling it again is harmless.
    pub async fn close(&self) {
        if self.control.send(Control::Close).await.is_err() {
            return;
        }
        self.closed().await;
    }

    /// Resolve once the session has stopped, for whatever reason
    pub async fn closed(&self) {
        let mut snapshot = self.snapshot.clone();
        // Err only if the driver already exited, which also means closed
        let _ = snapshot.wait_for(|s| s.phase.is_terminal()).await;
    }

    pub fn state(&self) -> SessionPhase {
        self.snapshot.borrow().phase
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Whether the session has stopped for good
    pub fn is_finished(&self) -> bool {
        self.state().is_terminal()
            || self
                .task
                .lock()
                .as_ref()
                .is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the driver task to exit
    pub async fn join(&self) -> SessionResult<()> {
        let handle = self.task.lock().take();
        match handle {
            Some(handle) => handle.await.map_err(SessionError::from),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.id)
            .field("room_id", &self.room_id)
            .field("phase", &self.state())
            .finish()
    }
}

#[derive(Debug, Default)]
struct Timers {
    subscribe: Option<Instant>,
    handshake: Option<Instant>,
    reconnect: Option<Instant>,
    activity: Option<Instant>,
}

impl Timers {
    fn slot(&mut self, timer: SessionTimer) -> &mut Option<Instant> {
        match timer {
            SessionTimer::Subscribe => &mut self.subscribe,
            SessionTimer::Handshake => &mut self.handshake,
            SessionTimer::Reconnect => &mut self.reconnect,
            SessionTimer::Activity => &mut self.activity,
        }
    }
}

struct SessionDriver {
    machine: SessionMachine,
    url: String,
    deps: SessionDeps,
    executor: RetryExecutor,
    transport: Option<Box<dyn Transport>>,
    timers: Timers,
    pending: VecDeque<SessionAction>,
    events: broadcast::Sender<ChatEvent>,
    snapshot: watch::Sender<SessionSnapshot>,
    control: mpsc::Receiver<Control>,
    auth_tx: mpsc::Sender<AuthOutcome>,
    auth_rx: mpsc::Receiver<AuthOutcome>,
    auth_task: Option<JoinHandle<()>>,
}

impl SessionDriver {
    async fn run(mut self) {
        debug!("session driver started");

        loop {
            self.drain().await;
            self.snapshot.send_replace(self.machine.snapshot());
            if self.machine.phase().is_terminal() {
                break;
            }

            tokio::select! {
                control = self.control.recv() => {
                    let actions = match control {
                        Some(Control::Connect) => self.machine.connect().unwrap_or_else(|err| {
                            debug!(error = %err, "connect request ignored");
                            Vec::new()
                        }),
                        Some(Control::Close) | None => self.machine.close(),
                    };
                    self.pending.extend(actions);
                }
                event = next_event(&mut self.transport) => {
                    self.on_transport_event(event);
                }
                Some(outcome) = self.auth_rx.recv() => {
                    let actions = self.machine.on_authorization(outcome);
                    self.pending.extend(actions);
                }
                () = sleep_until_opt(self.timers.subscribe) => {
                    self.timers.subscribe = None;
                    let actions = self.machine.on_subscribe_timer();
                    self.pending.extend(actions);
                }
                () = sleep_until_opt(self.timers.handshake) => {
                    self.timers.handshake = None;
                    let actions = self.machine.on_handshake_timeout();
                    self.pending.extend(actions);
                }
                () = sleep_until_opt(self.timers.reconnect) => {
                    self.timers.reconnect = None;
                    let actions = self.machine.on_reconnect_timer();
                    self.pending.extend(actions);
                }
                () = sleep_until_opt(self.timers.activity) => {
                    self.timers.activity = None;
                    let actions = self.machine.on_activity_timer();
                    self.pending.extend(actions);
                }
            }
        }

        self.abort_auth();
        info!("session driver stopped");
    }

    /// Perform queued actions in order; actions may queue more
    async fn drain(&mut self) {
        while let Some(action) = self.pending.pop_front() {
            match action {
                SessionAction::Connect { attempt } => self.open_transport(attempt).await,
                SessionAction::Send(frame) => self.send(frame).await,
                SessionAction::Emit(event) => self.emit(event),
                SessionAction::StartTimer(timer, delay) => {
                    *self.timers.slot(timer) = Some(Instant::now() + delay);
                }
                SessionAction::CancelTimer(timer) => *self.timers.slot(timer) = None,
                SessionAction::AuthorizePrivate { socket_id } => self.authorize(socket_id),
                SessionAction::CloseTransport => self.close_transport().await,
                SessionAction::DropTransport => {
                    self.abort_auth();
                    self.transport = None;
                }
            }
        }
    }

    async fn open_transport(&mut self, attempt: u32) {
        let room_id = self.machine.room_id();
        let breaker = format!("websocket:room:{room_id}");
        let options = RetryOptions::new("websocket.connect")
            .preset(CONNECT_PRESET)
            .context(ErrorContext::new().component("websocket").room(room_id));

        debug!(attempt, url = %self.url, "opening transport");

        // None when the session was closed mid-connect
        let result = {
            let connector = &self.deps.connector;
            let url = self.url.as_str();
            let connecting = self
                .executor
                .run_with_circuit_breaker(&breaker, &options, || connector.connect(url));
            tokio::pin!(connecting);

            loop {
                tokio::select! {
                    result = &mut connecting => break Some(result),
                    control = self.control.recv() => match control {
                        Some(Control::Connect) => debug!("connect already in progress"),
                        Some(Control::Close) | None => break None,
                    },
                }
            }
        };

        let actions = match result {
            None => {
                info!(attempt, "connect cancelled by close");
                self.machine.close()
            }
            Some(Ok(transport)) => {
                self.transport = Some(transport);
                self.machine.on_open()
            }
            Some(Err(err)) => self.machine.on_connect_failed(retry_signal(&err)),
        };
        self.pending.extend(actions);
    }

    async fn send(&mut self, frame: PusherEnvelope) {
        let Some(transport) = self.transport.as_mut() else {
            debug!(event = %frame.event, "no transport, dropping frame");
            return;
        };

        let json = match frame.to_json() {
            Ok(json) => json,
            Err(err) => {
                warn!(error = %err, event = %frame.event, "failed to encode frame");
                return;
            }
        };

        if let Err(err) = transport.send(json).await {
            let actions = self.machine.on_error(err.signal());
            if !self.machine.is_transport_open() {
                // Frames queued for the lost transport would only fail again
                self.pending
                    .retain(|action| !matches!(action, SessionAction::Send(_)));
            }
            self.pending.extend(actions);
        }
    }

    fn emit(&self, event: ChatEvent) {
        debug!(event = event.name(), "emit");
        // No receivers is not an error
        let _ = self.events.send(event);
    }

    fn on_transport_event(&mut self, event: Option<TransportEvent>) {
        let actions = match event {
            Some(TransportEvent::Message(text)) => self.machine.on_message(&text),
            Some(TransportEvent::Error(err)) => self.machine.on_error(err.signal()),
            Some(TransportEvent::Closed { code, reason }) => {
                self.transport = None;
                self.machine.on_close(code, &reason)
            }
            None => {
                self.transport = None;
                self.machine.on_close(None, "transport ended")
            }
        };
        self.pending.extend(actions);
    }

    /// Fetch private channel signatures in the background
    fn authorize(&mut self, socket_id: String) {
        let Some(actor_id) = self.deps.identity.actor_id() else {
            debug!("no signed-in user, skipping private channels");
            return;
        };

        let room_id = self.machine.room_id();
        let mut private = channels::actor_channels(actor_id);
        if let Some(livestream_id) = self
            .deps
            .identity
            .known_room(room_id)
            .and_then(|room| room.live_stream())
        {
            private.push(channels::livestream_channel(livestream_id));
        }

        let executor = self.executor.clone();
        let auth = Arc::clone(&self.deps.auth);
        let tx = self.auth_tx.clone();

        self.abort_auth();
        self.auth_task = Some(tokio::spawn(
            async move {
                let mut outcome = AuthOutcome::new(socket_id.clone());
                for channel in private {
                    let options = RetryOptions::new("api.channel_auth")
                        .preset(AUTH_PRESET)
                        .context(
                            ErrorContext::new()
                                .component("auth")
                                .room(room_id)
                                .actor(Some(actor_id)),
                        );
                    let result = executor
                        .run(&options, || auth.auth_for_channel(&channel, &socket_id))
                        .await;
                    match result {
                        Ok(grant) => outcome.granted.push((channel, grant.auth)),
                        Err(err) => {
                            let signal = retry_signal(&err);
                            outcome.failed.push((channel, signal));
                        }
                    }
                }
                // The driver may have stopped in the meantime
                let _ = tx.send(outcome).await;
            }
            .in_current_span(),
        ));
    }

    async fn close_transport(&mut self) {
        self.abort_auth();
        if let Some(mut transport) = self.transport.take() {
            match tokio::time::timeout(CLOSE_TIMEOUT, transport.close()).await {
                Ok(Ok(())) => debug!("transport closed"),
                Ok(Err(err)) => debug!(error = %err, "transport close failed"),
                Err(_) => warn!("transport close timed out"),
            }
        }
        self.machine.on_transport_released();
    }

    fn abort_auth(&mut self) {
        if let Some(task) = self.auth_task.take() {
            task.abort();
        }
    }
}

/// The operation's own error if it ran, else the retry error itself
fn retry_signal<E: Classify + fmt::Display>(err: &RetryError<E>) -> ErrorSignal {
    err.error()
        .map_or_else(|| ErrorSignal::new(err.to_string()), Classify::signal)
}

async fn next_event(transport: &mut Option<Box<dyn Transport>>) -> Option<TransportEvent> {
    match transport {
        Some(transport) => transport.next_event().await,
        None => std::future::pending().await,
    }
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
