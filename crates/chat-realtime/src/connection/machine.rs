//! Session state machine
//!
//! Pure state transitions for one room's connection. Every input returns the
//! [`SessionAction`]s the driver must perform; the machine itself never
//! touches the network or sleeps, so it can be stepped directly in tests.
//!
//! ```text
//! Idle ──connect──▶ Connecting ──open──▶ Authenticating ──ack──▶ Subscribed
//!                      ▲                       │                     │
//!                      │                  error/close           error/close
//!                      │                       ▼                     ▼
//!                      └──── timer ───── Reconnecting ◀──────────────┘
//!
//! close() from any state ──▶ Closing ──▶ Closed
//! ```

use chat_common::config::ReconnectConfig;
use chat_core::{
    ActorId, ChatEvent, ConnectionStatus, DomainError, ErrorCategory, RoomId, RoomIdentity,
};
use chat_resilience::{categorize, BackoffConfig, ErrorContext, ErrorSignal, ResilienceRegistry};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::events::route;
use crate::protocol::{channels, close_codes, names, CloseClass, PusherEnvelope};

/// Consecutive errors that escalate to a connection failure
pub const ERROR_ESCALATION_THRESHOLD: u32 = 3;

/// Close code sent when the client closes the session
pub const CLIENT_CLOSE_CODE: u16 = 1000;

/// Wait for any frame after a keepalive ping before dropping the transport
pub const PONG_TIMEOUT: Duration = Duration::from_secs(30);

const COMPONENT: &str = "session";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Connecting,
    /// Transport open, waiting for the room subscription acknowledgment
    Authenticating,
    Subscribed,
    Reconnecting,
    Closing,
    Closed,
}

impl SessionPhase {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Subscribed => "subscribed",
            Self::Reconnecting => "reconnecting",
            Self::Closing => "closing",
            Self::Closed => "closed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed)
    }
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionTimer {
    /// Grace period between transport open and the public subscribes
    Subscribe,
    /// Deadline for the room subscription acknowledgment
    Handshake,
    Reconnect,
    /// Quiet period before a keepalive ping, then the wait for the reply
    Activity,
}

/// Work the driver performs on the machine's behalf
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Open a new transport through the retry executor
    Connect { attempt: u32 },
    Send(PusherEnvelope),
    Emit(ChatEvent),
    StartTimer(SessionTimer, Duration),
    CancelTimer(SessionTimer),
    /// Fetch signatures for the signed-in user's private channels
    AuthorizePrivate { socket_id: String },
    /// Close the transport gracefully, then report back with
    /// [`SessionMachine::on_transport_released`]
    CloseTransport,
    /// Discard the transport without a closing handshake
    DropTransport,
}

/// Result of authorizing private channels for one socket
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthOutcome {
    pub socket_id: String,
    /// Channel and its signature
    pub granted: Vec<(String, String)>,
    pub failed: Vec<(String, ErrorSignal)>,
}

impl AuthOutcome {
    pub fn new(socket_id: impl Into<String>) -> Self {
        Self {
            socket_id: socket_id.into(),
            ..Self::default()
        }
    }
}

/// Point-in-time view of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub room_id: RoomId,
    pub phase: SessionPhase,
    pub reconnect_attempts: u32,
    pub consecutive_errors: u32,
    pub should_reconnect: bool,
    pub socket_id: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub current_delay: Duration,
    pub subscribed_channels: usize,
}

#[derive(Debug)]
pub struct SessionMachine {
    identity: RoomIdentity,
    actor_id: Option<ActorId>,
    config: ReconnectConfig,
    backoff: BackoffConfig,
    registry: Arc<ResilienceRegistry>,

    phase: SessionPhase,
    should_reconnect: bool,
    transport_open: bool,
    reconnect_attempts: u32,
    consecutive_errors: u32,
    /// Telemetry only; never gates anything
    connect_attempts: u32,
    current_delay: Duration,
    socket_id: Option<String>,
    activity_timeout: Option<Duration>,
    awaiting_pong: bool,
    subscribed: BTreeSet<String>,

    started_at: Option<DateTime<Utc>>,
    last_error_at: Option<DateTime<Utc>>,
    connecting_since: Option<Instant>,
}

impl SessionMachine {
    pub fn new(
        identity: RoomIdentity,
        config: ReconnectConfig,
        registry: Arc<ResilienceRegistry>,
    ) -> Result<Self, DomainError> {
        config
            .validate()
            .map_err(|e| DomainError::invalid_argument(e.to_string()))?;
        let backoff =
            BackoffConfig::new(config.base_delay(), config.max_delay(), config.multiplier, false)?
                .with_max_attempts(config.max_attempts);

        Ok(Self {
            identity,
            actor_id: None,
            current_delay: backoff.initial_delay,
            config,
            backoff,
            registry,
            phase: SessionPhase::Idle,
            should_reconnect: true,
            transport_open: false,
            reconnect_attempts: 0,
            consecutive_errors: 0,
            connect_attempts: 0,
            socket_id: None,
            activity_timeout: None,
            awaiting_pong: false,
            subscribed: BTreeSet::new(),
            started_at: None,
            last_error_at: None,
            connecting_since: None,
        })
    }

    #[must_use]
    pub fn with_actor(mut self, actor_id: Option<ActorId>) -> Self {
        self.actor_id = actor_id;
        self
    }

    // === Accessors ===

    pub fn room_id(&self) -> RoomId {
        self.identity.room_id
    }

    pub fn identity(&self) -> &RoomIdentity {
        &self.identity
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn should_reconnect(&self) -> bool {
        self.should_reconnect
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    pub fn consecutive_errors(&self) -> u32 {
        self.consecutive_errors
    }

    pub fn current_delay(&self) -> Duration {
        self.current_delay
    }

    pub fn socket_id(&self) -> Option<&str> {
        self.socket_id.as_deref()
    }

    pub fn activity_timeout(&self) -> Option<Duration> {
        self.activity_timeout
    }

    pub fn is_transport_open(&self) -> bool {
        self.transport_open
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            room_id: self.room_id(),
            phase: self.phase,
            reconnect_attempts: self.reconnect_attempts,
            consecutive_errors: self.consecutive_errors,
            should_reconnect: self.should_reconnect,
            socket_id: self.socket_id.clone(),
            started_at: self.started_at,
            last_error_at: self.last_error_at,
            current_delay: self.current_delay,
            subscribed_channels: self.subscribed.len(),
        }
    }

    // === Commands ===

    /// Start a connection attempt
    ///
    /// Refused once reconnection is disabled, and while a transport is
    /// already open or being opened.
    pub fn connect(&mut self) -> Result<Vec<SessionAction>, DomainError> {
        if !self.should_reconnect {
            return Err(DomainError::SessionClosed);
        }
        if !matches!(self.phase, SessionPhase::Idle | SessionPhase::Reconnecting) {
            return Err(DomainError::invalid_state(self.phase, "connect"));
        }

        self.connect_attempts += 1;
        self.phase = SessionPhase::Connecting;
        self.connecting_since = Some(Instant::now());
        self.started_at.get_or_insert_with(Utc::now);

        info!(
            room_id = %self.room_id(),
            attempt = self.connect_attempts,
            reconnect_attempts = self.reconnect_attempts,
            "connecting"
        );

        Ok(vec![
            SessionAction::Emit(ChatEvent::Connection {
                room_id: self.room_id(),
                status: ConnectionStatus::Pending,
            }),
            SessionAction::Connect {
                attempt: self.connect_attempts,
            },
        ])
    }

    /// Stop the session for good
    ///
    /// Safe to call in any phase; later calls do nothing.
    pub fn close(&mut self) -> Vec<SessionAction> {
        if matches!(self.phase, SessionPhase::Closing | SessionPhase::Closed) {
            return Vec::new();
        }

        self.should_reconnect = false;
        let mut actions = vec![
            SessionAction::CancelTimer(SessionTimer::Subscribe),
            SessionAction::CancelTimer(SessionTimer::Handshake),
            SessionAction::CancelTimer(SessionTimer::Reconnect),
            SessionAction::CancelTimer(SessionTimer::Activity),
        ];

        if self.transport_open {
            actions.extend(
                std::mem::take(&mut self.subscribed)
                    .iter()
                    .map(|channel| SessionAction::Send(PusherEnvelope::unsubscribe(channel))),
            );
            actions.push(SessionAction::CloseTransport);
            self.transport_open = false;
            self.phase = SessionPhase::Closing;
        } else {
            self.phase = SessionPhase::Closed;
        }

        info!(room_id = %self.room_id(), "session closed by client");
        actions.push(self.emit_close(Some(CLIENT_CLOSE_CODE), "closed by client"));
        actions
    }

    // === Transport inputs ===

    pub fn on_open(&mut self) -> Vec<SessionAction> {
        if self.phase != SessionPhase::Connecting {
            debug!(room_id = %self.room_id(), phase = %self.phase, "ignoring open outside connect");
            return Vec::new();
        }

        self.transport_open = true;
        self.reconnect_attempts = 0;
        self.consecutive_errors = 0;
        self.current_delay = self.backoff.initial_delay;
        self.socket_id = None;
        self.activity_timeout = None;
        self.awaiting_pong = false;
        self.subscribed.clear();
        self.phase = SessionPhase::Authenticating;

        info!(room_id = %self.room_id(), "transport open");

        let mut actions = vec![SessionAction::StartTimer(
            SessionTimer::Subscribe,
            self.config.subscribe_grace(),
        )];
        if let Some(deadline) = self.config.handshake_timeout() {
            actions.push(SessionAction::StartTimer(SessionTimer::Handshake, deadline));
        }
        actions
    }

    pub fn on_subscribe_timer(&mut self) -> Vec<SessionAction> {
        if !self.transport_open || !self.is_live_phase() {
            return Vec::new();
        }

        let channels = channels::public_channels(self.room_id(), self.identity.streamer_id);
        debug!(room_id = %self.room_id(), count = channels.len(), "subscribing to room channels");
        self.subscribe_all(channels.into_iter().map(|channel| (channel, None)))
    }

    pub fn on_message(&mut self, text: &str) -> Vec<SessionAction> {
        if !self.transport_open || !self.is_live_phase() {
            return Vec::new();
        }

        let envelope = match PusherEnvelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(err) => {
                self.record(ErrorSignal::parse(err.to_string()), "session.decode");
                debug!(room_id = %self.room_id(), error = %err, "dropping malformed frame");
                return Vec::new();
            }
        };

        let mut actions = match envelope.event.as_str() {
            names::CONNECTION_ESTABLISHED => self.on_connection_established(&envelope),
            names::SUBSCRIPTION_SUCCEEDED => self.on_subscription_succeeded(&envelope),
            names::PING => vec![SessionAction::Send(PusherEnvelope::pong())],
            names::ERROR => {
                let signal = match envelope.as_error() {
                    Ok(data) => {
                        let signal = ErrorSignal::new(format!("pusher error: {}", data.message));
                        match data.code {
                            Some(code) => signal.with_code(code.to_string()),
                            None => signal,
                        }
                    }
                    Err(err) => ErrorSignal::new(format!("pusher error: {err}")),
                };
                self.on_error(signal)
            }
            _ => match route(self.room_id(), &envelope) {
                Some(event) => vec![SessionAction::Emit(event)],
                None => Vec::new(),
            },
        };

        // Any frame counts as activity, including the reply to our ping
        if self.transport_open {
            actions.extend(self.restart_activity_timer());
        }
        actions
    }

    fn on_connection_established(&mut self, envelope: &PusherEnvelope) -> Vec<SessionAction> {
        match envelope.as_connection_established() {
            Ok(established) => {
                debug!(
                    room_id = %self.room_id(),
                    socket_id = %established.socket_id,
                    activity_timeout = ?established.activity_timeout,
                    "connection established"
                );
                self.activity_timeout = established.activity_timeout.map(Duration::from_secs);
                self.socket_id = Some(established.socket_id.clone());
                vec![SessionAction::AuthorizePrivate {
                    socket_id: established.socket_id,
                }]
            }
            Err(err) => {
                self.record(ErrorSignal::parse(err.to_string()), "session.decode");
                Vec::new()
            }
        }
    }

    fn on_subscription_succeeded(&mut self, envelope: &PusherEnvelope) -> Vec<SessionAction> {
        let primary = channels::primary_channel(self.room_id());
        if envelope.channel.as_deref() != Some(primary.as_str()) {
            debug!(room_id = %self.room_id(), channel = ?envelope.channel, "subscribed");
            return Vec::new();
        }
        if self.phase != SessionPhase::Authenticating {
            return Vec::new();
        }

        self.phase = SessionPhase::Subscribed;
        let elapsed = self
            .connecting_since
            .map(|since| since.elapsed())
            .unwrap_or_default();
        self.registry.sink().connection_succeeded(
            self.room_id(),
            elapsed,
            self.connect_attempts.saturating_sub(1),
        );
        info!(
            room_id = %self.room_id(),
            room = %self.identity.label(),
            elapsed_ms = elapsed.as_millis() as u64,
            "subscribed to room"
        );

        vec![
            SessionAction::CancelTimer(SessionTimer::Handshake),
            SessionAction::Emit(ChatEvent::Connection {
                room_id: self.room_id(),
                status: ConnectionStatus::Success,
            }),
        ]
    }

    /// Subscribe to the private channels that were authorized
    ///
    /// Outcomes for a socket other than the current one are stale and dropped.
    pub fn on_authorization(&mut self, outcome: AuthOutcome) -> Vec<SessionAction> {
        if !self.transport_open || self.socket_id.as_deref() != Some(outcome.socket_id.as_str()) {
            debug!(
                room_id = %self.room_id(),
                socket_id = %outcome.socket_id,
                "dropping stale authorization"
            );
            return Vec::new();
        }

        let mut actions = Vec::new();
        for (channel, signal) in outcome.failed {
            let context = self.context("session.authorize");
            let category = categorize(&signal, &context);
            warn!(
                room_id = %self.room_id(),
                %channel,
                %category,
                error = %signal,
                "private channel not authorized"
            );
            actions.push(SessionAction::Emit(ChatEvent::Error {
                room_id: self.room_id(),
                category,
                severity: category.severity(),
                message: format!("{channel}: {}", signal.message),
                consecutive_errors: self.consecutive_errors,
            }));
        }

        actions.extend(self.subscribe_all(
            outcome
                .granted
                .into_iter()
                .map(|(channel, auth)| (channel, Some(auth))),
        ));
        actions
    }

    /// A transport-level error on an open connection
    ///
    /// Ignored once the transport is gone: frames still in flight to a lost
    /// transport must not count against the next one.
    pub fn on_error(&mut self, signal: ErrorSignal) -> Vec<SessionAction> {
        if !self.transport_open || !self.is_live_phase() {
            debug!(
                room_id = %self.room_id(),
                phase = %self.phase,
                error = %signal,
                "ignoring error without a live transport"
            );
            return Vec::new();
        }

        self.consecutive_errors += 1;
        self.last_error_at = Some(Utc::now());
        let (classified, _) = self.registry.record_error(
            signal.clone(),
            &self.context("session.transport_error"),
            Some(self.consecutive_errors),
        );
        warn!(
            room_id = %self.room_id(),
            category = %classified.category,
            consecutive_errors = self.consecutive_errors,
            error = %signal,
            "transport error"
        );

        let mut actions = vec![self.emit_error(classified.category, &signal.message)];
        if classified.category.requires_user_intervention() {
            actions.extend(self.fail_permanently(
                classified.category,
                signal.message,
                Some((None, "connection failed")),
            ));
        } else if self.consecutive_errors >= ERROR_ESCALATION_THRESHOLD {
            actions.extend(self.handle_connection_failure(signal));
            actions.extend(self.lose_transport(None, "connection failed", false));
        }
        actions
    }

    pub fn on_close(&mut self, code: Option<u16>, reason: &str) -> Vec<SessionAction> {
        if matches!(self.phase, SessionPhase::Closing | SessionPhase::Closed) {
            return Vec::new();
        }

        let class = code.map_or(CloseClass::Other, CloseClass::of);
        info!(room_id = %self.room_id(), ?code, %class, reason, "transport closed");

        match code {
            Some(code) if !class.should_reconnect() => self.on_fatal_close(code, reason),
            _ => self.lose_transport(code, reason, class == CloseClass::Immediate),
        }
    }

    fn on_fatal_close(&mut self, code: u16, reason: &str) -> Vec<SessionAction> {
        // The server already closed the socket
        self.transport_open = false;
        self.last_error_at = Some(Utc::now());

        let description = close_codes::description(code).unwrap_or(reason);
        let signal = ErrorSignal::new(format!("websocket closed with code {code}: {description}"))
            .with_code(code.to_string());
        let (classified, _) = self
            .registry
            .record_error(signal.clone(), &self.context("session.close"), None);
        warn!(room_id = %self.room_id(), code, description, "server refused the connection");

        self.fail_permanently(classified.category, signal.message, Some((Some(code), reason)))
    }

    /// The retry executor gave up opening a transport
    ///
    /// The executor has already logged each attempt, so this only counts and
    /// reports the failure.
    pub fn on_connect_failed(&mut self, signal: ErrorSignal) -> Vec<SessionAction> {
        if self.phase != SessionPhase::Connecting {
            return Vec::new();
        }

        self.consecutive_errors += 1;
        self.last_error_at = Some(Utc::now());
        let category = categorize(&signal, &self.context("session.connect"));
        warn!(
            room_id = %self.room_id(),
            %category,
            consecutive_errors = self.consecutive_errors,
            error = %signal,
            "connect failed"
        );

        let mut actions = vec![self.emit_error(category, &signal.message)];
        if category.requires_user_intervention() {
            actions.extend(self.fail_permanently(category, signal.message, None));
            return actions;
        }
        if self.consecutive_errors >= ERROR_ESCALATION_THRESHOLD {
            actions.extend(self.handle_connection_failure(signal));
        }
        actions.extend(self.schedule_reconnect(false));
        actions
    }

    // === Timers ===

    pub fn on_reconnect_timer(&mut self) -> Vec<SessionAction> {
        if !self.should_reconnect || self.phase != SessionPhase::Reconnecting {
            return Vec::new();
        }
        self.connect().unwrap_or_default()
    }

    pub fn on_handshake_timeout(&mut self) -> Vec<SessionAction> {
        if self.phase != SessionPhase::Authenticating || !self.transport_open {
            return Vec::new();
        }

        warn!(room_id = %self.room_id(), "room subscription not acknowledged in time");
        let mut actions = self.on_error(ErrorSignal::new("websocket handshake timed out"));
        // on_error only drops the transport once errors escalate
        if self.transport_open {
            actions.extend(self.lose_transport(None, "handshake timed out", false));
        }
        actions
    }

    /// The server stayed quiet for its activity timeout
    ///
    /// The first expiry sends a ping; a second one before any frame arrives
    /// means the connection is dead.
    pub fn on_activity_timer(&mut self) -> Vec<SessionAction> {
        if !self.transport_open || !self.is_live_phase() {
            return Vec::new();
        }

        if self.awaiting_pong {
            warn!(room_id = %self.room_id(), "no reply to keepalive ping");
            self.record(
                ErrorSignal::new("websocket keepalive ping not answered"),
                "session.keepalive",
            );
            return self.lose_transport(None, "keepalive timed out", false);
        }

        debug!(room_id = %self.room_id(), "connection quiet, sending ping");
        self.awaiting_pong = true;
        vec![
            SessionAction::Send(PusherEnvelope::ping()),
            SessionAction::StartTimer(SessionTimer::Activity, PONG_TIMEOUT),
        ]
    }

    /// The driver finished closing the transport after [`close`](Self::close)
    pub fn on_transport_released(&mut self) {
        if self.phase == SessionPhase::Closing {
            self.phase = SessionPhase::Closed;
        }
    }

    // === Internals ===

    fn is_live_phase(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::Authenticating | SessionPhase::Subscribed
        )
    }

    fn context(&self, operation: &str) -> ErrorContext {
        ErrorContext::new()
            .operation(operation)
            .component(COMPONENT)
            .room(self.room_id())
            .actor(self.actor_id)
    }

    fn record(&self, signal: ErrorSignal, operation: &str) {
        self.registry
            .record_error(signal, &self.context(operation), None);
    }

    fn subscribe_all(
        &mut self,
        channels: impl IntoIterator<Item = (String, Option<String>)>,
    ) -> Vec<SessionAction> {
        channels
            .into_iter()
            .map(|(channel, auth)| {
                let frame = PusherEnvelope::subscribe(&channel, auth.as_deref());
                self.subscribed.insert(channel);
                SessionAction::Send(frame)
            })
            .collect()
    }

    fn restart_activity_timer(&mut self) -> Vec<SessionAction> {
        self.awaiting_pong = false;
        match self.activity_timeout {
            Some(timeout) => vec![SessionAction::StartTimer(SessionTimer::Activity, timeout)],
            None => Vec::new(),
        }
    }

    fn emit_error(&self, category: ErrorCategory, message: &str) -> SessionAction {
        SessionAction::Emit(ChatEvent::Error {
            room_id: self.room_id(),
            category,
            severity: category.severity(),
            message: message.to_string(),
            consecutive_errors: self.consecutive_errors,
        })
    }

    fn emit_close(&self, code: Option<u16>, reason: &str) -> SessionAction {
        SessionAction::Emit(ChatEvent::Close {
            room_id: self.room_id(),
            code,
            reason: reason.to_string(),
        })
    }

    /// Record and report a failed connection; stops retries only once the
    /// reconnect budget is spent
    fn handle_connection_failure(&mut self, signal: ErrorSignal) -> Vec<SessionAction> {
        let (classified, _) = self.registry.record_error(
            signal,
            &self.context("session.connection_failure"),
            Some(self.reconnect_attempts),
        );
        self.registry.sink().connection_failed(
            self.room_id(),
            self.reconnect_attempts,
            self.consecutive_errors,
        );

        if self.reconnect_attempts >= self.config.max_attempts {
            self.should_reconnect = false;
        }

        warn!(
            room_id = %self.room_id(),
            reconnect_attempts = self.reconnect_attempts,
            consecutive_errors = self.consecutive_errors,
            category = %classified.category,
            "connection failure"
        );

        vec![SessionAction::Emit(ChatEvent::ConnectionFailure {
            room_id: self.room_id(),
            reconnect_attempts: self.reconnect_attempts,
            consecutive_errors: self.consecutive_errors,
            category: classified.category,
            message: classified.signal.message,
        })]
    }

    /// Stop for good after a failure that reconnecting cannot fix
    ///
    /// `close` is the close event to report, if a transport was lost.
    fn fail_permanently(
        &mut self,
        category: ErrorCategory,
        message: String,
        close: Option<(Option<u16>, &str)>,
    ) -> Vec<SessionAction> {
        self.should_reconnect = false;
        self.subscribed.clear();
        self.registry.sink().connection_failed(
            self.room_id(),
            self.reconnect_attempts,
            self.consecutive_errors,
        );
        warn!(
            room_id = %self.room_id(),
            %category,
            error = %message,
            "not reconnecting"
        );

        let mut actions = vec![
            SessionAction::CancelTimer(SessionTimer::Subscribe),
            SessionAction::CancelTimer(SessionTimer::Handshake),
            SessionAction::CancelTimer(SessionTimer::Reconnect),
            SessionAction::CancelTimer(SessionTimer::Activity),
        ];
        if self.transport_open {
            self.transport_open = false;
            actions.push(SessionAction::DropTransport);
        }
        if let Some((code, reason)) = close {
            actions.push(self.emit_close(code, reason));
        }
        actions.push(SessionAction::Emit(ChatEvent::ConnectionFailure {
            room_id: self.room_id(),
            reconnect_attempts: self.reconnect_attempts,
            consecutive_errors: self.consecutive_errors,
            category,
            message,
        }));
        self.phase = SessionPhase::Closed;
        actions
    }

    /// Forget the current transport, report the close and plan a reconnect
    fn lose_transport(
        &mut self,
        code: Option<u16>,
        reason: &str,
        immediate: bool,
    ) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        if self.transport_open {
            self.transport_open = false;
            actions.push(SessionAction::DropTransport);
        }
        self.subscribed.clear();
        self.awaiting_pong = false;
        actions.push(SessionAction::CancelTimer(SessionTimer::Subscribe));
        actions.push(SessionAction::CancelTimer(SessionTimer::Handshake));
        actions.push(SessionAction::CancelTimer(SessionTimer::Activity));
        actions.push(self.emit_close(code, reason));
        actions.extend(self.schedule_reconnect(immediate));
        actions
    }

    fn schedule_reconnect(&mut self, immediate: bool) -> Vec<SessionAction> {
        if !self.should_reconnect {
            self.phase = SessionPhase::Closed;
            return Vec::new();
        }

        self.reconnect_attempts += 1;
        if self.reconnect_attempts >= self.config.max_attempts {
            self.should_reconnect = false;
            self.phase = SessionPhase::Closed;
            tracing::error!(
                room_id = %self.room_id(),
                attempts = self.reconnect_attempts,
                "giving up after max reconnect attempts"
            );
            return vec![SessionAction::Emit(ChatEvent::MaxReconnectsReached {
                room_id: self.room_id(),
                attempts: self.reconnect_attempts,
            })];
        }

        let delay = if immediate {
            Duration::ZERO
        } else {
            self.backoff
                .base_delay(self.reconnect_attempts)
                .unwrap_or(self.backoff.max_delay)
        };
        self.current_delay = delay;
        self.phase = SessionPhase::Reconnecting;
        self.registry
            .sink()
            .reconnect_scheduled(self.room_id(), self.reconnect_attempts, delay);
        info!(
            room_id = %self.room_id(),
            attempt = self.reconnect_attempts,
            delay_ms = delay.as_millis() as u64,
            "reconnect scheduled"
        );

        vec![SessionAction::StartTimer(SessionTimer::Reconnect, delay)]
    }
}
