//! Test fixtures and data generators
//!
//! Provides room identities, session wiring and Pusher frames as the
//! server would send them.

use std::sync::Arc;

use chat_common::config::ReconnectConfig;
use chat_common::ResilienceSettings;
use chat_core::{ActorId, KnownRoom, LivestreamId, RoomId, RoomIdentity, StreamerId};
use chat_realtime::{ConnectionSession, SessionConfig, SessionDeps, StaticIdentity};
use chat_resilience::ResilienceRegistry;

use crate::helpers::{FakeAuth, RecordingSink, ScriptedConnector, ServerQueue};

pub const ROOM: RoomId = RoomId::new(668);
pub const STREAMER: StreamerId = StreamerId::new(676);
pub const ACTOR: ActorId = ActorId::new(1001);
pub const LIVESTREAM: LivestreamId = LivestreamId::new(5555);
pub const SOCKET_ID: &str = "123456.7890";

pub fn room() -> RoomIdentity {
    RoomIdentity::new(ROOM, STREAMER).with_display_name("xqc")
}

pub fn session_config() -> SessionConfig {
    SessionConfig::new("ws://scripted.test/app/key?protocol=7", room())
}

/// Nobody signed in
pub fn anonymous() -> Arc<StaticIdentity> {
    Arc::new(StaticIdentity::default())
}

/// Signed in, with the fixture room known and optionally live
pub fn signed_in(live: bool) -> Arc<StaticIdentity> {
    let known = KnownRoom {
        room_id: ROOM,
        streamer_id: STREAMER,
        livestream_id: Some(LIVESTREAM),
        is_live: live,
    };
    Arc::new(StaticIdentity::new(Some(ACTOR), vec![known]))
}

pub fn registry(sink: Arc<RecordingSink>) -> Arc<ResilienceRegistry> {
    registry_with(ResilienceSettings::default(), sink)
}

pub fn registry_with(
    settings: ResilienceSettings,
    sink: Arc<RecordingSink>,
) -> Arc<ResilienceRegistry> {
    Arc::new(ResilienceRegistry::new(settings, sink).expect("valid resilience settings"))
}

/// A spawned session wired to scripted collaborators
pub struct Harness {
    pub session: ConnectionSession,
    pub connector: Arc<ScriptedConnector>,
    pub servers: ServerQueue,
    pub sink: Arc<RecordingSink>,
    pub registry: Arc<ResilienceRegistry>,
    pub auth: Arc<FakeAuth>,
}

impl Harness {
    pub fn builder() -> HarnessBuilder {
        HarnessBuilder::default()
    }
}

pub struct HarnessBuilder {
    refusing: bool,
    identity: Arc<StaticIdentity>,
    auth: Arc<FakeAuth>,
    reconnect: ReconnectConfig,
    settings: ResilienceSettings,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            refusing: false,
            identity: anonymous(),
            auth: FakeAuth::new(),
            reconnect: ReconnectConfig::default(),
            settings: ResilienceSettings::default(),
        }
    }
}

impl HarnessBuilder {
    pub fn refusing(mut self) -> Self {
        self.refusing = true;
        self
    }

    pub fn identity(mut self, identity: Arc<StaticIdentity>) -> Self {
        self.identity = identity;
        self
    }

    pub fn auth(mut self, auth: Arc<FakeAuth>) -> Self {
        self.auth = auth;
        self
    }

    pub fn reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn settings(mut self, settings: ResilienceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn spawn(self) -> Harness {
        let (connector, servers) = if self.refusing {
            ScriptedConnector::refusing()
        } else {
            ScriptedConnector::accepting()
        };
        let sink = RecordingSink::new();
        let registry = registry_with(self.settings, sink.clone());

        let deps = SessionDeps::new(
            registry.clone(),
            connector.clone(),
            self.auth.clone(),
            self.identity,
        );
        let session = ConnectionSession::spawn(session_config().reconnect(self.reconnect), deps)
            .expect("session spawns");

        Harness {
            session,
            connector,
            servers,
            sink,
            registry,
            auth: self.auth,
        }
    }
}

/// Pusher frames as sent by the server
pub mod frames {
    use serde_json::{json, Value};

    /// Pusher string-encodes `data`
    fn encoded(data: &Value) -> Value {
        Value::String(data.to_string())
    }

    pub fn connection_established(socket_id: &str) -> Value {
        json!({
            "event": "pusher:connection_established",
            "data": encoded(&json!({ "socket_id": socket_id, "activity_timeout": 120 })),
        })
    }

    pub fn subscription_succeeded(channel: &str) -> Value {
        json!({
            "event": "pusher_internal:subscription_succeeded",
            "data": "{}",
            "channel": channel,
        })
    }

    pub fn ping() -> Value {
        json!({ "event": "pusher:ping", "data": "{}" })
    }

    pub fn pusher_error(code: u16, message: &str) -> Value {
        json!({
            "event": "pusher:error",
            "data": { "code": code, "message": message },
        })
    }

    pub fn chat_message(channel: &str, content: &str) -> Value {
        json!({
            "event": "App\\Events\\ChatMessageEvent",
            "data": encoded(&json!({
                "id": "9b1c6a2e-7f0d-4a55-8d3e-2a1b9c0e4f11",
                "chatroom_id": 668,
                "content": content,
                "type": "message",
                "sender": { "id": 42, "username": "viewer", "slug": "viewer" },
            })),
            "channel": channel,
        })
    }

    pub fn stream_started(channel: &str) -> Value {
        json!({
            "event": "App\\Events\\StreamerIsLive",
            "data": encoded(&json!({ "livestream": { "id": 5555, "session_title": "late night" } })),
            "channel": channel,
        })
    }

    /// A real platform event outside the routed set
    pub fn unknown(channel: &str) -> Value {
        json!({
            "event": "App\\Events\\StreamHostEvent",
            "data": "{}",
            "channel": channel,
        })
    }
}
