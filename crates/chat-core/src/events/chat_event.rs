//! Chat events - typed notifications delivered to consumers
//!
//! Transport-level failures never reach consumers as errors; they are turned
//! into one of these events instead. The set of event names is fixed:
//! `connection`, `error`, `close`, `message`, `channel`,
//! `connection_failure` and `max_reconnects_reached`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorCategory, Severity};
use crate::value_objects::RoomId;

/// All events a connection session can emit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatEvent {
    Connection {
        room_id: RoomId,
        status: ConnectionStatus,
    },
    Error {
        room_id: RoomId,
        category: ErrorCategory,
        severity: Severity,
        message: String,
        consecutive_errors: u32,
    },
    Close {
        room_id: RoomId,
        code: Option<u16>,
        reason: String,
    },
    Message(RoomEvent<MessageEventKind>),
    Channel(RoomEvent<ChannelEventKind>),
    ConnectionFailure {
        room_id: RoomId,
        reconnect_attempts: u32,
        consecutive_errors: u32,
        category: ErrorCategory,
        message: String,
    },
    MaxReconnectsReached {
        room_id: RoomId,
        attempts: u32,
    },
}

impl ChatEvent {
    /// Consumer-facing event name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "connection",
            Self::Error { .. } => "error",
            Self::Close { .. } => "close",
            Self::Message(_) => "message",
            Self::Channel(_) => "channel",
            Self::ConnectionFailure { .. } => "connection_failure",
            Self::MaxReconnectsReached { .. } => "max_reconnects_reached",
        }
    }

    /// Room the event belongs to
    pub fn room_id(&self) -> RoomId {
        match self {
            Self::Connection { room_id, .. }
            | Self::Error { room_id, .. }
            | Self::Close { room_id, .. }
            | Self::ConnectionFailure { room_id, .. }
            | Self::MaxReconnectsReached { room_id, .. } => *room_id,
            Self::Message(event) => event.room_id,
            Self::Channel(event) => event.room_id,
        }
    }

    /// Terminal events end the session; no further events follow
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MaxReconnectsReached { .. })
    }
}

/// Connection progress reported through the `connection` event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    Pending,
    Success,
}

/// A routed platform event with its decoded payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoomEvent<K> {
    pub room_id: RoomId,
    pub kind: K,
    /// Channel the event arrived on
    pub channel: Option<String>,
    pub data: Value,
    pub received_at: DateTime<Utc>,
}

impl<K> RoomEvent<K> {
    pub fn new(room_id: RoomId, kind: K, channel: Option<String>, data: Value) -> Self {
        Self {
            room_id,
            kind,
            channel,
            data,
            received_at: Utc::now(),
        }
    }
}

/// Chat and moderation events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageEventKind {
    MessagePosted,
    MessageDeleted,
    UserBanned,
    UserUnbanned,
    PinCreated,
    PinDeleted,
}

impl MessageEventKind {
    pub const ALL: [Self; 6] = [
        Self::MessagePosted,
        Self::MessageDeleted,
        Self::UserBanned,
        Self::UserUnbanned,
        Self::PinCreated,
        Self::PinDeleted,
    ];

    /// Wire event name
    #[must_use]
    pub const fn event_name(self) -> &'static str {
        match self {
            Self::MessagePosted => "App\\Events\\ChatMessageEvent",
            Self::MessageDeleted => "App\\Events\\MessageDeletedEvent",
            Self::UserBanned => "App\\Events\\UserBannedEvent",
            Self::UserUnbanned => "App\\Events\\UserUnbannedEvent",
            Self::PinCreated => "App\\Events\\PinnedMessageCreatedEvent",
            Self::PinDeleted => "App\\Events\\PinnedMessageDeletedEvent",
        }
    }

    /// Match an exact wire event name
    #[must_use]
    pub fn from_event_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.event_name() == name)
    }
}

/// Room metadata, poll and livestream events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelEventKind {
    PollUpdated,
    PollDeleted,
    StreamStarted,
    StreamEnded,
    RoomUpdated,
    LivestreamUpdated,
}

impl ChannelEventKind {
    pub const ALL: [Self; 6] = [
        Self::PollUpdated,
        Self::PollDeleted,
        Self::StreamStarted,
        Self::StreamEnded,
        Self::RoomUpdated,
        Self::LivestreamUpdated,
    ];

    /// Wire event name
    #[must_use]
    pub const fn event_name(self) -> &'static str {
        match self {
            Self::PollUpdated => "App\\Events\\PollUpdateEvent",
            Self::PollDeleted => "App\\Events\\PollDeleteEvent",
            Self::StreamStarted => "App\\Events\\StreamerIsLive",
            Self::StreamEnded => "App\\Events\\StopStreamBroadcast",
            Self::RoomUpdated => "App\\Events\\ChatroomUpdatedEvent",
            Self::LivestreamUpdated => "App\\Events\\LivestreamUpdated",
        }
    }

    /// Match an exact wire event name
    #[must_use]
    pub fn from_event_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.event_name() == name)
    }
}
