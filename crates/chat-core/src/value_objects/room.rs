//! Room identity and the read-only view of rooms known to the signed-in user

use serde::{Deserialize, Serialize};

use super::{LivestreamId, RoomId, StreamerId};

/// Identity of the chatroom a session is bound to
///
/// Immutable for the life of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomIdentity {
    pub room_id: RoomId,
    pub streamer_id: StreamerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl RoomIdentity {
    #[must_use]
    pub fn new(room_id: RoomId, streamer_id: StreamerId) -> Self {
        Self {
            room_id,
            streamer_id,
            display_name: None,
        }
    }

    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Display name if set, otherwise the numeric room id
    pub fn label(&self) -> String {
        self.display_name
            .clone()
            .unwrap_or_else(|| self.room_id.to_string())
    }
}

/// A room as known to the identity store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnownRoom {
    pub room_id: RoomId,
    pub streamer_id: StreamerId,
    #[serde(default)]
    pub livestream_id: Option<LivestreamId>,
    #[serde(default)]
    pub is_live: bool,
}

impl KnownRoom {
    /// The current livestream, only while the room is live
    pub fn live_stream(&self) -> Option<LivestreamId> {
        if self.is_live {
            self.livestream_id
        } else {
            None
        }
    }
}
