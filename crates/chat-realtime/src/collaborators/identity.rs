//! Read-only view of the signed-in user

use chat_common::config::RoomConfig;
use chat_core::{ActorId, KnownRoom, RoomId};

/// Who is signed in and which rooms they know about
pub trait IdentityStore: Send + Sync {
    fn actor_id(&self) -> Option<ActorId>;

    fn known_rooms(&self) -> Vec<KnownRoom>;

    fn known_room(&self, room_id: RoomId) -> Option<KnownRoom> {
        self.known_rooms()
            .into_iter()
            .find(|room| room.room_id == room_id)
    }
}

/// Fixed identity, typically built from configuration
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    actor_id: Option<ActorId>,
    rooms: Vec<KnownRoom>,
}

impl StaticIdentity {
    pub fn new(actor_id: Option<ActorId>, rooms: Vec<KnownRoom>) -> Self {
        Self { actor_id, rooms }
    }

    /// A configured livestream id marks the room as live
    pub fn from_config(room: &RoomConfig) -> Self {
        let known = KnownRoom {
            room_id: room.room_id,
            streamer_id: room.streamer_id,
            livestream_id: room.livestream_id,
            is_live: room.livestream_id.is_some(),
        };
        Self::new(room.actor_id, vec![known])
    }
}

impl IdentityStore for StaticIdentity {
    fn actor_id(&self) -> Option<ActorId> {
        self.actor_id
    }

    fn known_rooms(&self) -> Vec<KnownRoom> {
        self.rooms.clone()
    }
}
