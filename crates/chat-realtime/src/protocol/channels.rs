//! Channel names for a room
//!
//! The server accepts several historical spellings of the same room
//! channel. Subscribing to all of them is harmless, and each one is
//! unsubscribed again on close.

use chat_core::{ActorId, LivestreamId, RoomId, StreamerId};

const PRIVATE_PREFIX: &str = "private-";

/// Public channel variants for a room, primary channel first
pub fn public_channels(room_id: RoomId, streamer_id: StreamerId) -> Vec<String> {
    vec![
        primary_channel(room_id),
        format!("chatrooms.{room_id}"),
        format!("chatroom_{room_id}"),
        format!("channel.{streamer_id}"),
        format!("channel_{streamer_id}"),
    ]
}

/// The channel whose subscription acknowledgment marks the session live
pub fn primary_channel(room_id: RoomId) -> String {
    format!("chatrooms.{room_id}.v2")
}

/// Private channels of the signed-in user
pub fn actor_channels(actor_id: ActorId) -> Vec<String> {
    vec![
        format!("{PRIVATE_PREFIX}userfeed.{actor_id}"),
        format!("{PRIVATE_PREFIX}App.User.{actor_id}"),
    ]
}

pub fn livestream_channel(livestream_id: LivestreamId) -> String {
    format!("{PRIVATE_PREFIX}livestream.{livestream_id}")
}
