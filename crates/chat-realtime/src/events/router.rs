//! Turns allow-listed platform envelopes into typed events
//!
//! Matching is by exact `event` string. Anything not on the list is
//! dropped without error.

use chat_core::{ChannelEventKind, ChatEvent, MessageEventKind, RoomEvent, RoomId};
use serde_json::Value;

use crate::protocol::PusherEnvelope;

/// Route an envelope; `None` means the event is not for consumers
pub fn route(room_id: RoomId, envelope: &PusherEnvelope) -> Option<ChatEvent> {
    if let Some(kind) = MessageEventKind::from_event_name(&envelope.event) {
        return Some(ChatEvent::Message(RoomEvent::new(
            room_id,
            kind,
            envelope.channel.clone(),
            payload(envelope),
        )));
    }

    ChannelEventKind::from_event_name(&envelope.event).map(|kind| {
        ChatEvent::Channel(RoomEvent::new(
            room_id,
            kind,
            envelope.channel.clone(),
            payload(envelope),
        ))
    })
}

/// Decoded data; undecodable strings are passed through as-is
fn payload(envelope: &PusherEnvelope) -> Value {
    envelope
        .data_json()
        .unwrap_or_else(|_| envelope.data.clone().unwrap_or(Value::Null))
}
