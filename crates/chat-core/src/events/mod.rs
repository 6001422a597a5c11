//! Events emitted by the connection layer to its consumers

mod chat_event;

pub use chat_event::{
    ChannelEventKind, ChatEvent, ConnectionStatus, MessageEventKind, RoomEvent,
};
