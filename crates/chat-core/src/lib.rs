//! # chat-core
//!
//! Domain vocabulary for the real-time connection layer: room identities,
//! the error taxonomy shared by the resilience machinery, and the typed
//! events handed to consumers (UI, telemetry).
//! This crate has zero dependencies on infrastructure (network, runtime, etc.).

pub mod error;
pub mod events;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use error::{DomainError, ErrorCategory, RecoveryAction, Severity};
pub use events::{
    ChannelEventKind, ChatEvent, ConnectionStatus, MessageEventKind, RoomEvent,
};
pub use value_objects::{
    ActorId, IdParseError, KnownRoom, LivestreamId, RoomId, RoomIdentity, StreamerId,
};
