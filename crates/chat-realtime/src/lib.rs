//! # chat-realtime
//!
//! Resilient Pusher client for a chat room.
//!
//! ## Modules
//!
//! - [`protocol`]: Pusher envelopes, close codes and channel names
//! - [`events`]: allow-list routing into typed [`ChatEvent`](chat_core::ChatEvent)s
//! - [`transport`]: transport traits and the tokio-tungstenite implementation
//! - [`collaborators`]: channel authorization and identity lookup
//! - [`connection`]: session state machine, driver and manager

pub mod collaborators;
pub mod connection;
pub mod error;
pub mod events;
pub mod protocol;
pub mod transport;

pub use collaborators::{
    AuthError, AuthProvider, ChannelAuth, HttpAuthProvider, IdentityStore, StaticIdentity,
};
pub use connection::{
    AuthOutcome, ConnectionSession, SessionAction, SessionConfig, SessionDeps, SessionMachine,
    SessionManager, SessionPhase, SessionSnapshot, SessionTimer,
};
pub use error::{SessionError, SessionResult};
pub use protocol::{ProtocolError, PusherEnvelope};
pub use transport::{Connector, Transport, TransportError, TransportEvent, WsConnector};
