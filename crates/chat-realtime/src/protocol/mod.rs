//! Pusher wire protocol

pub mod channels;
pub mod close_codes;
pub mod envelope;

pub use close_codes::CloseClass;
pub use envelope::{names, ConnectionEstablished, PusherEnvelope, PusherErrorData};

use chat_resilience::{Classify, ErrorSignal};

/// Failures decoding or encoding frames
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("malformed {event} payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{event} carries no data")]
    MissingData { event: String },

    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
}

impl Classify for ProtocolError {
    fn signal(&self) -> ErrorSignal {
        ErrorSignal::parse(self.to_string())
    }
}
