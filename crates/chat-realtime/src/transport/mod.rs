//! Transport abstraction
//!
//! A [`Connector`] opens fresh [`Transport`] handles. The session owns at most
//! one handle at a time and never reuses one after it closes.

pub mod websocket;

pub use websocket::{WsConnector, WsTransport};

use async_trait::async_trait;
use chat_resilience::classify::io_code;
use chat_resilience::{Classify, ErrorSignal};
use std::io;
use tokio_tungstenite::tungstenite::Error as WsError;

/// Something a live transport reports
#[derive(Debug)]
pub enum TransportEvent {
    Message(String),
    Error(TransportError),
    /// Reported once; the handle yields nothing afterwards
    Closed { code: Option<u16>, reason: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket handshake failed: {0}")]
    Handshake(#[source] WsError),

    #[error("socket error: {0}")]
    Socket(#[source] WsError),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("transport is closed")]
    Closed,
}

impl Classify for TransportError {
    fn signal(&self) -> ErrorSignal {
        let signal = ErrorSignal::from_error(self);
        match self {
            // Io is transparent, so the source walk never sees the io::Error itself
            Self::Io(err) | Self::Handshake(WsError::Io(err)) | Self::Socket(WsError::Io(err)) => {
                match io_code(err.kind()) {
                    Some(code) => signal.with_code(code),
                    None => signal,
                }
            }
            Self::Handshake(WsError::Http(response)) => {
                signal.with_status(response.status().as_u16())
            }
            _ => signal,
        }
    }
}

/// Opens transport handles
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// One open connection
///
/// `next_event` must be cancel-safe; the session polls it inside `select!`.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// `None` once the handle has reported its close
    async fn next_event(&mut self) -> Option<TransportEvent>;

    async fn close(&mut self) -> Result<(), TransportError>;
}
