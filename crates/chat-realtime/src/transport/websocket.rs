//! WebSocket transport over tokio-tungstenite

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::{Connector, Transport, TransportError, TransportEvent};

/// Opens TLS or plain WebSocket connections
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(TransportError::Handshake)?;

        tracing::debug!(status = %response.status(), "websocket upgraded");
        Ok(Box::new(WsTransport::new(stream)))
    }
}

pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

impl WsTransport {
    pub fn new(stream: WebSocketStream<MaybeTlsStream<TcpStream>>) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    fn closed_event(&mut self, code: Option<u16>, reason: impl Into<String>) -> TransportEvent {
        self.closed = true;
        TransportEvent::Closed {
            code,
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.stream
            .send(Message::Text(frame))
            .await
            .map_err(TransportError::Socket)
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        if self.closed {
            return None;
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(TransportEvent::Message(text)),
                Some(Ok(Message::Binary(_))) => {
                    tracing::debug!("ignoring binary frame");
                }
                // Pings are answered by tungstenite on the next read or write
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => {}
                Some(Ok(Message::Close(frame))) => {
                    let event = match frame {
                        Some(frame) => self.closed_event(
                            Some(u16::from(frame.code)),
                            frame.reason.into_owned(),
                        ),
                        None => self.closed_event(None, "closed by server"),
                    };
                    return Some(event);
                }
                Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                    return Some(self.closed_event(None, "connection lost"));
                }
                Some(Err(err)) => {
                    return Some(TransportEvent::Error(TransportError::Socket(err)));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "closed by client".into(),
        };
        match self.stream.close(Some(frame)).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(err) => Err(TransportError::Socket(err)),
        }
    }
}
