//! Push channel over a client WebSocket (tokio-tungstenite).
//!
//! Outgoing frames are binary MessagePack; incoming frames may be binary or
//! JSON text.

use async_trait::async_trait;
use bytes::BytesMut;
use futures_util::{SinkExt, StreamExt};
use pollsync_protocol::{codec, Frame, ProtocolError, PROTOCOL_VERSION};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, warn};

use crate::traits::{accept_handshake, Connection, ConnectionId, Transport, TransportError};

#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Push endpoint URL.
    pub url: String,
    /// Largest single WebSocket message accepted.
    pub max_message_size: usize,
    /// Time allowed for the TCP/WebSocket handshake and the `connected` reply.
    pub connect_timeout: Duration,
}

impl Default for WebSocketConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8000/ws".to_string(),
            max_message_size: 64 * 1024,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Dials a fresh WebSocket for every connect attempt.
pub struct WebSocketTransport {
    config: WebSocketConfig,
}

impl WebSocketTransport {
    #[must_use]
    pub fn new(config: WebSocketConfig) -> Self {
        Self { config }
    }

    /// Create a transport for a URL with default limits.
    #[must_use]
    pub fn with_url(url: impl Into<String>) -> Self {
        Self::new(WebSocketConfig {
            url: url.into(),
            ..Default::default()
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.config.url
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        let timeout = self.config.connect_timeout;

        let (ws_stream, _response) = tokio::time::timeout(timeout, connect_async(self.config.url.as_str()))
            .await
            .map_err(|_| TransportError::Timeout)?
            .map_err(|e| TransportError::Unreachable(e.to_string()))?;

        debug!(url = %self.config.url, "WebSocket handshake completed");

        let mut conn = WebSocketConnection::new(
            ws_stream,
            self.config.url.clone(),
            self.config.max_message_size,
        );

        conn.send(Frame::connect(PROTOCOL_VERSION.to_wire())).await?;
        let reply = tokio::time::timeout(timeout, conn.recv())
            .await
            .map_err(|_| TransportError::Timeout)??;
        conn.id = accept_handshake(reply, PROTOCOL_VERSION)?;

        debug!(url = %self.config.url, sid = %conn.id, "Handshake accepted");
        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

/// A payload that failed to deserialize has already been taken off the read
/// buffer, so only that message is lost. Size and framing errors stay fatal.
fn payload_error(e: ProtocolError) -> TransportError {
    match e {
        ProtocolError::Decode(_) | ProtocolError::Text(_) => TransportError::Malformed(e),
        other => TransportError::Protocol(other),
    }
}

/// One client WebSocket to the push endpoint.
pub struct WebSocketConnection {
    id: ConnectionId,
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    url: String,
    is_open: bool,
    read_buffer: BytesMut,
    max_message_size: usize,
}

impl WebSocketConnection {
    fn new(
        stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
        url: String,
        max_message_size: usize,
    ) -> Self {
        Self {
            id: ConnectionId::generate(),
            stream,
            url,
            is_open: true,
            read_buffer: BytesMut::with_capacity(4096),
            max_message_size,
        }
    }

    fn check_size(&self, len: usize) -> Result<(), TransportError> {
        if len > self.max_message_size {
            warn!(connection = %self.id, len, max = self.max_message_size, "Message too large");
            return Err(ProtocolError::FrameTooLarge(len).into());
        }
        Ok(())
    }
}

#[async_trait]
impl Connection for WebSocketConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        // A previous binary message may have carried more than one frame.
        if let Some(frame) = codec::decode_from(&mut self.read_buffer).map_err(payload_error)? {
            return Ok(Some(frame));
        }

        while let Some(message) = self.stream.next().await {
            let message = match message {
                Ok(message) => message,
                Err(WsError::ConnectionClosed) => break,
                Err(e) => {
                    error!(connection = %self.id, error = %e, "WebSocket read failed");
                    self.is_open = false;
                    return Err(TransportError::ReceiveFailed(e.to_string()));
                }
            };

            match message {
                Message::Binary(data) => {
                    self.check_size(data.len())?;
                    self.read_buffer.extend_from_slice(&data);
                    if let Some(frame) =
                        codec::decode_from(&mut self.read_buffer).map_err(payload_error)?
                    {
                        return Ok(Some(frame));
                    }
                }
                Message::Text(text) => {
                    self.check_size(text.len())?;
                    return codec::decode_text(&text).map(Some).map_err(payload_error);
                }
                Message::Ping(payload) => {
                    if let Err(e) = self.stream.send(Message::Pong(payload)).await {
                        warn!(connection = %self.id, error = %e, "Pong not sent");
                    }
                }
                Message::Close(_) => break,
                Message::Pong(_) | Message::Frame(_) => {}
            }
        }

        debug!(connection = %self.id, "WebSocket closed by server");
        self.is_open = false;
        Ok(None)
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        if !self.is_open {
            return Err(TransportError::ConnectionClosed);
        }
        let bytes = codec::encode(&frame)?;
        self.stream
            .send(Message::Binary(bytes.to_vec()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if std::mem::replace(&mut self.is_open, false) {
            self.stream
                .close(None)
                .await
                .map_err(|e| TransportError::Other(format!("close failed: {e}")))?;
        }
        Ok(())
    }

    fn remote_addr(&self) -> Option<String> {
        Some(self.url.clone())
    }

    fn is_open(&self) -> bool {
        self.is_open
    }
}
