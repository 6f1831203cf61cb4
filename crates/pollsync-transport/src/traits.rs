//! Transport abstraction traits for pollsync.
//!
//! A [`Transport`] knows how to reach the server's push endpoint; each
//! successful [`Transport::connect`] yields one [`Connection`] that carries
//! frames until either side closes it.

use async_trait::async_trait;
use pollsync_protocol::{Frame, Version};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

static NEXT_LOCAL_ID: AtomicU64 = AtomicU64::new(1);

/// Session id of a connection. The server assigns it in its `connected`
/// reply; until then a process-local placeholder stands in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub String);

impl ConnectionId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// A placeholder id, unique within this process.
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("local_{:x}", NEXT_LOCAL_ID.fetch_add(1, Ordering::Relaxed)))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a connect attempt or an established connection failed.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Server unreachable: {0}")]
    Unreachable(String),

    /// The peer went away.
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection timed out")]
    Timeout,

    /// The first frame from the server was not a usable `connected` reply.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    #[error("Incompatible protocol version {server} (client {client})")]
    VersionMismatch { client: Version, server: Version },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// A frame could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Protocol(#[from] pollsync_protocol::ProtocolError),

    /// One message was well framed but is not a frame this client knows,
    /// such as an event type added by a newer server. The connection stays
    /// usable.
    #[error("Unreadable message: {0}")]
    Malformed(pollsync_protocol::ProtocolError),

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether the connection survives this error.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TransportError::Malformed(_))
    }
}

/// A way of reaching the server's push endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a new connection and complete the handshake.
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError>;

    /// Short name for logs, such as `websocket` or `memory`.
    fn name(&self) -> &'static str;
}

/// An established push-channel connection.
#[async_trait]
pub trait Connection: Send {
    fn id(&self) -> &ConnectionId;

    /// Wait for the next frame. `None` means the server closed cleanly.
    async fn recv(&mut self) -> Result<Option<Frame>, TransportError>;

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError>;

    /// Send a close and stop reading.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Where the connection goes, for logs.
    fn remote_addr(&self) -> Option<String> {
        None
    }

    fn is_open(&self) -> bool;
}

/// Check the server's handshake reply.
///
/// # Errors
///
/// Returns an error if the frame is not `connected` or the version is
/// incompatible.
pub fn accept_handshake(frame: Option<Frame>, client: Version) -> Result<ConnectionId, TransportError> {
    match frame {
        Some(Frame::Connected { sid, version }) => {
            let server = Version::from_wire(version);
            if !client.is_compatible_with(&server) {
                return Err(TransportError::VersionMismatch { client, server });
            }
            Ok(ConnectionId::new(sid))
        }
        Some(other) => Err(TransportError::Handshake(format!(
            "expected connected frame, got {:?}",
            other.frame_type()
        ))),
        None => Err(TransportError::Handshake(
            "connection closed during handshake".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollsync_protocol::PROTOCOL_VERSION;

    #[test]
    fn test_placeholder_ids_are_unique() {
        let a = ConnectionId::generate();
        assert_ne!(a, ConnectionId::generate());
        assert!(a.to_string().starts_with("local_"));
    }

    #[test]
    fn test_accept_handshake() {
        let id = accept_handshake(
            Some(Frame::connected("abc", PROTOCOL_VERSION.to_wire())),
            PROTOCOL_VERSION,
        )
        .unwrap();
        assert_eq!(id.as_str(), "abc");

        assert!(matches!(
            accept_handshake(Some(Frame::connected("abc", 0x20)), PROTOCOL_VERSION),
            Err(TransportError::VersionMismatch { .. })
        ));
        assert!(matches!(
            accept_handshake(Some(Frame::PollExpired), PROTOCOL_VERSION),
            Err(TransportError::Handshake(_))
        ));
        assert!(matches!(
            accept_handshake(None, PROTOCOL_VERSION),
            Err(TransportError::Handshake(_))
        ));
    }
}
