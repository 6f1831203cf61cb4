//! In-process transport.
//!
//! [`MemoryTransport`] connects to a [`MemoryServer`] living in the same
//! process. Each connect hands the server a [`MemoryPeer`] through which it
//! reads client frames and pushes server frames. The server can be made
//! unreachable to exercise reconnection.

use async_trait::async_trait;
use pollsync_protocol::{Frame, PROTOCOL_VERSION};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::traits::{accept_handshake, Connection, ConnectionId, Transport, TransportError};

struct Shared {
    reachable: AtomicBool,
    attempts: AtomicUsize,
    next_sid: AtomicU64,
    incoming: mpsc::UnboundedSender<MemoryPeer>,
}

/// Client side of an in-process push channel.
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl MemoryTransport {
    /// Create a connected transport/server pair.
    #[must_use]
    pub fn pair() -> (MemoryTransport, MemoryServer) {
        let (incoming, accept_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            reachable: AtomicBool::new(true),
            attempts: AtomicUsize::new(0),
            next_sid: AtomicU64::new(1),
            incoming,
        });
        (
            MemoryTransport {
                shared: Arc::clone(&shared),
            },
            MemoryServer { shared, accept_rx },
        )
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<Box<dyn Connection>, TransportError> {
        self.shared.attempts.fetch_add(1, Ordering::SeqCst);

        if !self.shared.reachable.load(Ordering::SeqCst) {
            return Err(TransportError::Unreachable("memory server offline".into()));
        }

        let sid = format!("mem-{}", self.shared.next_sid.fetch_add(1, Ordering::SeqCst));
        let (to_server, from_client) = mpsc::unbounded_channel();
        let (to_client, from_server) = mpsc::unbounded_channel();

        // The server greets every peer before it is handed over.
        let _ = to_client.send(Frame::connected(&sid, PROTOCOL_VERSION.to_wire()));

        let peer = MemoryPeer {
            sid: sid.clone(),
            from_client,
            to_client,
        };
        if self.shared.incoming.send(peer).is_err() {
            return Err(TransportError::Unreachable("memory server dropped".into()));
        }

        let mut conn = MemoryConnection {
            id: ConnectionId::new(sid),
            outbound: Some(to_server),
            inbound: from_server,
        };
        let greeting = conn.inbound.recv().await;
        conn.id = accept_handshake(greeting, PROTOCOL_VERSION)?;

        debug!(connection = %conn.id, "Memory connection established");
        Ok(Box::new(conn))
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Server side of the in-process push channel.
pub struct MemoryServer {
    shared: Arc<Shared>,
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryServer {
    /// Make subsequent connects succeed or fail.
    pub fn set_reachable(&self, reachable: bool) {
        self.shared.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Total connect attempts seen, successful or not.
    #[must_use]
    pub fn connect_attempts(&self) -> usize {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Wait for the next client connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.recv().await
    }

    /// Take a pending client connection without waiting.
    pub fn try_accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.try_recv().ok()
    }
}

/// The server's handle on one client connection.
///
/// Dropping the peer drops the connection from the client's point of view.
pub struct MemoryPeer {
    sid: String,
    from_client: mpsc::UnboundedReceiver<Frame>,
    to_client: mpsc::UnboundedSender<Frame>,
}

impl MemoryPeer {
    /// Session id handed to the client.
    #[must_use]
    pub fn sid(&self) -> &str {
        &self.sid
    }

    /// Wait for the next frame from the client. `None` once it closed.
    pub async fn recv(&mut self) -> Option<Frame> {
        self.from_client.recv().await
    }

    /// Take every frame the client has sent so far.
    pub fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.from_client.try_recv() {
            frames.push(frame);
        }
        frames
    }

    /// Push a frame to the client. Returns `false` if it is gone.
    pub fn send(&self, frame: Frame) -> bool {
        self.to_client.send(frame).is_ok()
    }
}

/// Client side of one in-process connection.
pub struct MemoryConnection {
    id: ConnectionId,
    outbound: Option<mpsc::UnboundedSender<Frame>>,
    inbound: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl Connection for MemoryConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn recv(&mut self) -> Result<Option<Frame>, TransportError> {
        Ok(self.inbound.recv().await)
    }

    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::ConnectionClosed)?;
        trace!(connection = %self.id, frame_type = ?frame.frame_type(), "Memory send");
        outbound
            .send(frame)
            .map_err(|_| TransportError::ConnectionClosed)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.outbound = None;
        self.inbound.close();
        Ok(())
    }

    fn remote_addr(&self) -> Option<String> {
        Some("memory".to_string())
    }

    fn is_open(&self) -> bool {
        self.outbound.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_and_exchange() {
        let (transport, mut server) = MemoryTransport::pair();

        let mut conn = transport.connect().await.unwrap();
        let mut peer = server.accept().await.unwrap();
        assert_eq!(conn.id().as_str(), peer.sid());

        conn.send(Frame::join_poll("p1")).await.unwrap();
        assert_eq!(peer.recv().await, Some(Frame::join_poll("p1")));

        assert!(peer.send(Frame::vote_update(1, 2, 3)));
        assert_eq!(conn.recv().await.unwrap(), Some(Frame::vote_update(1, 2, 3)));
    }

    #[tokio::test]
    async fn test_unreachable_server() {
        let (transport, server) = MemoryTransport::pair();
        server.set_reachable(false);

        assert!(matches!(
            transport.connect().await,
            Err(TransportError::Unreachable(_))
        ));
        assert_eq!(server.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_peer_drop_closes_client() {
        let (transport, mut server) = MemoryTransport::pair();
        let mut conn = transport.connect().await.unwrap();
        let peer = server.accept().await.unwrap();

        drop(peer);

        assert_eq!(conn.recv().await.unwrap(), None);
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_client_close_reaches_peer() {
        let (transport, mut server) = MemoryTransport::pair();
        let mut conn = transport.connect().await.unwrap();
        let mut peer = server.accept().await.unwrap();

        conn.close().await.unwrap();

        assert_eq!(peer.recv().await, None);
        assert!(matches!(
            conn.send(Frame::ping()).await,
            Err(TransportError::ConnectionClosed)
        ));
    }
}
