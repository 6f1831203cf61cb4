//! # pollsync-transport
//!
//! Client-side transport layer for the pollsync push channel.
//!
//! - **WebSocket** - Connects to the server's push endpoint
//! - **Memory** - In-process channel pair, paired with a [`MemoryServer`]
//!
//! ## Transport Abstraction
//!
//! All transports implement the `Transport` and `Connection` traits, so the
//! session layer does not care which one is in use.
//!
//! ```rust,ignore
//! use pollsync_transport::{Connection, Transport};
//!
//! async fn pump(transport: &dyn Transport) {
//!     let mut conn = transport.connect().await?;
//!     while let Ok(Some(frame)) = conn.recv().await {
//!         // Process frame
//!     }
//! }
//! ```

pub mod memory;
pub mod traits;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use memory::{MemoryPeer, MemoryServer, MemoryTransport};
pub use traits::{Connection, ConnectionId, Transport, TransportError};

#[cfg(feature = "websocket")]
pub use websocket::{WebSocketConfig, WebSocketTransport};
