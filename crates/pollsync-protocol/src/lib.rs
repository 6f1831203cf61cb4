//! # pollsync-protocol
//!
//! Wire protocol for the pollsync push channel.
//!
//! Clients join and leave poll rooms; the server pushes the current tally
//! for individual options and tells the room when a poll expires.
//!
//! ## Frame Types
//!
//! - `Connect` / `Connected` - Handshake
//! - `JoinPoll` / `LeavePoll` - Room membership
//! - `VoteUpdate` / `PollExpired` - Server-pushed poll events
//! - `Error`, `Ping`, `Pong` - Diagnostics and keepalive
//!
//! ## Example
//!
//! ```rust
//! use pollsync_protocol::{codec, Frame};
//!
//! let frame = Frame::join_poll("a1b2c3");
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod frames;
pub mod version;

pub use codec::{decode, decode_text, encode, encode_text, ProtocolError};
pub use frames::{Frame, FrameType};
pub use version::{Version, PROTOCOL_VERSION};
