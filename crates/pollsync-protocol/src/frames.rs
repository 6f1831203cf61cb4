//! Frame types for the pollsync push channel.
//!
//! Frames are the unit of communication between a poll client and the
//! server's push endpoint. Clients send room membership frames; the server
//! pushes tally updates and lifecycle notifications.

use serde::{Deserialize, Serialize};

/// Frame type identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
#[repr(u8)]
pub enum FrameType {
    Connect = 0x01,
    Connected = 0x02,
    JoinPoll = 0x03,
    LeavePoll = 0x04,
    VoteUpdate = 0x05,
    PollExpired = 0x06,
    Error = 0x07,
    Ping = 0x08,
    Pong = 0x09,
}

impl From<FrameType> for u8 {
    fn from(ft: FrameType) -> u8 {
        ft as u8
    }
}

impl TryFrom<u8> for FrameType {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, <Self as TryFrom<u8>>::Error> {
        match value {
            0x01 => Ok(FrameType::Connect),
            0x02 => Ok(FrameType::Connected),
            0x03 => Ok(FrameType::JoinPoll),
            0x04 => Ok(FrameType::LeavePoll),
            0x05 => Ok(FrameType::VoteUpdate),
            0x06 => Ok(FrameType::PollExpired),
            0x07 => Ok(FrameType::Error),
            0x08 => Ok(FrameType::Ping),
            0x09 => Ok(FrameType::Pong),
            _ => Err("Invalid frame type"),
        }
    }
}

impl FrameType {
    /// Whether frames of this type flow from client to server.
    #[must_use]
    pub fn is_client_frame(self) -> bool {
        matches!(
            self,
            FrameType::Connect | FrameType::JoinPoll | FrameType::LeavePoll | FrameType::Ping
        )
    }
}

/// A protocol frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Client handshake.
    #[serde(rename = "connect")]
    Connect {
        /// Protocol version spoken by the client, encoded as `major << 4 | minor`.
        version: u8,
    },

    /// Server handshake response.
    #[serde(rename = "connected")]
    Connected {
        /// Server-assigned session id.
        sid: String,
        /// Negotiated protocol version.
        version: u8,
    },

    /// Join the room for a poll.
    #[serde(rename = "join_poll")]
    JoinPoll {
        /// Poll whose updates the client wants to receive.
        poll_id: String,
    },

    /// Leave the room for a poll.
    #[serde(rename = "leave_poll")]
    LeavePoll {
        /// Poll whose updates the client no longer wants.
        poll_id: String,
    },

    /// New tally for one option, pushed to everyone in the poll's room.
    ///
    /// The frame carries no poll id; it is scoped to the room it was
    /// delivered through.
    #[serde(rename = "vote_update")]
    VoteUpdate {
        /// Option whose count changed.
        option_id: u32,
        /// Absolute vote count for the option.
        votes: u64,
        /// Absolute vote count for the whole poll.
        total_votes: u64,
    },

    /// The poll stopped accepting votes.
    #[serde(rename = "poll_expired")]
    PollExpired,

    /// Server-side error not tied to a poll event.
    #[serde(rename = "error")]
    Error {
        /// Error code.
        code: String,
        /// Human-readable error message.
        message: String,
    },

    /// Keepalive ping.
    #[serde(rename = "ping")]
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    #[serde(rename = "pong")]
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl Frame {
    /// Get the frame type.
    #[must_use]
    pub fn frame_type(&self) -> FrameType {
        match self {
            Frame::Connect { .. } => FrameType::Connect,
            Frame::Connected { .. } => FrameType::Connected,
            Frame::JoinPoll { .. } => FrameType::JoinPoll,
            Frame::LeavePoll { .. } => FrameType::LeavePoll,
            Frame::VoteUpdate { .. } => FrameType::VoteUpdate,
            Frame::PollExpired => FrameType::PollExpired,
            Frame::Error { .. } => FrameType::Error,
            Frame::Ping { .. } => FrameType::Ping,
            Frame::Pong { .. } => FrameType::Pong,
        }
    }

    /// Create a new Connect frame.
    #[must_use]
    pub fn connect(version: u8) -> Self {
        Frame::Connect { version }
    }

    /// Create a new Connected frame.
    #[must_use]
    pub fn connected(sid: impl Into<String>, version: u8) -> Self {
        Frame::Connected {
            sid: sid.into(),
            version,
        }
    }

    /// Create a new JoinPoll frame.
    #[must_use]
    pub fn join_poll(poll_id: impl Into<String>) -> Self {
        Frame::JoinPoll {
            poll_id: poll_id.into(),
        }
    }

    /// Create a new LeavePoll frame.
    #[must_use]
    pub fn leave_poll(poll_id: impl Into<String>) -> Self {
        Frame::LeavePoll {
            poll_id: poll_id.into(),
        }
    }

    /// Create a new VoteUpdate frame.
    #[must_use]
    pub fn vote_update(option_id: u32, votes: u64, total_votes: u64) -> Self {
        Frame::VoteUpdate {
            option_id,
            votes,
            total_votes,
        }
    }

    /// Create a new Error frame.
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Frame::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create a new Ping frame.
    #[must_use]
    pub fn ping() -> Self {
        Frame::Ping { timestamp: None }
    }

    /// Create a new Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }

    /// Poll id carried by a membership frame.
    #[must_use]
    pub fn poll_id(&self) -> Option<&str> {
        match self {
            Frame::JoinPoll { poll_id } | Frame::LeavePoll { poll_id } => Some(poll_id),
            _ => None,
        }
    }
}
