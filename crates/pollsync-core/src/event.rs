//! Server-pushed poll events.
//!
//! These are the typed form of the push frames a client subscribes to.

use crate::poll::OptionId;
use pollsync_protocol::Frame;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Names of subscribable server events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventName {
    VoteUpdate,
    PollExpired,
}

impl EventName {
    /// All subscribable events.
    pub const ALL: [EventName; 2] = [EventName::VoteUpdate, EventName::PollExpired];

    /// Wire name of the event.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventName::VoteUpdate => "vote_update",
            EventName::PollExpired => "poll_expired",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// New absolute tally for one option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteUpdate {
    pub option_id: OptionId,
    pub votes: u64,
    pub total_votes: u64,
}

/// A poll event pushed by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    VoteUpdate(VoteUpdate),
    PollExpired,
}

impl ServerEvent {
    /// Name used to route the event to its handler.
    #[must_use]
    pub fn name(&self) -> EventName {
        match self {
            ServerEvent::VoteUpdate(_) => EventName::VoteUpdate,
            ServerEvent::PollExpired => EventName::PollExpired,
        }
    }

    /// Extract the poll event carried by a frame, if any.
    #[must_use]
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        match frame {
            Frame::VoteUpdate {
                option_id,
                votes,
                total_votes,
            } => Some(ServerEvent::VoteUpdate(VoteUpdate {
                option_id: *option_id,
                votes: *votes,
                total_votes: *total_votes,
            })),
            Frame::PollExpired => Some(ServerEvent::PollExpired),
            _ => None,
        }
    }
}
