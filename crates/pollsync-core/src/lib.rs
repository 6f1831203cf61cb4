//! # pollsync-core
//!
//! Domain types and the synchronization core for pollsync.
//!
//! - **Poll** - Snapshot, options, selections, and HTTP payloads
//! - **Classify** - Maps server failure payloads to a closed error set
//! - **Store** - Holds the viewed poll and applies push updates
//! - **Room** - Joined poll rooms, replayed after reconnects
//! - **Event** - Typed server-pushed events
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  snapshot   ┌───────────────┐
//! │  HTTP fetch  │────────────▶│               │
//! └──────────────┘             │ PollSyncStore │
//! ┌──────────────┐ ServerEvent │               │
//! │ push channel │────────────▶│               │
//! └──────────────┘             └───────────────┘
//!        │ failures                    ▲
//!        ▼                             │ ErrorCategory
//! ┌──────────────┐                     │
//! │   classify   │─────────────────────┘
//! └──────────────┘
//! ```

pub mod classify;
pub mod event;
pub mod poll;
pub mod room;
pub mod store;

pub use classify::{classify, ErrorCategory, ErrorDetail, ErrorKind, StructuredDetail};
pub use event::{EventName, ServerEvent, VoteUpdate};
pub use poll::{
    unix_now, CreatePollRequest, CreatePollResponse, OptionId, PollDuration, PollId, PollOption,
    PollSnapshot, VoteRequest, VoteResponse, VotedFor,
};
pub use room::{validate_poll_id, RoomSet};
pub use store::{PollSyncStore, UpdateOutcome};
