//! Poll rooms.
//!
//! A room is the server-side group of push subscribers for one poll. The
//! client keeps the set of rooms it has joined so it can replay them after
//! the transport reconnects.

use crate::poll::PollId;
use tracing::trace;

/// Maximum poll id length accepted as a room name.
pub const MAX_POLL_ID_LENGTH: usize = 256;

/// Validate a poll id before using it as a room name.
///
/// # Errors
///
/// Returns an error message if the poll id is invalid.
pub fn validate_poll_id(poll_id: &str) -> Result<(), &'static str> {
    if poll_id.is_empty() {
        return Err("Poll id cannot be empty");
    }
    if poll_id.len() > MAX_POLL_ID_LENGTH {
        return Err("Poll id too long");
    }
    if !poll_id.chars().all(|c| c.is_ascii() && !c.is_ascii_control()) {
        return Err("Poll id contains invalid characters");
    }
    Ok(())
}

/// Joined rooms in join order.
#[derive(Debug, Default, Clone)]
pub struct RoomSet {
    rooms: Vec<PollId>,
}

impl RoomSet {
    /// Create an empty room set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a room. Returns `true` if it was not already joined.
    pub fn insert(&mut self, poll_id: &str) -> bool {
        if self.contains(poll_id) {
            return false;
        }
        self.rooms.push(poll_id.to_string());
        trace!(poll_id = %poll_id, rooms = self.rooms.len(), "Room added");
        true
    }

    /// Remove a room. Returns `true` if it was joined.
    pub fn remove(&mut self, poll_id: &str) -> bool {
        let before = self.rooms.len();
        self.rooms.retain(|r| r != poll_id);
        before != self.rooms.len()
    }

    /// Check if a room is joined.
    #[must_use]
    pub fn contains(&self, poll_id: &str) -> bool {
        self.rooms.iter().any(|r| r == poll_id)
    }

    /// Iterate rooms in join order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.rooms.iter().map(String::as_str)
    }

    /// Number of joined rooms.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    /// Check if no room is joined.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Forget every room.
    pub fn clear(&mut self) {
        self.rooms.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_is_idempotent() {
        let mut rooms = RoomSet::new();
        assert!(rooms.insert("a"));
        assert!(!rooms.insert("a"));
        assert!(rooms.insert("b"));
        assert_eq!(rooms.iter().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let mut rooms = RoomSet::new();
        rooms.insert("a");
        assert!(!rooms.remove("zzz"));
        assert!(rooms.remove("a"));
        assert!(rooms.is_empty());
    }

    #[test]
    fn test_poll_id_validation() {
        assert!(validate_poll_id("aB3xY9").is_ok());
        assert!(validate_poll_id("").is_err());
        assert!(validate_poll_id("bad\nid").is_err());
        assert!(validate_poll_id("投票").is_err());
        assert!(validate_poll_id(&"a".repeat(MAX_POLL_ID_LENGTH + 1)).is_err());
    }
}
