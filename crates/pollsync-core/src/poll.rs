//! Poll data model.
//!
//! These types mirror the JSON the poll server returns. Field names are
//! snake_case on the wire.

use crate::classify::ErrorCategory;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};

/// Opaque poll identifier.
pub type PollId = String;

/// Option identifier, unique within one poll.
pub type OptionId = u32;

/// Current time in seconds since the Unix epoch.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// One choice in a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: OptionId,
    pub text: String,
    #[serde(default)]
    pub votes: u64,
}

/// What this client voted for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VotedFor {
    Single(OptionId),
    Multiple(BTreeSet<OptionId>),
}

impl VotedFor {
    /// Build the record for a submitted selection.
    ///
    /// Multi-select polls always record a set, even for a single pick.
    /// Returns `None` for an empty selection.
    #[must_use]
    pub fn from_selection(ids: &[OptionId], allow_multiple: bool) -> Option<Self> {
        match ids {
            [] => None,
            [id] if !allow_multiple => Some(VotedFor::Single(*id)),
            _ => Some(VotedFor::Multiple(ids.iter().copied().collect())),
        }
    }

    /// Whether the given option is part of the selection.
    #[must_use]
    pub fn contains(&self, option_id: OptionId) -> bool {
        match self {
            VotedFor::Single(id) => *id == option_id,
            VotedFor::Multiple(ids) => ids.contains(&option_id),
        }
    }
}

/// A complete point-in-time poll state, as returned by `GET /polls/{id}`.
///
/// Option order is the server's insertion order and is never re-sorted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollSnapshot {
    pub poll_id: PollId,
    pub title: String,
    pub options: Vec<PollOption>,
    pub total_votes: u64,
    /// Seconds since the Unix epoch.
    pub expires_at: i64,
    #[serde(default)]
    pub has_voted: bool,
    #[serde(default)]
    pub voted_for: Option<VotedFor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_multiple: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_selection: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_selection: Option<u32>,
}

impl PollSnapshot {
    /// Look up an option by id.
    #[must_use]
    pub fn option(&self, option_id: OptionId) -> Option<&PollOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    pub(crate) fn option_mut(&mut self, option_id: OptionId) -> Option<&mut PollOption> {
        self.options.iter_mut().find(|o| o.id == option_id)
    }

    /// Whether the poll accepts more than one option per vote.
    #[must_use]
    pub fn allows_multiple(&self) -> bool {
        self.allow_multiple.unwrap_or(false)
    }

    /// Whether the poll has passed its expiry time.
    #[must_use]
    pub fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    /// Seconds until expiry, zero once expired.
    #[must_use]
    pub fn remaining_secs(&self, now: i64) -> u64 {
        u64::try_from(self.expires_at.saturating_sub(now)).unwrap_or(0)
    }

    /// Check `total_votes == sum(options[].votes)`.
    ///
    /// Diagnostic only: the store trusts server totals and never recomputes.
    #[must_use]
    pub fn tally_is_consistent(&self) -> bool {
        self.options.iter().map(|o| o.votes).sum::<u64>() == self.total_votes
    }

    /// Pre-check a vote with the same rules the server applies, in the
    /// same order.
    ///
    /// # Errors
    ///
    /// Returns the category the server would answer with.
    pub fn validate_selection(&self, ids: &[OptionId], now: i64) -> Result<(), ErrorCategory> {
        if ids.is_empty() {
            return Err(ErrorCategory::MissingOption);
        }

        let count = selection_count(ids.len());
        if self.allows_multiple() {
            if let Some(min) = self.min_selection {
                if count < min {
                    return Err(ErrorCategory::MinSelection { count: Some(min) });
                }
            }
            if let Some(max) = self.max_selection {
                if count > max {
                    return Err(ErrorCategory::MaxSelection { count: Some(max) });
                }
            }
        } else if count > 1 {
            return Err(ErrorCategory::MultipleNotAllowed);
        }

        if ids.iter().any(|id| self.option(*id).is_none()) {
            return Err(ErrorCategory::InvalidOption);
        }

        if self.is_expired_at(now) {
            return Err(ErrorCategory::PollExpired);
        }

        Ok(())
    }
}

/// How long a new poll stays open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PollDuration {
    #[serde(rename = "3m")]
    ThreeMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[default]
    #[serde(rename = "1d")]
    OneDay,
    #[serde(rename = "3d")]
    ThreeDays,
    #[serde(rename = "7d")]
    SevenDays,
    #[serde(rename = "10d")]
    TenDays,
}

impl PollDuration {
    /// Length of the voting window in seconds.
    #[must_use]
    pub fn as_secs(self) -> u64 {
        match self {
            PollDuration::ThreeMinutes => 3 * 60,
            PollDuration::ThirtyMinutes => 30 * 60,
            PollDuration::OneHour => 3_600,
            PollDuration::SixHours => 6 * 3_600,
            PollDuration::OneDay => 86_400,
            PollDuration::ThreeDays => 3 * 86_400,
            PollDuration::SevenDays => 7 * 86_400,
            PollDuration::TenDays => 10 * 86_400,
        }
    }
}

/// Body of `POST /polls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePollRequest {
    pub title: String,
    pub options: Vec<String>,
    #[serde(default)]
    pub duration: PollDuration,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_multiple: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_selection: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_selection: Option<u32>,
}

/// Response of `POST /polls`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePollResponse {
    pub poll_id: PollId,
    pub url: String,
    pub expires_at: i64,
}

/// Body of `POST /polls/{id}/vote`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VoteRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_id: Option<OptionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_ids: Option<Vec<OptionId>>,
}

impl VoteRequest {
    /// Single-choice polls send `option_id`, multi-choice polls send `option_ids`.
    #[must_use]
    pub fn from_selection(ids: &[OptionId], allow_multiple: bool) -> Self {
        match ids {
            [id] if !allow_multiple => Self {
                option_id: Some(*id),
                option_ids: None,
            },
            _ => Self {
                option_id: None,
                option_ids: Some(ids.to_vec()),
            },
        }
    }
}

/// Response of `POST /polls/{id}/vote`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub success: bool,
    pub options: Vec<PollOption>,
    pub total_votes: u64,
}

/// Selection size as the server counts it, saturating instead of wrapping.
fn selection_count(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_snapshot_from_server_json() {
        let json = r#"{
            "poll_id": "k3j2",
            "title": "Best editor",
            "options": [{"id": 2, "text": "vim", "votes": 7}, {"id": 1, "text": "emacs"}],
            "total_votes": 7,
            "expires_at": 1700000000,
            "has_voted": true,
            "voted_for": [2]
        }"#;

        let poll: PollSnapshot = serde_json::from_str(json).unwrap();
        // Server order is preserved.
        assert_eq!(poll.options[0].id, 2);
        assert_eq!(poll.options[1].votes, 0);
        assert_eq!(poll.voted_for, Some(VotedFor::Multiple([2].into())));
        assert!(!poll.allows_multiple());
        assert!(poll.tally_is_consistent());
    }

    #[test]
    fn test_voted_for_wire_shapes() {
        let single: Option<VotedFor> = serde_json::from_str("3").unwrap();
        assert_eq!(single, Some(VotedFor::Single(3)));
        let none: Option<VotedFor> = serde_json::from_str("null").unwrap();
        assert_eq!(none, None);

        assert_eq!(VotedFor::from_selection(&[4], false), Some(VotedFor::Single(4)));
        assert_eq!(
            VotedFor::from_selection(&[4], true),
            Some(VotedFor::Multiple([4].into()))
        );
        assert_eq!(VotedFor::from_selection(&[], true), None);
    }

    #[test]
    fn test_validate_single_choice() {
        let poll = snapshot("p");
        let now = 1_000;

        assert_eq!(poll.validate_selection(&[], now), Err(ErrorCategory::MissingOption));
        assert_eq!(
            poll.validate_selection(&[1, 2], now),
            Err(ErrorCategory::MultipleNotAllowed)
        );
        assert_eq!(poll.validate_selection(&[9], now), Err(ErrorCategory::InvalidOption));
        assert_eq!(
            poll.validate_selection(&[1], poll.expires_at),
            Err(ErrorCategory::PollExpired)
        );
        assert!(poll.validate_selection(&[2], now).is_ok());
    }

    #[test]
    fn test_validate_multi_choice_bounds() {
        let poll = multi_snapshot("p", 2, 2);

        assert_eq!(
            poll.validate_selection(&[1], 0),
            Err(ErrorCategory::MinSelection { count: Some(2) })
        );
        assert_eq!(
            poll.validate_selection(&[1, 2, 3], 0),
            Err(ErrorCategory::MaxSelection { count: Some(2) })
        );
        assert!(poll.validate_selection(&[1, 3], 0).is_ok());
    }

    #[test]
    fn test_selection_count_saturates() {
        assert_eq!(selection_count(3), 3);
        assert_eq!(selection_count(usize::MAX), u32::MAX);

        let poll = multi_snapshot("p", 1, u32::MAX);
        assert!(poll.validate_selection(&[1, 2, 3], 0).is_ok());
    }

    #[test]
    fn test_vote_request_shape() {
        let single = serde_json::to_value(VoteRequest::from_selection(&[2], false)).unwrap();
        assert_eq!(single, serde_json::json!({"option_id": 2}));

        let multi = serde_json::to_value(VoteRequest::from_selection(&[1, 3], true)).unwrap();
        assert_eq!(multi, serde_json::json!({"option_ids": [1, 3]}));
    }

    #[test]
    fn test_durations() {
        assert_eq!(PollDuration::default().as_secs(), 86_400);
        let d: PollDuration = serde_json::from_str("\"3m\"").unwrap();
        assert_eq!(d.as_secs(), 180);
    }

    #[test]
    fn test_remaining_secs() {
        let poll = snapshot("p");
        assert_eq!(poll.remaining_secs(poll.expires_at - 30), 30);
        assert_eq!(poll.remaining_secs(poll.expires_at + 30), 0);
    }
}
