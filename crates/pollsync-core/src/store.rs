//! The tally store for the poll currently on screen.
//!
//! [`PollSyncStore`] holds the last snapshot fetched over HTTP and applies
//! push updates to it. Server-supplied counts are written verbatim; the
//! store never increments or recomputes totals locally, so a missed update
//! is corrected by the next one instead of drifting.
//!
//! Updates carry no sequence number. If the transport delivers them out of
//! order the last one applied wins.
//!
//! The store does not know which poll a fetch was started for. Callers that
//! fetch snapshots must compare the fetch's poll id with the poll being
//! viewed before calling [`PollSyncStore::set_snapshot`].

use crate::classify::ErrorCategory;
use crate::event::{ServerEvent, VoteUpdate};
use crate::poll::{OptionId, PollOption, PollSnapshot, VotedFor};
use tracing::{debug, trace};

/// Result of applying a push update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Counts were replaced.
    Applied,
    /// Dropped: no snapshot is held yet, or any more.
    NoSnapshot,
    /// Dropped: the option is not part of the held snapshot.
    UnknownOption,
}

impl UpdateOutcome {
    /// Whether the update changed the store.
    #[must_use]
    pub fn is_applied(self) -> bool {
        self == UpdateOutcome::Applied
    }

    /// Label for logs and metrics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateOutcome::Applied => "applied",
            UpdateOutcome::NoSnapshot => "no_snapshot",
            UpdateOutcome::UnknownOption => "unknown_option",
        }
    }
}

/// Single source of truth for the viewed poll.
#[derive(Debug, Default)]
pub struct PollSyncStore {
    poll: Option<PollSnapshot>,
    loading: bool,
    error: Option<ErrorCategory>,
    expired: bool,
}

impl PollSyncStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The held snapshot, if any.
    #[must_use]
    pub fn poll(&self) -> Option<&PollSnapshot> {
        self.poll.as_ref()
    }

    /// Id of the held poll.
    #[must_use]
    pub fn poll_id(&self) -> Option<&str> {
        self.poll.as_ref().map(|p| p.poll_id.as_str())
    }

    #[must_use]
    pub fn loading(&self) -> bool {
        self.loading
    }

    #[must_use]
    pub fn error(&self) -> Option<&ErrorCategory> {
        self.error.as_ref()
    }

    /// Whether a `poll_expired` event has been received for the held poll.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.expired
    }

    /// Replace the held poll wholesale and clear the error and the expired
    /// flag. A fresh snapshot's `expires_at` decides expiry from here on.
    pub fn set_snapshot(&mut self, poll: PollSnapshot) {
        self.expired = false;
        debug!(poll_id = %poll.poll_id, options = poll.options.len(), "Snapshot set");
        self.poll = Some(poll);
        self.error = None;
    }

    /// Overwrite one option's count and the poll total with server values.
    ///
    /// Updates without a held snapshot or for an unknown option are dropped;
    /// both are expected races, not faults.
    pub fn apply_vote_update(
        &mut self,
        option_id: OptionId,
        votes: u64,
        total_votes: u64,
    ) -> UpdateOutcome {
        let Some(poll) = self.poll.as_mut() else {
            trace!(option_id, "Update dropped: no snapshot");
            return UpdateOutcome::NoSnapshot;
        };
        let Some(option) = poll.option_mut(option_id) else {
            trace!(poll_id = %poll.poll_id, option_id, "Update dropped: unknown option");
            return UpdateOutcome::UnknownOption;
        };

        option.votes = votes;
        poll.total_votes = total_votes;
        trace!(poll_id = %poll.poll_id, option_id, votes, total_votes, "Update applied");
        UpdateOutcome::Applied
    }

    /// Apply a typed push update.
    pub fn apply(&mut self, update: VoteUpdate) -> UpdateOutcome {
        self.apply_vote_update(update.option_id, update.votes, update.total_votes)
    }

    /// Apply any poll event.
    ///
    /// Returns `None` for events that carry no tally.
    pub fn apply_event(&mut self, event: &ServerEvent) -> Option<UpdateOutcome> {
        match event {
            ServerEvent::VoteUpdate(update) => Some(self.apply(*update)),
            ServerEvent::PollExpired => {
                self.mark_expired();
                None
            }
        }
    }

    /// Reconcile the full tally returned by a successful vote request.
    ///
    /// Counts are taken verbatim; options missing from the held snapshot are
    /// ignored and the held order is kept.
    pub fn apply_vote_result(&mut self, options: &[PollOption], total_votes: u64) {
        let Some(poll) = self.poll.as_mut() else {
            return;
        };
        for fresh in options {
            if let Some(option) = poll.option_mut(fresh.id) {
                option.votes = fresh.votes;
            }
        }
        poll.total_votes = total_votes;
    }

    /// Record this client's own successful vote.
    ///
    /// Push updates never touch `has_voted` or `voted_for`; only this does.
    pub fn mark_voted(&mut self, selection: VotedFor) {
        if let Some(poll) = self.poll.as_mut() {
            debug!(poll_id = %poll.poll_id, ?selection, "Marked voted");
            poll.has_voted = true;
            poll.voted_for = Some(selection);
        }
    }

    /// Record that the server closed the held poll.
    pub fn mark_expired(&mut self) {
        if self.poll.is_some() {
            self.expired = true;
        }
    }

    /// Whether the held poll no longer accepts votes.
    #[must_use]
    pub fn is_terminal(&self, now: i64) -> bool {
        self.expired || self.poll.as_ref().is_some_and(|p| p.is_expired_at(now))
    }

    /// Whether this client may still vote on the held poll.
    #[must_use]
    pub fn can_vote(&self, now: i64) -> bool {
        self.poll.as_ref().is_some_and(|p| !p.has_voted) && !self.is_terminal(now)
    }

    pub fn set_loading(&mut self, loading: bool) {
        self.loading = loading;
    }

    pub fn set_error(&mut self, error: Option<ErrorCategory>) {
        self.error = error;
    }

    /// Clear all state. Used when navigating away from a poll.
    pub fn reset(&mut self) {
        self.poll = None;
        self.loading = false;
        self.error = None;
        self.expired = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::fixtures::{multi_snapshot, snapshot};

    fn votes(store: &PollSyncStore) -> Vec<(OptionId, u64)> {
        store
            .poll()
            .unwrap()
            .options
            .iter()
            .map(|o| (o.id, o.votes))
            .collect()
    }

    #[test]
    fn test_end_to_end_update() {
        let mut store = PollSyncStore::new();
        store.set_snapshot(snapshot("p1"));

        let outcome = store.apply_vote_update(1, 4, 9);

        assert_eq!(outcome, UpdateOutcome::Applied);
        assert_eq!(votes(&store), vec![(1, 4), (2, 5)]);
        assert_eq!(store.poll().unwrap().total_votes, 9);
    }

    #[test]
    fn test_consistent_totals_hold_after_every_update() {
        let mut store = PollSyncStore::new();
        store.set_snapshot(snapshot("p1"));

        // Server-side sequence: (option, new count, new total)
        let pushes = [(1, 4, 9), (2, 6, 10), (2, 7, 11), (1, 5, 12), (1, 6, 13)];
        for (option_id, count, total) in pushes {
            store.apply_vote_update(option_id, count, total);
            assert!(store.poll().unwrap().tally_is_consistent());
        }
        assert_eq!(votes(&store), vec![(1, 6), (2, 7)]);
    }

    #[test]
    fn test_update_before_snapshot_is_noop() {
        let mut store = PollSyncStore::new();

        assert_eq!(store.apply_vote_update(1, 4, 9), UpdateOutcome::NoSnapshot);
        assert!(store.poll().is_none());
        assert!(store.error().is_none());
        assert!(!store.loading());
    }

    #[test]
    fn test_update_for_unknown_option_is_noop() {
        let mut store = PollSyncStore::new();
        store.set_snapshot(snapshot("p1"));
        let before = store.poll().cloned();

        assert_eq!(store.apply_vote_update(42, 1, 9), UpdateOutcome::UnknownOption);
        assert_eq!(store.poll().cloned(), before);
        assert!(store.error().is_none());
    }

    #[test]
    fn test_push_never_touches_own_vote() {
        let mut store = PollSyncStore::new();
        store.set_snapshot(snapshot("p1"));
        store.mark_voted(VotedFor::Single(1));

        store.apply_vote_update(1, 10, 15);

        let poll = store.poll().unwrap();
        assert!(poll.has_voted);
        assert_eq!(poll.voted_for, Some(VotedFor::Single(1)));
        assert_eq!(poll.option(1).unwrap().votes, 10);
    }

    #[test]
    fn test_push_does_not_mark_voted() {
        let mut store = PollSyncStore::new();
        store.set_snapshot(snapshot("p1"));
        store.apply_vote_update(2, 6, 9);
        assert!(!store.poll().unwrap().has_voted);
        assert!(store.can_vote(0));
    }

    #[test]
    fn test_mark_voted_without_snapshot() {
        let mut store = PollSyncStore::new();
        store.mark_voted(VotedFor::Single(1));
        assert!(store.poll().is_none());
    }

    #[test]
    fn test_set_snapshot_clears_error_and_replaces_poll() {
        let mut store = PollSyncStore::new();
        store.set_snapshot(snapshot("p1"));
        store.mark_voted(VotedFor::Single(2));
        store.mark_expired();
        store.set_error(Some(ErrorCategory::Network));

        store.set_snapshot(snapshot("p2"));

        assert_eq!(store.poll_id(), Some("p2"));
        assert!(store.error().is_none());
        assert!(!store.poll().unwrap().has_voted);
        assert!(!store.expired());
    }

    #[test]
    fn test_refetch_clears_expired_flag() {
        let mut store = PollSyncStore::new();
        store.set_snapshot(snapshot("p1"));
        store.apply_event(&ServerEvent::PollExpired);
        assert!(store.expired());

        store.set_snapshot(snapshot("p1"));
        assert!(!store.expired());
        assert!(!store.is_terminal(0));

        // The snapshot's own deadline still applies.
        let expires_at = store.poll().unwrap().expires_at;
        assert!(store.is_terminal(expires_at));
    }

    #[test]
    fn test_expiry() {
        let mut store = PollSyncStore::new();
        store.set_snapshot(snapshot("p1"));
        let expires_at = store.poll().unwrap().expires_at;

        assert!(!store.is_terminal(expires_at - 1));
        assert!(store.is_terminal(expires_at));
        assert!(!store.can_vote(expires_at));

        store.mark_expired();
        assert!(store.is_terminal(0));
    }

    #[test]
    fn test_vote_result_reconciles_in_place() {
        let mut store = PollSyncStore::new();
        store.set_snapshot(multi_snapshot("p1", 1, 2));

        let fresh = vec![
            PollOption {
                id: 3,
                text: "Salad".into(),
                votes: 1,
            },
            PollOption {
                id: 1,
                text: "Noodles".into(),
                votes: 4,
            },
            PollOption {
                id: 77,
                text: "Ghost".into(),
                votes: 9,
            },
        ];
        store.apply_vote_result(&fresh, 10);

        assert_eq!(votes(&store), vec![(1, 4), (2, 5), (3, 1)]);
        assert_eq!(store.poll().unwrap().total_votes, 10);
    }

    #[test]
    fn test_reset() {
        let mut store = PollSyncStore::new();
        store.set_snapshot(snapshot("p1"));
        store.set_loading(true);
        store.set_error(Some(ErrorCategory::PollNotFound));

        store.reset();

        assert!(store.poll().is_none());
        assert!(!store.loading());
        assert!(store.error().is_none());
    }
}
