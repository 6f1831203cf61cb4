//! The consuming layer for one on-screen poll.
//!
//! A [`PollView`] owns a [`PollSyncStore`], shares a [`ChannelSession`], and
//! routes push events into the store from a single queue so they apply in
//! delivery order. Push payloads carry no poll id, so the view keeps the
//! session joined to at most one room.
//!
//! Snapshot fetches are guarded by a [`FetchTicket`]: a result for a poll the
//! view has since navigated away from is dropped.
//!
//! Teardown is explicit: call [`PollView::close`] when the poll leaves the
//! screen.

use pollsync_core::{
    unix_now, ErrorCategory, EventName, OptionId, PollId, PollSnapshot, PollSyncStore,
    ServerEvent, UpdateOutcome, VoteRequest, VotedFor,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{ApiError, PollApi};
use crate::metrics;
use crate::session::{ChannelSession, SessionState};

/// Proof that a snapshot fetch was started for a given poll.
#[derive(Debug)]
#[must_use = "complete the fetch with PollView::complete_open"]
pub struct FetchTicket {
    poll_id: PollId,
}

impl FetchTicket {
    #[must_use]
    pub fn poll_id(&self) -> &str {
        &self.poll_id
    }
}

/// View state for the poll currently on screen.
pub struct PollView {
    session: Arc<ChannelSession>,
    api: Arc<dyn PollApi>,
    store: PollSyncStore,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    current: Option<PollId>,
}

impl PollView {
    /// Create a view and take over the session's poll event handlers.
    pub fn new(session: Arc<ChannelSession>, api: Arc<dyn PollApi>) -> Self {
        let events = session.subscribe(&EventName::ALL);
        Self {
            session,
            api,
            store: PollSyncStore::new(),
            events,
            current: None,
        }
    }

    #[must_use]
    pub fn store(&self) -> &PollSyncStore {
        &self.store
    }

    /// Poll the view is showing or loading.
    #[must_use]
    pub fn current_poll_id(&self) -> Option<&str> {
        self.current.as_deref()
    }

    #[must_use]
    pub fn connection_state(&self) -> SessionState {
        self.session.state()
    }

    /// Switch to `poll_id` and mark it loading.
    ///
    /// Navigating to a different poll leaves the previous room and discards
    /// its state and any of its events still queued.
    pub fn begin_open(&mut self, poll_id: &str) -> FetchTicket {
        if self.current.as_deref() != Some(poll_id) {
            if let Some(previous) = self.current.take() {
                self.session.leave(&previous);
            }
            self.store.reset();
            let stale = self.drain_queue();
            if stale > 0 {
                debug!(stale, "Dropped events for the previous poll");
            }
            self.session.join(poll_id);
            self.current = Some(poll_id.to_string());
        }
        self.store.set_loading(true);
        FetchTicket {
            poll_id: poll_id.to_string(),
        }
    }

    /// Apply the result of a fetch started with [`begin_open`](Self::begin_open).
    ///
    /// Returns `true` if a snapshot was stored. Results for a poll that is no
    /// longer current are discarded. A snapshot of some other poll than the
    /// one requested is never stored, since pushes for the joined room would
    /// be applied to it; the store shows [`ErrorCategory::Unknown`] instead.
    pub fn complete_open(
        &mut self,
        ticket: FetchTicket,
        result: Result<PollSnapshot, ApiError>,
    ) -> bool {
        if self.current.as_deref() != Some(ticket.poll_id.as_str()) {
            debug!(poll_id = %ticket.poll_id, "Discarded stale snapshot");
            return false;
        }

        self.store.set_loading(false);
        match result {
            Ok(poll) if poll.poll_id != ticket.poll_id => {
                warn!(
                    requested = %ticket.poll_id,
                    received = %poll.poll_id,
                    "Discarded snapshot of a different poll"
                );
                self.store.set_error(Some(ErrorCategory::Unknown));
                false
            }
            Ok(poll) => {
                info!(poll_id = %poll.poll_id, total_votes = poll.total_votes, "Poll loaded");
                self.store.set_snapshot(poll);
                true
            }
            Err(e) => {
                warn!(poll_id = %ticket.poll_id, error = %e, "Poll load failed");
                self.store.set_error(Some(e.category()));
                false
            }
        }
    }

    /// Fetch and show `poll_id`.
    pub async fn open(&mut self, poll_id: &str) -> bool {
        let ticket = self.begin_open(poll_id);
        let result = self.api.get_poll(poll_id).await;
        self.complete_open(ticket, result)
    }

    /// Vote on the held poll.
    ///
    /// The selection is checked locally first; the server stays
    /// authoritative. On success the store records this client's vote and
    /// takes the returned tally.
    ///
    /// # Errors
    ///
    /// Returns the category also written to the store's error.
    pub async fn vote(&mut self, option_ids: &[OptionId]) -> Result<(), ErrorCategory> {
        let (poll_id, request, selection) = match self.prepare_vote(option_ids) {
            Ok(prepared) => prepared,
            Err(category) => {
                debug!(?category, "Vote rejected locally");
                self.store.set_error(Some(category.clone()));
                return Err(category);
            }
        };

        match self.api.vote(&poll_id, &request).await {
            Ok(response) if response.success => {
                self.store.set_error(None);
                self.store.mark_voted(selection);
                self.store
                    .apply_vote_result(&response.options, response.total_votes);
                info!(poll_id = %poll_id, total_votes = response.total_votes, "Vote recorded");
                Ok(())
            }
            Ok(_) => {
                self.store.set_error(Some(ErrorCategory::VoteFailed));
                Err(ErrorCategory::VoteFailed)
            }
            Err(e) => {
                let category = e.category();
                self.store.set_error(Some(category.clone()));
                Err(category)
            }
        }
    }

    fn prepare_vote(
        &self,
        option_ids: &[OptionId],
    ) -> Result<(PollId, VoteRequest, VotedFor), ErrorCategory> {
        let poll = self.store.poll().ok_or(ErrorCategory::PollNotFound)?;
        let now = unix_now();
        if poll.has_voted {
            return Err(ErrorCategory::AlreadyVoted);
        }
        if self.store.expired() {
            return Err(ErrorCategory::PollExpired);
        }
        poll.validate_selection(option_ids, now)?;

        let allow_multiple = poll.allows_multiple();
        let selection =
            VotedFor::from_selection(option_ids, allow_multiple).ok_or(ErrorCategory::MissingOption)?;
        Ok((
            poll.poll_id.clone(),
            VoteRequest::from_selection(option_ids, allow_multiple),
            selection,
        ))
    }

    /// Apply one push event to the store.
    pub fn handle_event(&mut self, event: &ServerEvent) -> Option<UpdateOutcome> {
        let outcome = self.store.apply_event(event);
        match (event, outcome) {
            (ServerEvent::PollExpired, _) => {
                info!(poll_id = ?self.store.poll_id(), "Poll expired");
            }
            (_, Some(outcome)) => {
                if !outcome.is_applied() {
                    debug!(outcome = outcome.as_str(), "Vote update dropped");
                }
                metrics::record_update(outcome);
            }
            (_, None) => {}
        }
        outcome
    }

    /// Wait for the next push event and apply it.
    ///
    /// Returns `None` once the session's handlers were replaced or removed.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        let event = self.events.recv().await?;
        self.handle_event(&event);
        Some(event)
    }

    /// Apply every push event already queued. Returns how many were applied.
    pub fn process_pending(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(&event);
            applied += 1;
        }
        applied
    }

    /// Leave the room, drop the session's event handlers, and clear state.
    pub fn close(&mut self) {
        if let Some(poll_id) = self.current.take() {
            self.session.leave(&poll_id);
        }
        for name in EventName::ALL {
            self.session.off_event(name);
        }
        self.drain_queue();
        self.store.reset();
        debug!("View closed");
    }

    fn drain_queue(&mut self) -> usize {
        let mut drained = 0;
        while self.events.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}
