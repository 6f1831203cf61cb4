//! Push channel session.
//!
//! A [`ChannelSession`] keeps one logical connection to the server's push
//! endpoint alive and remembers which poll rooms the client has joined. A
//! background driver task owns the live [`Connection`]; the session talks to
//! it through an outbound frame queue and observes it through `watch`
//! channels.
//!
//! ```text
//!   join/leave ──► Membership (rooms + outbound queue) ──► driver ──► Connection
//!                                                            │
//!   handlers ◄──────────────── vote_update / poll_expired ◄──┘
//! ```
//!
//! The joined-room set and the outbound queue sit behind one lock. A join
//! racing a (re)connect is either replayed by the driver or sent through the
//! new queue, never both.

use dashmap::DashMap;
use pollsync_core::{validate_poll_id, ErrorKind, EventName, RoomSet, ServerEvent};
use pollsync_protocol::Frame;
use pollsync_transport::{Connection, Transport, TransportError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::metrics;
use crate::reconnect::ReconnectPolicy;

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
}

/// Last connection failure seen by a session.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ConnectionError {
    pub message: String,
    /// Consecutive failed connects when the error was recorded.
    pub attempts: u32,
    /// The retry budget is spent; only an explicit `connect()` resumes.
    pub terminal: bool,
}

/// Handler for one server event name.
pub type EventHandler = Arc<dyn Fn(&ServerEvent) + Send + Sync>;

struct Membership {
    rooms: RoomSet,
    /// Present exactly while a connection is established.
    outbound: Option<mpsc::UnboundedSender<Frame>>,
}

struct Shared {
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    state: watch::Sender<SessionState>,
    error: watch::Sender<Option<ConnectionError>>,
    membership: Mutex<Membership>,
    handlers: DashMap<EventName, EventHandler>,
}

struct Driver {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// One logical push connection plus the rooms joined over it.
pub struct ChannelSession {
    shared: Arc<Shared>,
    driver: Mutex<Option<Driver>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ChannelSession {
    /// Create a disconnected session.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        let (error, _) = watch::channel(None);
        Self {
            shared: Arc::new(Shared {
                transport,
                policy,
                state,
                error,
                membership: Mutex::new(Membership {
                    rooms: RoomSet::new(),
                    outbound: None,
                }),
                handlers: DashMap::new(),
            }),
            driver: Mutex::new(None),
        }
    }

    /// Start connecting. No-op unless the session is disconnected.
    ///
    /// Must be called within a tokio runtime.
    pub fn connect(&self) {
        let mut driver = lock(&self.driver);
        if *self.shared.state.borrow() != SessionState::Disconnected {
            trace!("Connect ignored: already active");
            return;
        }

        self.shared.state.send_replace(SessionState::Connecting);
        debug!(transport = self.shared.transport.name(), "Connecting");

        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(Arc::clone(&self.shared).run(shutdown_rx));
        // A previous driver only stops after publishing `Disconnected`.
        *driver = Some(Driver { shutdown, task });
    }

    /// Close the connection, forget every joined room, and stop retrying.
    ///
    /// Safe to call in any state.
    pub async fn disconnect(&self) {
        let driver = lock(&self.driver).take();
        {
            let mut membership = lock(&self.shared.membership);
            membership.rooms.clear();
            membership.outbound = None;
        }
        metrics::set_active_rooms(0);

        if let Some(driver) = driver {
            let _ = driver.shutdown.send(());
            if let Err(e) = driver.task.await {
                warn!(error = %e, "Session driver ended abnormally");
            }
        }

        self.shared.state.send_replace(SessionState::Disconnected);
        metrics::set_connected(false);
        debug!("Disconnected");
    }

    /// Join a poll room. Sent now if connected, otherwise on the next connect.
    pub fn join(&self, poll_id: &str) {
        if let Err(reason) = validate_poll_id(poll_id) {
            warn!(poll_id, reason, "Join ignored: invalid poll id");
            return;
        }

        let mut membership = lock(&self.shared.membership);
        if !membership.rooms.insert(poll_id) {
            trace!(poll_id, "Already joined");
            return;
        }
        metrics::set_active_rooms(membership.rooms.len());

        match &membership.outbound {
            Some(outbound) => {
                let _ = outbound.send(Frame::join_poll(poll_id));
                debug!(poll_id, "Joined");
            }
            None => debug!(poll_id, "Join queued until connected"),
        }
    }

    /// Leave a poll room. The room is forgotten in every state.
    pub fn leave(&self, poll_id: &str) {
        let mut membership = lock(&self.shared.membership);
        if !membership.rooms.remove(poll_id) {
            return;
        }
        metrics::set_active_rooms(membership.rooms.len());

        if let Some(outbound) = &membership.outbound {
            let _ = outbound.send(Frame::leave_poll(poll_id));
        }
        debug!(poll_id, "Left");
    }

    /// Install the handler for an event name, replacing any earlier one.
    pub fn on_event<F>(&self, name: EventName, handler: F)
    where
        F: Fn(&ServerEvent) + Send + Sync + 'static,
    {
        if self.shared.handlers.insert(name, Arc::new(handler)).is_some() {
            debug!(event = %name, "Handler replaced");
        }
    }

    /// Remove the handler for an event name. Returns whether one was set.
    pub fn off_event(&self, name: EventName) -> bool {
        self.shared.handlers.remove(&name).is_some()
    }

    /// Route the named events into one queue, in delivery order.
    ///
    /// Installs a forwarding handler per name, replacing earlier handlers.
    pub fn subscribe(&self, names: &[EventName]) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        for &name in names {
            let tx = tx.clone();
            self.on_event(name, move |event| {
                let _ = tx.send(event.clone());
            });
        }
        rx
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Observe state transitions.
    #[must_use]
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    #[must_use]
    pub fn last_error(&self) -> Option<ConnectionError> {
        self.shared.error.borrow().clone()
    }

    /// Observe connection errors. `None` after every successful connect.
    #[must_use]
    pub fn watch_error(&self) -> watch::Receiver<Option<ConnectionError>> {
        self.shared.error.subscribe()
    }

    /// Joined rooms in join order.
    #[must_use]
    pub fn joined_rooms(&self) -> Vec<String> {
        lock(&self.shared.membership)
            .rooms
            .iter()
            .map(str::to_string)
            .collect()
    }

    #[must_use]
    pub fn is_joined(&self, poll_id: &str) -> bool {
        lock(&self.shared.membership).rooms.contains(poll_id)
    }
}

/// How a served connection ended.
enum ConnectionEnd {
    Shutdown,
    Dropped(Option<String>),
}

enum Step {
    Shutdown,
    Outbound(Option<Frame>),
    Inbound(Result<Option<Frame>, TransportError>),
}

impl Shared {
    /// Connect, serve, and retry until shut down or out of attempts.
    async fn run(self: Arc<Self>, mut shutdown: oneshot::Receiver<()>) {
        let mut failures: u32 = 0;

        loop {
            metrics::record_connect_attempt();
            let result = tokio::select! {
                biased;
                _ = &mut shutdown => return,
                result = self.transport.connect() => result,
            };

            match result {
                Ok(conn) => {
                    failures = 0;
                    match self.serve(conn, &mut shutdown).await {
                        ConnectionEnd::Shutdown => return,
                        ConnectionEnd::Dropped(reason) => {
                            metrics::record_reconnect();
                            self.state.send_replace(SessionState::Connecting);
                            let message = reason.unwrap_or_else(|| "connection closed".to_string());
                            warn!(reason = %message, "Push channel dropped, reconnecting");
                            self.error.send_replace(Some(ConnectionError {
                                message,
                                attempts: 0,
                                terminal: false,
                            }));
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    let terminal = self.policy.next_delay(failures).is_none();
                    warn!(attempt = failures, error = %e, terminal, "Connect failed");
                    metrics::record_error(ErrorKind::Connectivity);
                    self.error.send_replace(Some(ConnectionError {
                        message: e.to_string(),
                        attempts: failures,
                        terminal,
                    }));

                    if terminal {
                        metrics::record_terminal_failure();
                        info!(attempts = failures, "Reconnect budget exhausted");
                        // Last action: `connect()` may start a new driver from here on.
                        self.state.send_replace(SessionState::Disconnected);
                        return;
                    }
                }
            }

            let delay = self
                .policy
                .next_delay(failures)
                .unwrap_or(self.policy.base_delay);
            debug!(delay_ms = delay.as_millis() as u64, "Waiting before reconnect");
            tokio::select! {
                biased;
                _ = &mut shutdown => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Pump frames over one established connection.
    async fn serve(
        &self,
        mut conn: Box<dyn Connection>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> ConnectionEnd {
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel();
        {
            let mut membership = lock(&self.membership);
            for room in membership.rooms.iter() {
                let _ = outbound.send(Frame::join_poll(room));
            }
            debug!(
                connection = %conn.id(),
                rooms = membership.rooms.len(),
                "Replaying joined rooms"
            );
            membership.outbound = Some(outbound);
        }
        self.state.send_replace(SessionState::Connected);
        self.error.send_replace(None);
        metrics::set_connected(true);
        let remote = conn.remote_addr().unwrap_or_else(|| "unknown".to_string());
        info!(connection = %conn.id(), remote = %remote, "Push channel connected");

        let end = loop {
            let step = tokio::select! {
                biased;
                _ = &mut *shutdown => Step::Shutdown,
                frame = outbound_rx.recv() => Step::Outbound(frame),
                frame = conn.recv() => Step::Inbound(frame),
            };

            match step {
                // Queue closed: `disconnect()` cleared it.
                Step::Shutdown | Step::Outbound(None) => {
                    if let Err(e) = conn.close().await {
                        debug!(error = %e, "Close failed");
                    }
                    break ConnectionEnd::Shutdown;
                }
                Step::Outbound(Some(frame)) => {
                    trace!(frame_type = ?frame.frame_type(), "Sending frame");
                    if let Err(e) = conn.send(frame).await {
                        break ConnectionEnd::Dropped(Some(e.to_string()));
                    }
                    metrics::record_frame("out");
                }
                Step::Inbound(Ok(Some(frame))) => {
                    metrics::record_frame("in");
                    if let Err(e) = self.handle_frame(frame, conn.as_mut()).await {
                        break ConnectionEnd::Dropped(Some(e.to_string()));
                    }
                }
                Step::Inbound(Err(e)) if e.is_recoverable() => {
                    warn!(connection = %conn.id(), error = %e, "Skipped unreadable push message");
                    metrics::record_error(ErrorKind::Protocol);
                }
                Step::Inbound(Ok(None)) => break ConnectionEnd::Dropped(None),
                Step::Inbound(Err(e)) => break ConnectionEnd::Dropped(Some(e.to_string())),
            }
        };

        lock(&self.membership).outbound = None;
        metrics::set_connected(false);
        end
    }

    async fn handle_frame(
        &self,
        frame: Frame,
        conn: &mut dyn Connection,
    ) -> Result<(), TransportError> {
        if let Some(event) = ServerEvent::from_frame(&frame) {
            self.dispatch(&event);
            return Ok(());
        }

        match frame {
            Frame::Ping { timestamp } => conn.send(Frame::pong(timestamp)).await?,
            Frame::Pong { .. } => {}
            Frame::Error { code, message } => {
                warn!(code = %code, message = %message, "Server reported an error");
                metrics::record_error(ErrorKind::Protocol);
            }
            Frame::Connected { sid, .. } => {
                debug!(sid = %sid, "Connected frame (already connected)");
            }
            other => {
                warn!(frame_type = ?other.frame_type(), "Unexpected frame type");
            }
        }
        Ok(())
    }

    fn dispatch(&self, event: &ServerEvent) {
        // Clone out so a handler may (un)register handlers itself.
        let handler = self
            .handlers
            .get(&event.name())
            .map(|entry| Arc::clone(entry.value()));
        match handler {
            Some(handler) => handler(event),
            None => trace!(event = %event.name(), "No handler"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pollsync_transport::MemoryTransport;
    use std::time::Duration;

    fn session() -> (ChannelSession, pollsync_transport::MemoryServer) {
        let (transport, server) = MemoryTransport::pair();
        let policy = ReconnectPolicy::new(
            1,
            Duration::from_millis(10),
            Duration::from_millis(10),
            crate::reconnect::Backoff::Fixed,
        );
        (ChannelSession::new(Arc::new(transport), policy), server)
    }

    #[test]
    fn test_rooms_tracked_while_disconnected() {
        let (session, _server) = session();

        session.join("p1");
        session.join("p1");
        session.join("p2");
        session.leave("p1");
        session.leave("missing");

        assert_eq!(session.joined_rooms(), vec!["p2".to_string()]);
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[test]
    fn test_invalid_poll_id_ignored() {
        let (session, _server) = session();
        session.join("");
        session.join(&"x".repeat(300));
        assert!(session.joined_rooms().is_empty());
    }

    #[test]
    fn test_off_event_reports_presence() {
        let (session, _server) = session();
        session.on_event(EventName::PollExpired, |_| {});
        assert!(session.off_event(EventName::PollExpired));
        assert!(!session.off_event(EventName::PollExpired));
    }

    #[tokio::test]
    async fn test_connect_is_idempotent() {
        let (session, mut server) = session();

        session.connect();
        session.connect();
        let mut state = session.watch_state();
        state
            .wait_for(|s| *s == SessionState::Connected)
            .await
            .unwrap();
        session.connect();

        assert!(server.accept().await.is_some());
        assert!(server.try_accept().is_none());
        assert_eq!(server.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_when_idle() {
        let (session, _server) = session();
        session.disconnect().await;
        session.disconnect().await;
        assert_eq!(session.state(), SessionState::Disconnected);
    }
}
