//! # pollwatch
//!
//! Follows one poll's tally live.
//!
//! ## Usage
//!
//! ```bash
//! # Watch a poll with default settings
//! pollwatch abc123
//!
//! # Point at another server
//! POLLSYNC_PUSH_URL=ws://polls.example/ws POLLSYNC_API_URL=http://polls.example/api pollwatch abc123
//! ```

use anyhow::{bail, Context, Result};
use pollsync_client::{metrics, ChannelSession, Config, HttpPollApi, PollView, SessionState};
use pollsync_core::{PollSyncStore, ServerEvent};
use pollsync_transport::WebSocketTransport;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

enum Wake {
    Event(Option<ServerEvent>),
    State(Option<SessionState>),
    Interrupt,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pollwatch=info,pollsync_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let poll_id = std::env::args()
        .nth(1)
        .context("usage: pollwatch <poll-id>")?;

    let config = Config::load()?;

    metrics::init_metrics();
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            tracing::error!("Failed to start metrics server: {}", e);
        }
    }

    let transport = Arc::new(WebSocketTransport::new(config.websocket_config()));
    let session = Arc::new(ChannelSession::new(transport, config.reconnect_policy()));
    let api = Arc::new(
        HttpPollApi::new(&config.server.api_base_url, config.http_timeout())
            .context("Failed to build API client")?,
    );

    tracing::info!(poll_id = %poll_id, push_url = %config.server.push_url, "Starting pollwatch");
    session.connect();

    let mut view = PollView::new(Arc::clone(&session), api);
    let policy = config.reconnect_policy();
    let mut failures = 0;
    while !view.open(&poll_id).await {
        failures += 1;
        let error = view.store().error().cloned();
        let retry_in = error
            .as_ref()
            .filter(|e| e.is_retryable())
            .and_then(|_| policy.next_delay(failures));
        match retry_in {
            Some(delay) => {
                tracing::warn!(poll_id = %poll_id, ?delay, "Poll load failed, retrying");
                tokio::time::sleep(delay).await;
            }
            None => {
                let reason = error.map_or_else(|| "unknown error".to_string(), |e| e.to_string());
                session.disconnect().await;
                bail!("Failed to load poll {poll_id}: {reason}");
            }
        }
    }
    print_tally(view.store());

    let mut state = session.watch_state();
    loop {
        let wake = tokio::select! {
            event = view.next_event() => Wake::Event(event),
            changed = state.changed() => Wake::State(changed.ok().map(|()| *state.borrow_and_update())),
            _ = tokio::signal::ctrl_c() => Wake::Interrupt,
        };

        match wake {
            Wake::Event(Some(ServerEvent::PollExpired)) => {
                print_tally(view.store());
                println!("Poll closed.");
                break;
            }
            Wake::Event(Some(ServerEvent::VoteUpdate(_))) => print_tally(view.store()),
            Wake::Event(None) | Wake::State(None) | Wake::Interrupt => break,
            Wake::State(Some(current)) => {
                tracing::info!(state = ?current, "Connection state changed");
                if current == SessionState::Disconnected {
                    if let Some(error) = session.last_error().filter(|e| e.terminal) {
                        tracing::error!(attempts = error.attempts, "Giving up: {}", error);
                        break;
                    }
                }
            }
        }
    }

    view.close();
    session.disconnect().await;
    Ok(())
}

fn print_tally(store: &PollSyncStore) {
    let Some(poll) = store.poll() else {
        return;
    };
    println!("{} ({} votes)", poll.title, poll.total_votes);
    for option in &poll.options {
        let marker = match &poll.voted_for {
            Some(voted) if voted.contains(option.id) => "*",
            _ => " ",
        };
        println!("  {marker} {:>6}  {}", option.votes, option.text);
    }
}
