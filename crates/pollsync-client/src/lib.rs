//! # pollsync-client
//!
//! Keeps a client's view of a live poll in sync with the server.
//!
//! - [`ChannelSession`] - one reconnecting push connection and its joined rooms
//! - [`PollApi`] / [`HttpPollApi`] - the REST boundary, with error classification
//! - [`PollView`] - the store for the poll on screen, fed by both
//!
//! ## Example
//!
//! ```no_run
//! use pollsync_client::{ChannelSession, HttpPollApi, PollView, ReconnectPolicy};
//! use pollsync_transport::WebSocketTransport;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Arc::new(WebSocketTransport::with_url("ws://127.0.0.1:8000/ws"));
//! let session = Arc::new(ChannelSession::new(transport, ReconnectPolicy::default()));
//! let api = Arc::new(HttpPollApi::new("http://127.0.0.1:8000/api", Duration::from_secs(10))?);
//!
//! session.connect();
//! let mut view = PollView::new(Arc::clone(&session), api);
//! view.open("abc123").await;
//! while let Some(_event) = view.next_event().await {
//!     println!("{:?}", view.store().poll());
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod metrics;
pub mod reconnect;
pub mod session;
pub mod view;

pub use api::{intercept, ApiError, HttpPollApi, PollApi};
pub use config::Config;
pub use reconnect::{Backoff, ReconnectPolicy};
pub use session::{ChannelSession, ConnectionError, EventHandler, SessionState};
pub use view::{FetchTicket, PollView};
