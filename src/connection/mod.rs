//! Connection module - lifecycle state and the supervisor task.
//!
//! - [`ConnectionState`] - the observable lifecycle state
//! - `supervisor` - drives open, discovery, subscription and reconnects
//!
//! State changes are published on a `tokio::sync::watch` channel; see
//! [`Client::watch_state`](crate::Client::watch_state).

mod state;
pub(crate) mod supervisor;

pub use state::ConnectionState;
