//! Hub messaging layer for the device view companion process
//!
//! This crate provides:
//! - Message types for companion communication (HubRequest, HubReply, HubCommand)
//! - The `Hub` transport seam and a default nng pair-socket adapter
//! - An RPC client with per-call timeouts and fire-and-forget completions
//! - A bounded readiness probe for companion startup

pub mod client;
pub mod error;
pub mod messages;
pub mod readiness;
pub mod testing;
pub mod transport;

pub use client::{CompletionFn, RpcClient};
pub use error::HubError;
pub use messages::{HubCommand, HubErrorPayload, HubReply, HubRequest};
pub use readiness::{format_si_seconds, wait_until_ready};
pub use transport::{Hub, NngHub};

use std::time::Duration;

/// Current hub schema version
pub const HUB_SCHEMA_VERSION: u32 = 1;

/// Timeout for calls that must succeed (handshake settings pushes)
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for best-effort queries made during shutdown
pub const EXIT_QUERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Per-attempt timeout for readiness pings
pub const PING_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of readiness attempts
pub const DEFAULT_RETRY_COUNT: u32 = 10;

/// Default pause between readiness attempts
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// Reply poll cadence while a synchronous call is waiting
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);
