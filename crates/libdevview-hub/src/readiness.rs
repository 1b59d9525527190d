//! Bounded readiness polling for companion startup
//!
//! Companion startup time is unbounded and environment-dependent (the
//! process must itself connect to the hub), so the only robust readiness
//! signal is a ping answered within a wall-clock deadline. Between
//! attempts the probe sleeps in ten sub-intervals, yielding to the host
//! runtime after each one so the host stays responsive while waiting.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::client::RpcClient;
use crate::error::HubError;
use crate::messages::HubCommand;
use crate::transport::Hub;
use crate::PING_TIMEOUT;

/// Ping the companion until it answers or the retry budget is spent.
///
/// Each attempt is a silent ping bounded by [`PING_TIMEOUT`]; the first
/// success returns the observation time. Exhaustion fails with
/// [`HubError::Unreachable`] carrying the total elapsed wall-clock time.
pub async fn wait_until_ready<H: Hub>(
    client: &RpcClient<H>,
    retry_count: u32,
    retry_interval: Duration,
) -> Result<DateTime<Utc>, HubError> {
    let started = Instant::now();

    for attempt in 1..=retry_count {
        match client.call(HubCommand::Ping, PING_TIMEOUT, true).await {
            Ok(_) => {
                info!(attempt, retry_count, "companion process answered ping");
                return Ok(Utc::now());
            }
            Err(err) => {
                debug!(attempt, retry_count, %err, "ping attempt failed");
            }
        }

        let slice = retry_interval / 10;
        for _ in 0..10 {
            sleep(slice).await;
        }
    }

    Err(HubError::Unreachable {
        elapsed: format_si_seconds(started.elapsed().as_secs_f64()),
    })
}

/// Format a duration in seconds with an SI magnitude prefix,
/// e.g. `15.3 s`, `250.0 ms`, `1.2 ks`.
pub fn format_si_seconds(secs: f64) -> String {
    if secs == 0.0 {
        return "0.0 s".to_string();
    }
    let (value, unit) = if secs >= 1000.0 {
        (secs / 1000.0, "ks")
    } else if secs >= 1.0 {
        (secs, "s")
    } else if secs >= 1e-3 {
        (secs * 1e3, "ms")
    } else {
        (secs * 1e6, "µs")
    };
    format!("{value:.1} {unit}")
}
