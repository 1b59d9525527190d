//! Step-synchronous video switching
//!
//! Each step run dispatches at most one fire-and-forget command and
//! always produces exactly one step-complete signal. The signal fires
//! from the client's poll path, which keeps it on the host's designated
//! execution context.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use libdevview_hub::{Hub, HubCommand, RpcClient};

/// Per-step options consumed by the plugin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepOptions {
    /// Whether video should be on for this step
    #[serde(default = "default_video_enabled")]
    pub video_enabled: bool,
}

impl Default for StepOptions {
    fn default() -> Self {
        Self {
            video_enabled: default_video_enabled(),
        }
    }
}

fn default_video_enabled() -> bool {
    true
}

/// Host-side sink for step completion signals
pub trait StepHost: Send + Sync {
    fn step_complete(&self);
}

/// Per-step command dispatch
pub struct StepSynchronizer<H: Hub> {
    client: Arc<RpcClient<H>>,
    host: Arc<dyn StepHost>,
}

impl<H: Hub> StepSynchronizer<H> {
    pub fn new(client: Arc<RpcClient<H>>, host: Arc<dyn StepHost>) -> Self {
        Self { client, host }
    }

    /// Dispatch the step's video command and signal completion.
    ///
    /// With no active run or no live companion there is nothing to
    /// dispatch; the host still gets its completion immediately so the
    /// step pipeline never stalls on a missing device view.
    pub fn on_step_run(&self, options: &StepOptions, run_active: bool, companion_alive: bool) {
        if !run_active || !companion_alive {
            self.host.step_complete();
            return;
        }

        let command = if options.video_enabled {
            HubCommand::EnableVideo
        } else {
            HubCommand::DisableVideo
        };

        let host = Arc::clone(&self.host);
        let dispatched = self.client.call_async(
            command,
            Some(Box::new(move |_reply| host.step_complete())),
            true,
        );

        if let Err(err) = dispatched {
            debug!(%err, "step command not delivered");
            self.host.step_complete();
        }
    }
}
