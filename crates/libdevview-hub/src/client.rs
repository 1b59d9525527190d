//! RPC client for companion process communication
//!
//! One client talks to one companion process (the single registered
//! target name); it does not multiplex across instances. Synchronous
//! calls hold the correlation window: at most one is outstanding at a
//! time, and the wait loop yields to the host runtime between polls so
//! the host's own timers keep firing. Fire-and-forget calls are tracked
//! in a pending map and complete whenever their reply is polled off the
//! hub.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::HubError;
use crate::messages::{HubCommand, HubReply, HubRequest};
use crate::transport::Hub;
use crate::{HUB_SCHEMA_VERSION, POLL_INTERVAL};

/// Completion callback for a fire-and-forget call.
///
/// Invoked with the reply once it is polled off the hub; never invoked
/// if the companion is torn down before replying.
pub type CompletionFn = Box<dyn FnOnce(HubReply) + Send>;

/// Correlation window of the in-flight synchronous call.
///
/// Any poll may pop the reply (the health tick pumps the same hub), so
/// a matching reply is parked here for the waiting caller instead of
/// being dropped as unmatched.
struct SyncSlot {
    request_id: String,
    reply: Option<HubReply>,
}

/// RPC client addressed to a single companion process
pub struct RpcClient<H: Hub> {
    hub: H,
    target: String,
    pending: Mutex<HashMap<String, CompletionFn>>,
    sync_slot: Mutex<Option<SyncSlot>>,
    sync_window: tokio::sync::Mutex<()>,
}

impl<H: Hub> RpcClient<H> {
    /// Create a client addressed to the companion's registered name
    pub fn new(hub: H, target: impl Into<String>) -> Self {
        Self {
            hub,
            target: target.into(),
            pending: Mutex::new(HashMap::new()),
            sync_slot: Mutex::new(None),
            sync_window: tokio::sync::Mutex::new(()),
        }
    }

    /// Get the target name this client is addressed to
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Send a request and wait for its reply, bounded by `timeout`.
    ///
    /// The wait is cooperative: the loop sleeps between hub polls, so
    /// other tasks on the host runtime make progress. On expiry the call
    /// fails with [`HubError::Timeout`], logged as a warning unless
    /// `silent`.
    pub async fn call(
        &self,
        command: HubCommand,
        timeout: Duration,
        silent: bool,
    ) -> Result<Option<String>, HubError> {
        let _window = self.sync_window.lock().await;

        let request_id = Uuid::new_v4().to_string();
        let command_name = command.name();
        let request = HubRequest::new(request_id.clone(), self.target.clone(), command);

        *self.slot() = Some(SyncSlot {
            request_id: request_id.clone(),
            reply: None,
        });

        debug!(command = command_name, request_id = %request_id, "sending request");
        if let Err(err) = self.hub.send(&request) {
            *self.slot() = None;
            return Err(err);
        }

        let deadline = Instant::now() + timeout;
        loop {
            if let Err(err) = self.poll_once() {
                *self.slot() = None;
                return Err(err);
            }
            if let Some(reply) = self.take_parked_reply() {
                *self.slot() = None;
                return finish(reply);
            }
            if Instant::now() >= deadline {
                *self.slot() = None;
                let err = HubError::Timeout(timeout.as_millis() as u64);
                if !silent {
                    warn!(command = command_name, "{}", err);
                }
                return Err(err);
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    /// Enqueue a request and return immediately.
    ///
    /// When the reply eventually arrives it is handed to `on_complete`.
    /// No timeout is enforced on this path; the caller must not depend
    /// on completion ordering relative to other work.
    pub fn call_async(
        &self,
        command: HubCommand,
        on_complete: Option<CompletionFn>,
        silent: bool,
    ) -> Result<(), HubError> {
        let request_id = Uuid::new_v4().to_string();
        let command_name = command.name();
        let request = HubRequest::new(request_id.clone(), self.target.clone(), command);

        if let Err(err) = self.hub.send(&request) {
            if !silent {
                warn!(command = command_name, "{}", err);
            }
            return Err(err);
        }

        debug!(command = command_name, request_id = %request_id, "request enqueued");
        if let Some(callback) = on_complete {
            self.pending_map().insert(request_id, callback);
        }
        Ok(())
    }

    /// Drain currently delivered replies.
    ///
    /// A reply for the in-flight synchronous call is parked for its
    /// waiter; everything else is dispatched to pending completions.
    /// Completions only ever run from here, which keeps them on the
    /// host's designated execution context.
    pub fn poll_once(&self) -> Result<(), HubError> {
        while let Some(reply) = self.hub.try_recv()? {
            self.dispatch(reply);
        }
        Ok(())
    }

    fn dispatch(&self, reply: HubReply) {
        {
            let mut slot = self.slot();
            if let Some(slot) = slot.as_mut() {
                if slot.request_id == reply.request_id {
                    slot.reply = Some(reply);
                    return;
                }
            }
        }

        let callback = self.pending_map().remove(&reply.request_id);
        match callback {
            Some(callback) => callback(reply),
            None => {
                debug!(request_id = %reply.request_id, "dropping unmatched reply");
            }
        }
    }

    fn take_parked_reply(&self) -> Option<HubReply> {
        self.slot().as_mut().and_then(|slot| slot.reply.take())
    }

    fn pending_map(&self) -> MutexGuard<'_, HashMap<String, CompletionFn>> {
        self.pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn slot(&self) -> MutexGuard<'_, Option<SyncSlot>> {
        self.sync_slot
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Version-check a correlated reply and unwrap its payload
fn finish(reply: HubReply) -> Result<Option<String>, HubError> {
    if reply.schema_version != HUB_SCHEMA_VERSION {
        return Err(HubError::VersionMismatch {
            expected: HUB_SCHEMA_VERSION,
            actual: reply.schema_version,
        });
    }
    if !reply.ok {
        let (code, message) = match reply.error {
            Some(payload) => (payload.code, payload.message),
            None => (
                "internal".to_string(),
                "unspecified companion error".to_string(),
            ),
        };
        return Err(HubError::Companion { code, message });
    }
    Ok(reply.data)
}
