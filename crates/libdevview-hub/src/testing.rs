//! In-memory hub for tests
//!
//! `ScriptedHub` records every sent request and answers through an
//! optional responder closure, so client, readiness, and supervision
//! behavior can be exercised without a live companion process.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use crate::error::HubError;
use crate::messages::{HubReply, HubRequest};
use crate::transport::Hub;

type Responder = Box<dyn Fn(&HubRequest) -> Option<HubReply> + Send>;

/// Scripted in-memory hub
#[derive(Default)]
pub struct ScriptedHub {
    sent: Mutex<Vec<HubRequest>>,
    inbox: Mutex<VecDeque<HubReply>>,
    responder: Mutex<Option<Responder>>,
    fail_sends: Mutex<bool>,
}

impl ScriptedHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer each sent request through `responder`; returning `None`
    /// leaves the request unanswered.
    pub fn respond_with<F>(&self, responder: F)
    where
        F: Fn(&HubRequest) -> Option<HubReply> + Send + 'static,
    {
        *lock(&self.responder) = Some(Box::new(responder));
    }

    /// Make every subsequent send fail with a transport error.
    pub fn fail_sends(&self) {
        *lock(&self.fail_sends) = true;
    }

    /// Queue a reply for delivery on the next poll.
    pub fn push_reply(&self, reply: HubReply) {
        lock(&self.inbox).push_back(reply);
    }

    /// Snapshot of every request sent so far.
    pub fn sent(&self) -> Vec<HubRequest> {
        lock(&self.sent).clone()
    }

    /// Command names of every request sent so far.
    pub fn sent_commands(&self) -> Vec<&'static str> {
        lock(&self.sent).iter().map(|r| r.command.name()).collect()
    }
}

impl Hub for ScriptedHub {
    fn send(&self, request: &HubRequest) -> Result<(), HubError> {
        if *lock(&self.fail_sends) {
            return Err(HubError::Transport("scripted send failure".to_string()));
        }
        lock(&self.sent).push(request.clone());
        if let Some(responder) = lock(&self.responder).as_ref() {
            if let Some(reply) = responder(request) {
                lock(&self.inbox).push_back(reply);
            }
        }
        Ok(())
    }

    fn try_recv(&self) -> Result<Option<HubReply>, HubError> {
        Ok(lock(&self.inbox).pop_front())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
