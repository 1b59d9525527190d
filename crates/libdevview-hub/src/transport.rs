//! Hub transport seam
//!
//! The hub routes name-addressed requests to the companion process and
//! carries its replies back. Routing lives outside this crate; `Hub` is
//! the send/receive primitive, and `NngHub` is the default adapter over
//! an nng pair socket dialed at the hub endpoint.

use std::time::Duration;

use nng::{options::Options, Message, Protocol, Socket};

use crate::error::HubError;
use crate::messages::{ArchivedHubReply, HubReply, HubRequest};

/// Send timeout for outgoing requests on the pair socket
const SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Name-addressed send/receive primitive to the companion process
pub trait Hub: Send + Sync {
    /// Send a request toward its target.
    fn send(&self, request: &HubRequest) -> Result<(), HubError>;

    /// Poll for a delivered reply without blocking.
    fn try_recv(&self) -> Result<Option<HubReply>, HubError>;
}

impl<T: Hub + ?Sized> Hub for std::sync::Arc<T> {
    fn send(&self, request: &HubRequest) -> Result<(), HubError> {
        (**self).send(request)
    }

    fn try_recv(&self) -> Result<Option<HubReply>, HubError> {
        (**self).try_recv()
    }
}

/// Default hub transport over an nng pair socket
pub struct NngHub {
    socket: Socket,
    endpoint: String,
}

impl NngHub {
    /// Dial the hub endpoint the companion process was launched with
    pub fn connect(endpoint: &str) -> Result<Self, HubError> {
        let socket = Socket::new(Protocol::Pair0)?;

        socket
            .set_opt::<nng::options::SendTimeout>(Some(SEND_TIMEOUT))
            .map_err(|e| HubError::ConnectionFailed(e.to_string()))?;

        socket.dial(endpoint).map_err(|e| {
            if e == nng::Error::ConnectionRefused {
                HubError::CompanionUnavailable
            } else {
                HubError::ConnectionFailed(e.to_string())
            }
        })?;

        Ok(Self {
            socket,
            endpoint: endpoint.to_string(),
        })
    }

    /// Get the endpoint this hub is dialed at
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Hub for NngHub {
    fn send(&self, request: &HubRequest) -> Result<(), HubError> {
        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(request)
            .map_err(|e| HubError::Serialization(e.to_string()))?;

        let msg = Message::from(bytes.as_slice());
        self.socket.send(msg).map_err(|e| {
            if e.1 == nng::Error::TimedOut {
                HubError::Timeout(SEND_TIMEOUT.as_millis() as u64)
            } else {
                HubError::Transport(e.1.to_string())
            }
        })?;

        Ok(())
    }

    fn try_recv(&self) -> Result<Option<HubReply>, HubError> {
        let msg = match self.socket.try_recv() {
            Ok(msg) => msg,
            Err(nng::Error::TryAgain) => return Ok(None),
            Err(e) => return Err(HubError::Transport(e.to_string())),
        };

        let archived = rkyv::access::<ArchivedHubReply, rkyv::rancor::Error>(&msg)
            .map_err(|e| HubError::Deserialization(e.to_string()))?;
        let reply: HubReply = rkyv::deserialize::<HubReply, rkyv::rancor::Error>(archived)
            .map_err(|e| HubError::Deserialization(e.to_string()))?;

        Ok(Some(reply))
    }
}
