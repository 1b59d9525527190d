//! Request and reply message types
//!
//! These types define the wire format for companion communication.
//! Wire format is rkyv-serialized; structured payloads (series JSON,
//! corner CSV) travel as text fields, and reply data is JSON-encoded.

use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::HUB_SCHEMA_VERSION;

/// Request envelope addressed to the companion process by name
#[derive(Archive, Serialize, Deserialize, Debug, Clone)]
#[rkyv(derive(Debug))]
pub struct HubRequest {
    /// Schema version for compatibility checking
    pub schema_version: u32,
    /// Unique request ID for reply correlation
    pub request_id: String,
    /// Registered name of the companion process
    pub target: String,
    /// The command to execute
    pub command: HubCommand,
}

impl HubRequest {
    /// Create a new request with the current schema version
    pub fn new(request_id: String, target: String, command: HubCommand) -> Self {
        Self {
            schema_version: HUB_SCHEMA_VERSION,
            request_id,
            target,
            command,
        }
    }
}

/// Reply envelope from the companion process
#[derive(Archive, Serialize, Deserialize, Debug, Clone)]
#[rkyv(derive(Debug))]
pub struct HubReply {
    /// Schema version (must match request)
    pub schema_version: u32,
    /// Request ID this reply correlates to
    pub request_id: String,
    /// Whether the command succeeded
    pub ok: bool,
    /// Reply data (JSON-encoded for flexibility)
    pub data: Option<String>,
    /// Error details if ok=false
    pub error: Option<HubErrorPayload>,
}

impl HubReply {
    /// Create a successful reply
    pub fn success(request_id: String, data: Option<String>) -> Self {
        Self {
            schema_version: HUB_SCHEMA_VERSION,
            request_id,
            ok: true,
            data,
            error: None,
        }
    }

    /// Create an error reply
    pub fn error(request_id: String, code: String, message: String) -> Self {
        Self {
            schema_version: HUB_SCHEMA_VERSION,
            request_id,
            ok: false,
            data: None,
            error: Some(HubErrorPayload { code, message }),
        }
    }
}

/// Error payload in replies
#[derive(Archive, Serialize, Deserialize, Debug, Clone, SerdeSerialize, SerdeDeserialize)]
#[rkyv(derive(Debug))]
pub struct HubErrorPayload {
    /// Error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
}

/// Commands understood by the companion process
///
/// Series payloads are JSON object text (`{"label": number, ...}`),
/// corner payloads are CSV text with a leading index column.
#[derive(Archive, Serialize, Deserialize, Debug, Clone)]
#[rkyv(derive(Debug))]
pub enum HubCommand {
    /// Liveness check; carries no payload guarantees beyond success
    Ping,

    // Video configuration
    GetVideoConfig,
    SetVideoConfig {
        video_config: String,
    },

    // Surface alpha channels
    GetSurfaceAlphas,
    SetSurfaceAlphas {
        surface_alphas: String,
    },

    // Corner coordinates; canvas and frame always travel as a pair
    GetCorners,
    SetCorners {
        canvas: String,
        frame: String,
    },
    /// Seeds corners only if the companion has none yet
    SetDefaultCorners {
        canvas: String,
        frame: String,
    },

    // Per-step video switching
    EnableVideo,
    DisableVideo,

    /// Request graceful shutdown (fire-and-forget)
    Terminate,
}

impl HubCommand {
    /// Get the command name as a string (for logging)
    pub fn name(&self) -> &'static str {
        match self {
            HubCommand::Ping => "ping",
            HubCommand::GetVideoConfig => "get_video_config",
            HubCommand::SetVideoConfig { .. } => "set_video_config",
            HubCommand::GetSurfaceAlphas => "get_surface_alphas",
            HubCommand::SetSurfaceAlphas { .. } => "set_surface_alphas",
            HubCommand::GetCorners => "get_corners",
            HubCommand::SetCorners { .. } => "set_corners",
            HubCommand::SetDefaultCorners { .. } => "set_default_corners",
            HubCommand::EnableVideo => "enable_video",
            HubCommand::DisableVideo => "disable_video",
            HubCommand::Terminate => "terminate",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_creation() {
        let req = HubRequest::new(
            "req-123".to_string(),
            "devview".to_string(),
            HubCommand::Ping,
        );

        assert_eq!(req.schema_version, HUB_SCHEMA_VERSION);
        assert_eq!(req.request_id, "req-123");
        assert_eq!(req.target, "devview");
    }

    #[test]
    fn test_reply_success() {
        let reply = HubReply::success(
            "req-123".to_string(),
            Some(r#"{"fps": 30}"#.to_string()),
        );

        assert!(reply.ok);
        assert!(reply.error.is_none());
        assert!(reply.data.is_some());
    }

    #[test]
    fn test_reply_error() {
        let reply = HubReply::error(
            "req-123".to_string(),
            "invalid_input".to_string(),
            "corner tables must be a pair".to_string(),
        );

        assert!(!reply.ok);
        assert!(reply.data.is_none());
        assert_eq!(reply.error.as_ref().unwrap().code, "invalid_input");
    }

    #[test]
    fn test_command_names() {
        assert_eq!(HubCommand::Ping.name(), "ping");
        assert_eq!(
            HubCommand::SetDefaultCorners {
                canvas: String::new(),
                frame: String::new(),
            }
            .name(),
            "set_default_corners"
        );
        assert_eq!(HubCommand::Terminate.name(), "terminate");
    }

    #[test]
    fn test_rkyv_roundtrip() {
        let req = HubRequest::new(
            "req-456".to_string(),
            "devview".to_string(),
            HubCommand::SetVideoConfig {
                video_config: r#"{"fps": 30, "width": 640}"#.to_string(),
            },
        );

        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&req).unwrap();
        let archived =
            rkyv::access::<ArchivedHubRequest, rkyv::rancor::Error>(&bytes).unwrap();
        assert_eq!(archived.request_id, "req-456");
        assert_eq!(archived.schema_version, HUB_SCHEMA_VERSION);

        let restored: HubRequest =
            rkyv::deserialize::<HubRequest, rkyv::rancor::Error>(archived).unwrap();
        match restored.command {
            HubCommand::SetVideoConfig { video_config } => {
                assert_eq!(video_config, r#"{"fps": 30, "width": 640}"#);
            }
            _ => panic!("wrong command variant"),
        }
    }

    #[test]
    fn test_reply_rkyv_roundtrip() {
        let reply = HubReply::success(
            "req-789".to_string(),
            Some(r#"{"allocation": {"x": 10}}"#.to_string()),
        );

        let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(&reply).unwrap();
        let archived =
            rkyv::access::<ArchivedHubReply, rkyv::rancor::Error>(&bytes).unwrap();
        let restored: HubReply =
            rkyv::deserialize::<HubReply, rkyv::rancor::Error>(archived).unwrap();

        assert!(restored.ok);
        assert_eq!(restored.data, Some(r#"{"allocation": {"x": 10}}"#.to_string()));
    }
}
