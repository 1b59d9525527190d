//! Plugin error types

use thiserror::Error;

use libdevview_hub::HubError;
use libdevview_settings::SettingsError;

/// Errors surfaced to the host through lifecycle hooks
#[derive(Error, Debug)]
pub enum PluginError {
    /// The OS could not start the companion process; fatal to the start
    /// attempt and never silently retried
    #[error("failed to launch companion process: {0}")]
    Launch(#[source] std::io::Error),

    /// Hub communication failed (handshake probe, required settings push)
    #[error("hub error: {0}")]
    Hub(#[from] HubError),

    /// Settings failed to translate
    #[error("settings error: {0}")]
    Settings(#[from] SettingsError),

    /// A companion reply payload did not have the expected shape
    #[error("malformed reply: {0}")]
    MalformedReply(String),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_launch_failure_display() {
        let err = PluginError::Launch(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "no such executable",
        ));
        assert!(err.to_string().contains("failed to launch"));
    }
}
