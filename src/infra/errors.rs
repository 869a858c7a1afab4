// src/infra/errors.rs — Error types for Surfwatch

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SurfwatchError {
    // Supervisor errors (surface as session status, never as faults)
    #[error("Transcoder for '{source_id}' failed to launch: {message}")]
    LaunchFailure { source_id: String, message: String },

    #[error("Detection feed for '{source_id}' failed to attach: {message}")]
    AttachFailure { source_id: String, message: String },

    // Request errors
    #[error("No active analysis for source '{source_id}'")]
    NotFound { source_id: String },

    #[error("Relay for '{source_id}' unreachable: {message}")]
    Unreachable { source_id: String, message: String },

    #[error("Relay port {port} for '{source_id}' is already allocated")]
    PortConflict { source_id: String, port: u16 },

    #[error("No free relay port left for '{source_id}'")]
    PortsExhausted { source_id: String },

    #[error("Analysis for '{source_id}' is still stopping")]
    Stopping { source_id: String },

    // Infra
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, SurfwatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_source() {
        let err = SurfwatchError::PortConflict {
            source_id: "reef1".into(),
            port: 8551,
        };
        assert_eq!(
            err.to_string(),
            "Relay port 8551 for 'reef1' is already allocated"
        );
    }
}
