use thiserror::Error;

use crate::protocol::ProtocolError;

/// Main error type for the control hierarchy
#[derive(Error, Debug)]
pub enum PlantError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .0.join("; "))]
    InvalidConfig(Vec<String>),

    // Message errors
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("Mailbox closed: {0}")]
    ChannelClosed(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    // Resource errors
    #[error("Resource exhausted: {resource} (requested {requested}, available {available})")]
    ResourceExhausted {
        resource: String,
        requested: u32,
        available: u32,
    },

    #[error("Unknown resource pool: {0}")]
    UnknownResource(String),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for PlantError
pub type Result<T> = std::result::Result<T, PlantError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_config_joins_problems() {
        let err = PlantError::InvalidConfig(vec!["a".into(), "b".into()]);
        assert_eq!(err.to_string(), "Invalid configuration: a; b");
    }

    #[test]
    fn test_protocol_error_converts() {
        let err: PlantError = ProtocolError::Empty.into();
        assert!(matches!(err, PlantError::Protocol(_)));
    }

    #[test]
    fn test_context_keeps_source_error() {
        use anyhow::Context;

        let failed: Result<()> = Err(PlantError::UnknownResource("WATER".into()));
        let err = failed.context("launching plant").unwrap_err();
        assert_eq!(err.to_string(), "launching plant");
        assert!(matches!(
            err.downcast_ref::<PlantError>(),
            Some(PlantError::UnknownResource(r)) if r == "WATER"
        ));
    }
}
