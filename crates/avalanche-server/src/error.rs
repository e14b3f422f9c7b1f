// ============================================
// File: crates/avalanche-server/src/error.rs
// ============================================
//! # Server Error Types
//!
//! ## Last Modified
//! v0.1.0 - Initial server errors

use thiserror::Error;

use avalanche_common::error::CommonError;
use avalanche_common::ConnectionId;
use avalanche_core::error::CoreError;
use avalanche_transport::error::TransportError;

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Server error types.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to load configuration from '{path}': {reason}")]
    ConfigLoad {
        path: String,
        reason: String,
    },

    #[error("Invalid configuration: {field} - {reason}")]
    ConfigInvalid {
        field: String,
        reason: String,
    },

    #[error("No key exchange pending for connection {0}")]
    ExchangeNotStarted(ConnectionId),

    #[error("Key exchange timed out after {timeout_ms}ms waiting for a prime")]
    ExchangeTimeout {
        timeout_ms: u64,
    },

    #[error("Invalid exchange response: {reason}")]
    InvalidExchange {
        reason: String,
    },

    #[error("Server failed to start: {reason}")]
    StartupFailed {
        reason: String,
    },

    #[error(transparent)]
    Common(#[from] CommonError),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    pub fn config_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn config_invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_exchange(reason: impl Into<String>) -> Self {
        Self::InvalidExchange {
            reason: reason.into(),
        }
    }

    pub fn startup_failed(reason: impl Into<String>) -> Self {
        Self::StartupFailed {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. } | Self::ConfigInvalid { .. } | Self::Common(_)
        )
    }

    /// Errors caused by what a client sent, as opposed to server faults.
    #[must_use]
    pub fn is_client_fault(&self) -> bool {
        match self {
            Self::ExchangeNotStarted(_) | Self::InvalidExchange { .. } => true,
            Self::Core(e) => e.is_protocol_violation(),
            Self::Transport(e) => e.is_protocol_violation(),
            _ => false,
        }
    }

    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigLoad { .. }
                | Self::ConfigInvalid { .. }
                | Self::Common(_)
                | Self::StartupFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ServerError::config_load("/etc/avalanche/server.toml", "file not found");
        assert!(err.to_string().contains("/etc/avalanche/server.toml"));
    }

    #[test]
    fn test_error_classification() {
        let config_err = ServerError::config_invalid("network.port", "must be > 0");
        assert!(config_err.is_config_error());
        assert!(config_err.is_fatal());

        let client_err = ServerError::invalid_exchange("key too long");
        assert!(client_err.is_client_fault());
        assert!(!client_err.is_fatal());

        let peer_key: ServerError = CoreError::malformed_peer_key("not hex").into();
        assert!(peer_key.is_client_fault());
    }
}
