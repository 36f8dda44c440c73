//! Engine error types.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use vivcal_providers::ProviderError;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// IO error (listener, dismissal file, tunnel process).
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The user must sign in again. Cached data stays available.
    #[error("Authentication required: {message}")]
    AuthenticationRequired { message: String },

    /// Upstream failure that is not an authentication failure.
    #[error("Upstream error: {0}")]
    Provider(ProviderError),

    /// Webhook listener could not bind.
    #[error("Failed to bind webhook listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Tunnel could not be opened or went away.
    #[error("Tunnel error: {message}")]
    Tunnel { message: String },

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// The engine task is gone.
    #[error("Engine has shut down")]
    ShutDown,
}

impl EngineError {
    /// Creates an authentication required error.
    pub fn authentication_required(message: impl Into<String>) -> Self {
        Self::AuthenticationRequired {
            message: message.into(),
        }
    }

    /// Creates a tunnel error.
    pub fn tunnel(message: impl Into<String>) -> Self {
        Self::Tunnel {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Returns true if the user must sign in again.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::AuthenticationRequired { .. })
    }
}

impl From<ProviderError> for EngineError {
    /// Authentication failures get their own variant; everything else is
    /// wrapped as is.
    fn from(err: ProviderError) -> Self {
        if err.is_authentication() {
            Self::authentication_required(err.message())
        } else {
            Self::Provider(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_auth_error_maps_to_authentication_required() {
        let err: EngineError = ProviderError::authentication("invalid_grant").into();
        assert!(err.is_authentication());
        assert_eq!(err.to_string(), "Authentication required: invalid_grant");
    }

    #[test]
    fn other_provider_errors_are_wrapped() {
        let err: EngineError = ProviderError::server("backend error").into();
        assert!(matches!(err, EngineError::Provider(_)));
        assert!(!err.is_authentication());
    }
}
