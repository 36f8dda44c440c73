//! Client error types.

use std::fmt;

use vivcal_engine::EngineError;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors that can occur in the client.
#[derive(Debug)]
pub enum ClientError {
    /// Configuration error.
    Config(String),
    /// Provider error.
    Provider(String),
    /// The engine failed or stopped.
    Engine(EngineError),
    /// IO error.
    Io(std::io::Error),
    /// Logging could not be initialized.
    Logging(String),
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {}", msg),
            Self::Provider(msg) => write!(f, "provider error: {}", msg),
            Self::Engine(err) => write!(f, "engine error: {}", err),
            Self::Io(err) => write!(f, "IO error: {}", err),
            Self::Logging(msg) => write!(f, "logging setup failed: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Engine(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<EngineError> for ClientError {
    fn from(err: EngineError) -> Self {
        Self::Engine(err)
    }
}

impl From<vivcal_providers::ProviderError> for ClientError {
    fn from(err: vivcal_providers::ProviderError) -> Self {
        Self::Provider(err.to_string())
    }
}

impl From<vivcal_core::TracingError> for ClientError {
    fn from(err: vivcal_core::TracingError) -> Self {
        Self::Logging(err.to_string())
    }
}
