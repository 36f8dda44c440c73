//! Errors raised by calendar upstreams and the credential gate.
//!
//! Callers mostly care about two questions: is the failure transient
//! ([`ProviderError::is_retryable`]) and does it need the user to sign in
//! again ([`ProviderError::is_authentication`]). Everything else is context
//! for the logs.

use std::fmt;
use thiserror::Error;

/// Classification of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Credentials are missing, revoked, or could not be refreshed.
    AuthenticationFailed,
    /// The account lacks access to the calendar (403).
    AuthorizationFailed,
    /// Connection failure, timeout, DNS.
    NetworkError,
    /// 429 from the upstream.
    RateLimited,
    /// 5xx from the upstream.
    ServerError,
    /// The payload could not be parsed.
    InvalidResponse,
    NotFound,
    /// The upstream rejected the request as malformed (400).
    BadRequest,
    ConfigurationError,
    InternalError,
}

impl ProviderErrorCode {
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::BadRequest => "bad_request",
            Self::ConfigurationError => "configuration_error",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from an upstream calendar or the credential gate.
#[derive(Debug, Error)]
pub struct ProviderError {
    code: ProviderErrorCode,
    message: String,
    /// Upstream name, e.g. `google`.
    provider: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthenticationFailed, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthorizationFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::NotFound, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::BadRequest, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ConfigurationError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InternalError, message)
    }

    /// Tags the error with the upstream that produced it.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Transient failures: the last known good data should be served instead.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// The user has to sign in again before the upstream is usable.
    pub fn is_authentication(&self) -> bool {
        self.code == ProviderErrorCode::AuthenticationFailed
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_codes() {
        assert!(ProviderErrorCode::NetworkError.is_retryable());
        assert!(ProviderErrorCode::RateLimited.is_retryable());
        assert!(ProviderErrorCode::ServerError.is_retryable());
        assert!(!ProviderErrorCode::AuthenticationFailed.is_retryable());
        assert!(!ProviderErrorCode::InvalidResponse.is_retryable());
    }

    #[test]
    fn authentication_is_not_authorization() {
        assert!(ProviderError::authentication("token revoked").is_authentication());
        assert!(!ProviderError::authorization("no access").is_authentication());
        assert!(!ProviderError::network("timeout").is_authentication());
    }

    #[test]
    fn display_includes_provider_and_code() {
        let err = ProviderError::rate_limited("too many requests").with_provider("google");
        assert_eq!(err.to_string(), "[google] rate_limited: too many requests");
        assert_eq!(
            ProviderError::server("boom").to_string(),
            "server_error: boom"
        );
    }

    #[test]
    fn source_chain() {
        use std::error::Error;
        let io_err = std::io::Error::other("disk full");
        let err = ProviderError::internal("failed to persist").with_source(io_err);
        assert!(err.source().is_some());
    }
}
