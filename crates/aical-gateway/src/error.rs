//! Error types for calendar gateway operations.

use std::fmt;
use thiserror::Error;

/// The category of a gateway error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GatewayErrorCode {
    /// The refresh credential was rejected or the access credential expired.
    AuthenticationFailed,
    /// The account lacks permission for the resource.
    AuthorizationFailed,
    /// Connection failed, timed out, or the transport broke.
    NetworkError,
    /// Too many requests.
    RateLimited,
    /// The provider answered with an unexpected non-success status.
    ServerError,
    /// The response body could not be parsed.
    InvalidResponse,
    /// Resource not found (404).
    NotFound,
    /// The gateway does not implement this operation.
    Unsupported,
    /// Unexpected state inside the gateway.
    InternalError,
}

impl GatewayErrorCode {
    /// Returns true if this error is transient and the operation may be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::RateLimited | Self::ServerError
        )
    }

    /// Returns a human-readable name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthenticationFailed => "authentication_failed",
            Self::AuthorizationFailed => "authorization_failed",
            Self::NetworkError => "network_error",
            Self::RateLimited => "rate_limited",
            Self::ServerError => "server_error",
            Self::InvalidResponse => "invalid_response",
            Self::NotFound => "not_found",
            Self::Unsupported => "unsupported",
            Self::InternalError => "internal_error",
        }
    }
}

impl fmt::Display for GatewayErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error that occurred while talking to a calendar provider.
#[derive(Debug, Error)]
pub struct GatewayError {
    code: GatewayErrorCode,
    message: String,
    /// Gateway that produced the error (e.g. "google", "static").
    gateway: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl GatewayError {
    /// Creates a new gateway error with the given code and message.
    pub fn new(code: GatewayErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            gateway: None,
            source: None,
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::AuthenticationFailed, message)
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::AuthorizationFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::NetworkError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::RateLimited, message)
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::ServerError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InvalidResponse, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::NotFound, message)
    }

    /// Creates an error for an operation the gateway does not implement.
    pub fn unsupported(operation: &str) -> Self {
        Self::new(
            GatewayErrorCode::Unsupported,
            format!("{} is not supported by this gateway", operation),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(GatewayErrorCode::InternalError, message)
    }

    /// Sets the gateway name for this error.
    pub fn with_gateway(mut self, gateway: impl Into<String>) -> Self {
        self.gateway = Some(gateway.into());
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> GatewayErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn gateway(&self) -> Option<&str> {
        self.gateway.as_deref()
    }

    /// Returns true if this error is transient and may be retried.
    pub fn is_retryable(&self) -> bool {
        self.code.is_retryable()
    }

    /// Returns true if the error means the account's credential is unusable.
    pub fn is_credential(&self) -> bool {
        matches!(
            self.code,
            GatewayErrorCode::AuthenticationFailed | GatewayErrorCode::AuthorizationFailed
        )
    }
}

impl Clone for GatewayError {
    // The source chain is not cloneable; clones keep code, message and gateway.
    fn clone(&self) -> Self {
        Self {
            code: self.code,
            message: self.message.clone(),
            gateway: self.gateway.clone(),
            source: None,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref gateway) = self.gateway {
            write!(f, "[{}] ", gateway)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_retryable() {
        assert!(GatewayErrorCode::NetworkError.is_retryable());
        assert!(GatewayErrorCode::RateLimited.is_retryable());
        assert!(GatewayErrorCode::ServerError.is_retryable());
        assert!(!GatewayErrorCode::AuthenticationFailed.is_retryable());
        assert!(!GatewayErrorCode::Unsupported.is_retryable());
    }

    #[test]
    fn credential_errors() {
        assert!(GatewayError::authentication("revoked").is_credential());
        assert!(GatewayError::authorization("scope").is_credential());
        assert!(!GatewayError::network("dns").is_credential());
    }

    #[test]
    fn display_includes_gateway() {
        let err = GatewayError::rate_limited("too many requests").with_gateway("google");
        let display = err.to_string();
        assert!(display.contains("[google]"));
        assert!(display.contains("rate_limited"));
        assert!(display.contains("too many requests"));
    }

    #[test]
    fn unsupported_names_operation() {
        let err = GatewayError::unsupported("create_event");
        assert_eq!(err.code(), GatewayErrorCode::Unsupported);
        assert_eq!(err.message(), "create_event is not supported by this gateway");
    }

    #[test]
    fn clone_drops_source() {
        use std::error::Error;
        let err = GatewayError::internal("cache")
            .with_source(std::io::Error::other("disk full"))
            .with_gateway("static");
        assert!(err.source().is_some());
        let cloned = err.clone();
        assert!(cloned.source().is_none());
        assert_eq!(cloned.gateway(), Some("static"));
    }
}
