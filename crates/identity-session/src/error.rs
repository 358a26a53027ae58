//! Authentication error types.

use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// The host OAuth primitive failed
    #[error("{0}")]
    Host(String),

    /// Authorization completed but the host handed back no usable token
    #[error(
        "No access token received. Ensure OAuth is configured for this app in the host developer portal."
    )]
    AuthorizationNotConfigured,

    /// Another session operation is still running
    #[error("Auth operation already in progress: {0}")]
    OperationInFlight(String),

    /// Invalid state transition in the auth FSM
    #[error("Invalid auth state transition: {0}")]
    InvalidStateTransition(String),
}

impl AuthError {
    /// Wrap a host failure message.
    pub fn host(message: impl Into<String>) -> Self {
        AuthError::Host(message.into())
    }

    /// Returns true if retrying the same action later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthError::Host(_) | AuthError::OperationInFlight(_))
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_error_displays_message_verbatim() {
        let err = AuthError::host("popup blocked");
        assert_eq!(err.to_string(), "popup blocked");
    }

    #[test]
    fn test_not_configured_message_mentions_oauth() {
        let message = AuthError::AuthorizationNotConfigured.to_string();
        assert!(message.starts_with("No access token received"));
        assert!(message.contains("OAuth is configured"));
    }

    #[test]
    fn test_is_transient() {
        assert!(AuthError::host("network").is_transient());
        assert!(AuthError::OperationInFlight("login".into()).is_transient());
        assert!(!AuthError::AuthorizationNotConfigured.is_transient());
        assert!(!AuthError::InvalidStateTransition("x".into()).is_transient());
    }
}
