//! Provisioning error types.

use session_config_and_utils::CoreError;
use thiserror::Error;

/// Credential provisioning error type.
#[derive(Error, Debug)]
pub enum ProvisioningError {
    /// Client id and/or secret are not set
    #[error("Missing credential configuration: set {}", .0.join(" and "))]
    MissingCredentials(Vec<String>),

    /// HTTP transport error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The credential backend answered with an error status
    #[error("Credential backend rejected the request ({status}): {message}")]
    Backend { status: u16, message: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid state transition in the credential FSM
    #[error("Invalid credential state transition: {0}")]
    InvalidStateTransition(String),
}

impl ProvisioningError {
    /// Returns true if `retry()` has a chance of succeeding without any
    /// configuration change.
    pub fn is_transient(&self) -> bool {
        match self {
            ProvisioningError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ProvisioningError::Backend { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

impl From<CoreError> for ProvisioningError {
    fn from(err: CoreError) -> Self {
        ProvisioningError::Config(err.to_string())
    }
}

/// Result type alias using ProvisioningError.
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_credentials_names_variables() {
        let err = ProvisioningError::MissingCredentials(vec![
            "AGENCY_CLIENT_ID".to_string(),
            "AGENCY_CLIENT_SECRET".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Missing credential configuration: set AGENCY_CLIENT_ID and AGENCY_CLIENT_SECRET"
        );
    }

    #[test]
    fn test_backend_transience_follows_status() {
        let server_error = ProvisioningError::Backend {
            status: 503,
            message: "unavailable".into(),
        };
        let throttled = ProvisioningError::Backend {
            status: 429,
            message: "slow down".into(),
        };
        let rejected = ProvisioningError::Backend {
            status: 401,
            message: "invalid_client".into(),
        };
        assert!(server_error.is_transient());
        assert!(throttled.is_transient());
        assert!(!rejected.is_transient());
        assert!(!ProvisioningError::MissingCredentials(vec![]).is_transient());
    }

    #[test]
    fn test_core_error_maps_to_config() {
        let err: ProvisioningError = CoreError::Config("bad scheme".into()).into();
        assert!(matches!(err, ProvisioningError::Config(ref m) if m.contains("bad scheme")));
    }
}
