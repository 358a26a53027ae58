//! Orchestration error types.

use crate::api_client::ApiError;
use credential_provisioning::ProvisioningError;
use identity_session::AuthError;
use thiserror::Error;

/// Orchestration error type.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// Platform session error
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Downstream credential error
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// Downstream API error
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A downstream call was attempted without ready credentials
    #[error("Downstream credentials are not ready")]
    CredentialsNotReady,
}

/// Result type alias using OrchestratorError.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
