//! Host platform OAuth primitive.
//!
//! The host owns the consent UI, the token cache and refresh. The session
//! controller only talks to it through [`HostOAuth`].

use crate::AuthResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Set of OAuth scopes.
pub type Scope = BTreeSet<String>;

/// Scopes requested for every authorization and token call.
pub fn default_scope() -> Scope {
    ["openid", "profile", "email"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// Result of an interactive authorization request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationStatus {
    /// The user granted consent.
    Completed,
    /// The user cancelled the consent flow.
    Aborted,
    /// Any status the host reports that is neither of the above.
    Other(String),
}

impl AuthorizationStatus {
    /// Map the host's raw status string.
    pub fn from_status(status: &str) -> Self {
        match status {
            "completed" => AuthorizationStatus::Completed,
            "aborted" => AuthorizationStatus::Aborted,
            other => AuthorizationStatus::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            AuthorizationStatus::Completed => "completed",
            AuthorizationStatus::Aborted => "aborted",
            AuthorizationStatus::Other(status) => status,
        }
    }
}

impl std::fmt::Display for AuthorizationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    pub status: AuthorizationStatus,
}

impl AuthorizationResponse {
    pub fn new(status: AuthorizationStatus) -> Self {
        Self { status }
    }
}

/// Arguments of a token request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenRequest {
    pub scope: Scope,
    pub force_refresh: bool,
}

impl AccessTokenRequest {
    /// Request for the default scope.
    pub fn new(force_refresh: bool) -> Self {
        Self {
            scope: default_scope(),
            force_refresh,
        }
    }
}

/// Token handed back by the host. `token` may be absent or empty when the
/// app has no OAuth registration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub token: Option<String>,
}

impl AccessTokenResponse {
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
        }
    }

    /// The token, when present and non-empty.
    pub fn usable_token(&self) -> Option<&str> {
        self.token.as_deref().filter(|token| !token.is_empty())
    }
}

/// OAuth operations offered by the host platform.
///
/// Failures are reported as [`crate::AuthError::Host`].
#[async_trait]
pub trait HostOAuth: Send + Sync {
    /// Open the consent flow for `scope`.
    async fn request_authorization(&self, scope: &Scope) -> AuthResult<AuthorizationResponse>;

    /// Fetch a token from the host cache, refreshing it when
    /// `force_refresh` is set. `None` means there is no cached session.
    async fn get_access_token(
        &self,
        request: &AccessTokenRequest,
    ) -> AuthResult<Option<AccessTokenResponse>>;

    /// Drop the host's session.
    async fn deauthorize(&self) -> AuthResult<()>;
}
