//! Host OAuth primitive backed by an access token from the environment.

use async_trait::async_trait;
use identity_session::{
    AccessTokenRequest, AccessTokenResponse, AuthError, AuthResult, AuthorizationResponse,
    AuthorizationStatus, HostOAuth, Scope,
};
use parking_lot::Mutex;
use tracing::debug;

/// Environment variable holding the platform access token.
pub const ACCESS_TOKEN_ENV: &str = "SESSION_ACCESS_TOKEN";

/// Serves a fixed token in place of a host consent flow.
pub struct EnvTokenHost {
    token: Mutex<Option<String>>,
}

impl EnvTokenHost {
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Mutex::new(token.filter(|t| !t.trim().is_empty())),
        }
    }

    pub fn from_env() -> Self {
        Self::new(std::env::var(ACCESS_TOKEN_ENV).ok())
    }
}

#[async_trait]
impl HostOAuth for EnvTokenHost {
    async fn request_authorization(&self, scope: &Scope) -> AuthResult<AuthorizationResponse> {
        debug!(scope = ?scope, "Authorization requested");
        if self.token.lock().is_some() {
            Ok(AuthorizationResponse::new(AuthorizationStatus::Completed))
        } else {
            Err(AuthError::host(format!(
                "Interactive authorization is not available from the command line; set {}",
                ACCESS_TOKEN_ENV
            )))
        }
    }

    async fn get_access_token(
        &self,
        request: &AccessTokenRequest,
    ) -> AuthResult<Option<AccessTokenResponse>> {
        debug!(force_refresh = request.force_refresh, "Access token requested");
        Ok(self.token.lock().clone().map(AccessTokenResponse::with_token))
    }

    async fn deauthorize(&self) -> AuthResult<()> {
        self.token.lock().take();
        Ok(())
    }
}
