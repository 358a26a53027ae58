//! Test doubles for the host OAuth primitive.
//!
//! Enabled for this crate's own tests and, through the `test-utils`
//! feature, for downstream crates.

use crate::host::{
    AccessTokenRequest, AccessTokenResponse, AuthorizationResponse, AuthorizationStatus, HostOAuth,
    Scope,
};
use crate::{AuthError, AuthResult};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Build an unsigned three-part JWT carrying `claims`.
pub fn test_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.sig", header, payload)
}

/// Scripted [`HostOAuth`] with call counters.
///
/// By default there is no cached token, authorization completes, and
/// de-authorization succeeds.
#[derive(Default)]
pub struct MockHost {
    cached_token: Mutex<Option<String>>,
    refreshed_token: Mutex<Option<String>>,
    authorization: Mutex<Option<AuthResult<AuthorizationStatus>>>,
    token_error: Mutex<Option<AuthError>>,
    deauthorize_error: Mutex<Option<AuthError>>,
    authorization_gate: Mutex<Option<Arc<Notify>>>,
    last_scope: Mutex<Option<Scope>>,
    authorization_calls: AtomicUsize,
    silent_token_calls: AtomicUsize,
    forced_token_calls: AtomicUsize,
    deauthorize_calls: AtomicUsize,
}

impl MockHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `token` from both the silent and the forced token calls.
    pub fn with_token(self, token: &str) -> Self {
        self.set_cached_token(Some(token));
        self.with_refreshed_token(token)
    }

    /// Serve `token` only from forced token calls.
    pub fn with_refreshed_token(self, token: &str) -> Self {
        *self.refreshed_token.lock() = Some(token.to_string());
        self
    }

    pub fn with_authorization(self, status: AuthorizationStatus) -> Self {
        *self.authorization.lock() = Some(Ok(status));
        self
    }

    pub fn failing_authorization(self, message: &str) -> Self {
        *self.authorization.lock() = Some(Err(AuthError::host(message)));
        self
    }

    pub fn failing_token(self, message: &str) -> Self {
        *self.token_error.lock() = Some(AuthError::host(message));
        self
    }

    pub fn failing_deauthorize(self, message: &str) -> Self {
        *self.deauthorize_error.lock() = Some(AuthError::host(message));
        self
    }

    /// Make `request_authorization` wait until the returned handle is
    /// notified.
    pub fn hold_authorization(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.authorization_gate.lock() = Some(gate.clone());
        gate
    }

    /// Change the token served by silent calls.
    pub fn set_cached_token(&self, token: Option<&str>) {
        *self.cached_token.lock() = token.map(str::to_string);
    }

    pub fn set_authorization(&self, status: AuthorizationStatus) {
        *self.authorization.lock() = Some(Ok(status));
    }

    pub fn authorization_calls(&self) -> usize {
        self.authorization_calls.load(Ordering::SeqCst)
    }

    /// Number of token calls with the given `force_refresh` flag.
    pub fn token_calls(&self, force_refresh: bool) -> usize {
        if force_refresh {
            self.forced_token_calls.load(Ordering::SeqCst)
        } else {
            self.silent_token_calls.load(Ordering::SeqCst)
        }
    }

    pub fn deauthorize_calls(&self) -> usize {
        self.deauthorize_calls.load(Ordering::SeqCst)
    }

    pub fn last_authorization_scope(&self) -> Option<Scope> {
        self.last_scope.lock().clone()
    }
}

#[async_trait]
impl HostOAuth for MockHost {
    async fn request_authorization(&self, scope: &Scope) -> AuthResult<AuthorizationResponse> {
        self.authorization_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_scope.lock() = Some(scope.clone());

        let gate = self.authorization_gate.lock().clone();
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let scripted = self.authorization.lock().clone();
        scripted
            .unwrap_or(Ok(AuthorizationStatus::Completed))
            .map(AuthorizationResponse::new)
    }

    async fn get_access_token(
        &self,
        request: &AccessTokenRequest,
    ) -> AuthResult<Option<AccessTokenResponse>> {
        let token = if request.force_refresh {
            self.forced_token_calls.fetch_add(1, Ordering::SeqCst);
            self.refreshed_token.lock().clone()
        } else {
            self.silent_token_calls.fetch_add(1, Ordering::SeqCst);
            self.cached_token.lock().clone()
        };

        if let Some(err) = self.token_error.lock().clone() {
            return Err(err);
        }

        Ok(token.map(|token| AccessTokenResponse { token: Some(token) }))
    }

    async fn deauthorize(&self) -> AuthResult<()> {
        self.deauthorize_calls.fetch_add(1, Ordering::SeqCst);
        match self.deauthorize_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
