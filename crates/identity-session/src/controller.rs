//! Auth session controller.
//!
//! Drives the host OAuth primitive and publishes every step of the token
//! lifecycle through an observable [`StateStore`]. Each operation runs
//! inside the phase machine from [`crate::auth_fsm`], so `initialize`,
//! `login` and `logout` never overlap.

use crate::auth_fsm::{AuthMachine, AuthMachineInput, AuthPhase};
use crate::claims::{extract_identity, UserIdentity};
use crate::host::{default_scope, AccessTokenRequest, AuthorizationStatus, HostOAuth, Scope};
use crate::store::{StateStore, Subscription};
use crate::{AuthError, AuthResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Error recorded when the user closes the consent flow.
pub const CANCELLED_MESSAGE: &str = "Authentication was cancelled";

/// Snapshot of the platform session.
///
/// When `is_authenticated` is true, `user` and `access_token` are present
/// and `error` is absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthState {
    pub is_authenticated: bool,
    pub user: Option<UserIdentity>,
    pub access_token: Option<String>,
    pub error: Option<String>,
    pub loading: bool,
}

impl Default for AuthState {
    fn default() -> Self {
        Self {
            is_authenticated: false,
            user: None,
            access_token: None,
            error: None,
            loading: true,
        }
    }
}

/// Partial update shallow-merged into [`AuthState`].
///
/// Nullable fields use `Option<Option<T>>`: the outer `None` leaves the
/// field untouched, `Some(None)` clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthStatePatch {
    pub is_authenticated: Option<bool>,
    pub user: Option<Option<UserIdentity>>,
    pub access_token: Option<Option<String>>,
    pub error: Option<Option<String>>,
    pub loading: Option<bool>,
}

impl AuthStatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Unauthenticated idle state with no error.
    pub fn signed_out() -> Self {
        Self::new()
            .authenticated(false)
            .user(None)
            .access_token(None)
            .error(None)
            .loading(false)
    }

    /// Fully authenticated state.
    pub fn signed_in(token: String, user: UserIdentity) -> Self {
        Self::new()
            .authenticated(true)
            .user(Some(user))
            .access_token(Some(token))
            .error(None)
            .loading(false)
    }

    pub fn authenticated(mut self, value: bool) -> Self {
        self.is_authenticated = Some(value);
        self
    }

    pub fn user(mut self, value: Option<UserIdentity>) -> Self {
        self.user = Some(value);
        self
    }

    pub fn access_token(mut self, value: Option<String>) -> Self {
        self.access_token = Some(value);
        self
    }

    pub fn error(mut self, value: Option<String>) -> Self {
        self.error = Some(value);
        self
    }

    pub fn loading(mut self, value: bool) -> Self {
        self.loading = Some(value);
        self
    }

    /// Merge the set fields into `state`.
    pub fn apply_to(self, state: &mut AuthState) {
        if let Some(value) = self.is_authenticated {
            state.is_authenticated = value;
        }
        if let Some(value) = self.user {
            state.user = value;
        }
        if let Some(value) = self.access_token {
            state.access_token = value;
        }
        if let Some(value) = self.error {
            state.error = value;
        }
        if let Some(value) = self.loading {
            state.loading = value;
        }
    }
}

/// How a [`AuthSessionController::login`] call that did not fail ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Consent granted and a token retrieved.
    Authenticated,
    /// The user cancelled; [`CANCELLED_MESSAGE`] is recorded in state.
    Cancelled,
    /// The host reported a status it does not document. Nothing is
    /// recorded in state.
    Unrecognized(String),
}

/// Owner of the platform session state.
pub struct AuthSessionController {
    host: Arc<dyn HostOAuth>,
    store: StateStore<AuthState>,
    fsm: Mutex<AuthMachine>,
    scope: Scope,
}

impl AuthSessionController {
    /// Create a controller in the initial loading state. Call
    /// [`initialize`](Self::initialize) once afterwards.
    pub fn new(host: Arc<dyn HostOAuth>) -> Self {
        Self {
            host,
            store: StateStore::new(AuthState::default()),
            fsm: Mutex::new(AuthMachine::new()),
            scope: default_scope(),
        }
    }

    /// Silently look for a cached host session.
    ///
    /// Finding none is not an error: the state settles unauthenticated
    /// with `error` absent. Only an overlapping operation is reported.
    pub async fn initialize(&self) -> AuthResult<()> {
        self.begin(AuthMachineInput::SilentCheck, "initialize")?;
        self.apply(AuthStatePatch::new().loading(true).error(None));

        let token = match self
            .host
            .get_access_token(&self.token_request(false))
            .await
        {
            Ok(response) => response.and_then(|r| r.usable_token().map(str::to_string)),
            Err(e) => {
                debug!(error = %e, "Silent token check failed");
                None
            }
        };

        match token {
            Some(token) => {
                let user = extract_identity(&token);
                info!(user_id = %user.id, "Existing host session found");
                self.settle(AuthMachineInput::SessionFound, AuthStatePatch::signed_in(token, user));
            }
            None => {
                info!("No existing host session");
                self.settle(AuthMachineInput::NoSession, AuthStatePatch::signed_out());
            }
        }

        Ok(())
    }

    /// Run the interactive consent flow.
    ///
    /// Token retrieval and host failures are recorded in state and
    /// returned.
    pub async fn login(&self) -> AuthResult<LoginOutcome> {
        self.begin(AuthMachineInput::LoginAttempt, "login")?;
        self.apply(AuthStatePatch::new().loading(true).error(None));

        let response = match self.host.request_authorization(&self.scope).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Authorization request failed");
                self.fail_login(&e);
                return Err(e);
            }
        };

        match response.status {
            AuthorizationStatus::Completed => match self.retrieve_token(true).await {
                Ok((token, user)) => {
                    info!(user_id = %user.id, "Login completed");
                    self.settle(AuthMachineInput::LoginSuccess, AuthStatePatch::signed_in(token, user));
                    Ok(LoginOutcome::Authenticated)
                }
                Err(e) => {
                    warn!(error = %e, "Token retrieval after authorization failed");
                    self.fail_login(&e);
                    Err(e)
                }
            },
            AuthorizationStatus::Aborted => {
                info!("Login cancelled by user");
                self.settle(
                    AuthMachineInput::LoginFailed,
                    AuthStatePatch::signed_out().error(Some(CANCELLED_MESSAGE.to_string())),
                );
                Ok(LoginOutcome::Cancelled)
            }
            AuthorizationStatus::Other(status) => {
                warn!(status = %status, "Unrecognized authorization status, staying signed out");
                self.settle(AuthMachineInput::LoginFailed, AuthStatePatch::signed_out());
                Ok(LoginOutcome::Unrecognized(status))
            }
        }
    }

    /// End the session.
    ///
    /// Local state always resets to signed out. A host failure is also
    /// recorded in `error` and returned.
    pub async fn logout(&self) -> AuthResult<()> {
        self.begin(AuthMachineInput::LogoutRequested, "logout")?;
        self.apply(AuthStatePatch::new().loading(true).error(None));

        let result = self.host.deauthorize().await;
        let error = match &result {
            Ok(()) => {
                info!("Logged out");
                None
            }
            Err(e) => {
                warn!(error = %e, "Host de-authorization failed, clearing local session anyway");
                Some(e.to_string())
            }
        };

        self.settle(AuthMachineInput::LogoutComplete, AuthStatePatch::signed_out().error(error));
        result
    }

    /// Best-effort non-forced token fetch. Never fails.
    ///
    /// While authenticated, a newer token replaces the cached
    /// `access_token`.
    pub async fn get_access_token(&self) -> Option<String> {
        let token = match self
            .host
            .get_access_token(&self.token_request(false))
            .await
        {
            Ok(response) => response.and_then(|r| r.usable_token().map(str::to_string)),
            Err(e) => {
                debug!(error = %e, "Token fetch failed");
                return None;
            }
        };

        if let Some(token) = &token {
            let current = self.store.get();
            if current.is_authenticated && current.access_token.as_deref() != Some(token) {
                debug!(token_len = token.len(), "Refreshing cached access token");
                let token = token.clone();
                self.store.update(move |state| {
                    if state.is_authenticated {
                        state.access_token = Some(token);
                    }
                });
            }
        }

        token
    }

    /// Copy of the current state.
    pub fn get_state(&self) -> AuthState {
        self.store.get()
    }

    pub fn current_user(&self) -> Option<UserIdentity> {
        self.store.get().user
    }

    pub fn is_authenticated(&self) -> bool {
        self.store.get().is_authenticated
    }

    /// Current operation phase.
    pub fn phase(&self) -> AuthPhase {
        AuthPhase::from(self.fsm.lock().state())
    }

    /// Observe state changes. The current state is delivered before this
    /// returns.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&AuthState) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    fn token_request(&self, force_refresh: bool) -> AccessTokenRequest {
        AccessTokenRequest {
            scope: self.scope.clone(),
            force_refresh,
        }
    }

    async fn retrieve_token(&self, force_refresh: bool) -> AuthResult<(String, UserIdentity)> {
        let response = self
            .host
            .get_access_token(&self.token_request(force_refresh))
            .await?;

        let token = response
            .as_ref()
            .and_then(|r| r.usable_token())
            .ok_or(AuthError::AuthorizationNotConfigured)?
            .to_string();

        let user = extract_identity(&token);
        Ok((token, user))
    }

    fn fail_login(&self, error: &AuthError) {
        self.settle(
            AuthMachineInput::LoginFailed,
            AuthStatePatch::signed_out().error(Some(error.to_string())),
        );
    }

    fn apply(&self, patch: AuthStatePatch) {
        self.store.update(move |state| patch.apply_to(state));
    }

    /// Enter a busy phase, or fail without touching state if one is
    /// already running.
    fn begin(&self, input: AuthMachineInput, operation: &str) -> AuthResult<()> {
        let mut fsm = self.fsm.lock();
        let phase = AuthPhase::from(fsm.state());
        if phase.is_busy() {
            debug!(operation, phase = %phase, "Rejected overlapping auth operation");
            return Err(AuthError::OperationInFlight(format!(
                "cannot {} while {}",
                operation, phase
            )));
        }

        fsm.consume(&input).map_err(|_| {
            AuthError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                fsm.state()
            ))
        })?;
        Ok(())
    }

    /// Leave the busy phase and publish the settled state. The phase moves
    /// inside the store update, so no listener sees one without the other.
    fn settle(&self, input: AuthMachineInput, patch: AuthStatePatch) {
        self.store.update(|state| {
            let mut fsm = self.fsm.lock();
            let from = AuthPhase::from(fsm.state());
            match fsm.consume(&input) {
                Ok(_) => {
                    debug!(from = %from, to = %AuthPhase::from(fsm.state()), "Auth phase transition")
                }
                Err(_) => warn!(phase = %from, input = ?input, "Unexpected auth phase transition"),
            }
            patch.apply_to(state);
        });
    }
}
