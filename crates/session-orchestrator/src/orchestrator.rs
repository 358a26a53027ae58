//! Causal wiring between the platform session and credential provisioning.
//!
//! The orchestrator subscribes to the auth store and queues every snapshot.
//! Processing a snapshot runs [`plan_reactions`], a pure function of the
//! previous snapshot and the auto-login latch, and then performs the
//! planned reactions in order:
//!
//! - signing in provisions downstream credentials,
//! - signing out resets them,
//! - a settled signed-out state triggers one automatic login.
//!
//! Reactions run outside the store's notification callback, so they are
//! free to call back into the controller.

use crate::api_client::BearerApiClient;
use crate::view::{derive_view, ViewPhase};
use crate::{OrchestratorError, OrchestratorResult};
use credential_provisioning::ProvisioningService;
use identity_session::{AuthError, AuthSessionController, AuthState, LoginOutcome, Subscription};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Side effect requested by an auth snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reaction {
    ProvisionCredentials,
    ResetCredentials,
    Login,
}

/// What [`plan_reactions`] remembers between snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionTracker {
    pub was_authenticated: bool,
    pub login_attempted: bool,
}

/// Decide the reactions to `state`, updating `tracker`.
pub fn plan_reactions(
    tracker: &mut ReactionTracker,
    state: &AuthState,
    auto_login: bool,
) -> Vec<Reaction> {
    let mut reactions = Vec::new();

    match (tracker.was_authenticated, state.is_authenticated) {
        (false, true) => {
            reactions.push(Reaction::ProvisionCredentials);
            tracker.login_attempted = false;
        }
        (true, false) => reactions.push(Reaction::ResetCredentials),
        _ => {}
    }
    tracker.was_authenticated = state.is_authenticated;

    if auto_login && !state.loading && !state.is_authenticated && !tracker.login_attempted {
        tracker.login_attempted = true;
        reactions.push(Reaction::Login);
    }

    reactions
}

/// Owns the wiring between one auth controller and one provisioning
/// service.
pub struct SessionOrchestrator {
    auth: Arc<AuthSessionController>,
    credentials: Arc<ProvisioningService>,
    auto_login: bool,
    tracker: Mutex<ReactionTracker>,
    receiver: tokio::sync::Mutex<mpsc::UnboundedReceiver<AuthState>>,
    _subscription: Subscription,
}

impl SessionOrchestrator {
    /// Subscribe to `auth`. The current auth state is queued immediately.
    pub fn new(
        auth: Arc<AuthSessionController>,
        credentials: Arc<ProvisioningService>,
        auto_login: bool,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = auth.subscribe(move |state| {
            if sender.send(state.clone()).is_err() {
                debug!("Orchestrator queue closed, dropping auth snapshot");
            }
        });

        Self {
            auth,
            credentials,
            auto_login,
            tracker: Mutex::new(ReactionTracker::default()),
            receiver: tokio::sync::Mutex::new(receiver),
            _subscription: subscription,
        }
    }

    pub fn auth(&self) -> &Arc<AuthSessionController> {
        &self.auth
    }

    pub fn credentials(&self) -> &Arc<ProvisioningService> {
        &self.credentials
    }

    /// Initialize the auth session and process everything that follows
    /// from it.
    pub async fn start(&self) -> OrchestratorResult<()> {
        info!(auto_login = self.auto_login, "Starting session orchestrator");
        self.auth.initialize().await?;
        self.pump().await;
        Ok(())
    }

    /// Process queued snapshots until the queue is empty. Returns the
    /// number processed.
    ///
    /// Returns 0 without waiting when [`run`](Self::run) owns the queue.
    pub async fn pump(&self) -> usize {
        let mut receiver = match self.receiver.try_lock() {
            Ok(receiver) => receiver,
            Err(_) => {
                debug!("Snapshot queue is being drained elsewhere");
                return 0;
            }
        };

        let mut processed = 0;
        while let Ok(state) = receiver.try_recv() {
            self.process(&state).await;
            processed += 1;
        }
        processed
    }

    /// Process snapshots as they arrive. Does not return while the auth
    /// subscription is live; drop the future to stop.
    pub async fn run(&self) {
        let mut receiver = self.receiver.lock().await;
        while let Some(state) = receiver.recv().await {
            self.process(&state).await;
        }
    }

    /// Log in explicitly. Counts as the automatic attempt.
    pub async fn login(&self) -> OrchestratorResult<LoginOutcome> {
        self.tracker.lock().login_attempted = true;
        let result = self.auth.login().await;
        self.pump().await;
        Ok(result?)
    }

    /// Log out and drop downstream credentials, even when the host
    /// de-authorization fails. A logout rejected because another auth
    /// operation is running leaves the credentials alone.
    pub async fn logout(&self) -> OrchestratorResult<()> {
        let result = self.auth.logout().await;
        match &result {
            Err(AuthError::OperationInFlight(reason)) => {
                debug!(reason = %reason, "Logout rejected, keeping downstream credentials");
            }
            _ => self.credentials.reset(),
        }
        self.pump().await;
        Ok(result?)
    }

    pub async fn retry_credentials(&self) -> OrchestratorResult<()> {
        self.credentials.retry().await?;
        Ok(())
    }

    /// Screen for the current snapshots.
    pub fn view(&self) -> ViewPhase {
        let login_attempted = self.tracker.lock().login_attempted;
        derive_view(
            &self.auth.get_state(),
            &self.credentials.state(),
            login_attempted,
        )
    }

    /// GET `path` from the downstream API with the provisioned token.
    pub async fn fetch_json<T: DeserializeOwned>(
        &self,
        client: &BearerApiClient,
        path: &str,
    ) -> OrchestratorResult<T> {
        let token = self
            .credentials
            .access_token()
            .ok_or(OrchestratorError::CredentialsNotReady)?;
        Ok(client.get_json(path, &token).await?)
    }

    async fn process(&self, state: &AuthState) {
        let reactions = {
            let mut tracker = self.tracker.lock();
            plan_reactions(&mut tracker, state, self.auto_login)
        };

        for reaction in reactions {
            debug!(reaction = ?reaction, "Applying session reaction");
            match reaction {
                Reaction::ProvisionCredentials => {
                    if let Err(e) = self.credentials.initialize_from_env().await {
                        warn!(error = %e, "Downstream credential provisioning failed");
                    }
                }
                Reaction::ResetCredentials => self.credentials.reset(),
                Reaction::Login => {
                    info!("No session, starting automatic login");
                    match self.auth.login().await {
                        Ok(outcome) => debug!(outcome = ?outcome, "Automatic login finished"),
                        Err(e) => warn!(error = %e, "Automatic login failed"),
                    }
                }
            }
        }
    }
}
