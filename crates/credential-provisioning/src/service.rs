//! Credential provisioning service.
//!
//! A second state machine that sits behind the platform session: it is
//! armed when the user signs in and reset when they sign out. Its state is
//! published through the same observable store the session controller
//! uses.

use crate::backend::{ClientCredentials, CredentialBackend, DownstreamCredential};
use crate::{ProvisioningError, ProvisioningResult};
use identity_session::{StateStore, Subscription};
use parking_lot::Mutex;
use rust_fsm::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub credential_machine(Uninitialized)

    Uninitialized => {
        Initialize => Initializing
    },
    Initializing => {
        InitSucceeded => Ready,
        InitFailed => Failed,
        Reset => Uninitialized
    },
    Ready => {
        Reset => Uninitialized
    },
    Failed => {
        Initialize => Initializing,
        Reset => Uninitialized
    }
}

pub use credential_machine::Input as CredentialMachineInput;
pub use credential_machine::State as CredentialMachineState;
pub use credential_machine::StateMachine as CredentialMachine;

/// Provisioning phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialPhase {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

impl From<&CredentialMachineState> for CredentialPhase {
    fn from(state: &CredentialMachineState) -> Self {
        match state {
            CredentialMachineState::Uninitialized => CredentialPhase::Uninitialized,
            CredentialMachineState::Initializing => CredentialPhase::Initializing,
            CredentialMachineState::Ready => CredentialPhase::Ready,
            CredentialMachineState::Failed => CredentialPhase::Failed,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthStatus {
    pub has_valid_token: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    pub auth_status: AuthStatus,
}

/// Observable snapshot of the provisioning state.
///
/// At most one of `is_ready` / `is_initializing` is set; `error` only when
/// neither is.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialState {
    pub is_ready: bool,
    pub is_initializing: bool,
    pub error: Option<String>,
    pub status: CredentialStatus,
}

impl CredentialState {
    fn initializing() -> Self {
        Self {
            is_initializing: true,
            ..Self::default()
        }
    }

    fn ready(has_valid_token: bool) -> Self {
        Self {
            is_ready: true,
            status: CredentialStatus {
                auth_status: AuthStatus { has_valid_token },
            },
            ..Self::default()
        }
    }

    fn failed(message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::default()
        }
    }
}

type EnvLookup = dyn Fn(&str) -> Option<String> + Send + Sync;

struct Inner {
    fsm: CredentialMachine,
    /// Bumped by `reset()`; a completion carrying an older epoch is stale.
    epoch: u64,
    credential: Option<DownstreamCredential>,
}

/// Provisions downstream API credentials from the environment.
pub struct ProvisioningService {
    backend: Arc<dyn CredentialBackend>,
    env: Arc<EnvLookup>,
    store: StateStore<CredentialState>,
    inner: Mutex<Inner>,
}

impl ProvisioningService {
    /// Service reading client credentials from the process environment.
    pub fn new(backend: Arc<dyn CredentialBackend>) -> Self {
        Self::with_env_lookup(backend, |name| std::env::var(name).ok())
    }

    /// Service reading client credentials through `lookup`.
    pub fn with_env_lookup<F>(backend: Arc<dyn CredentialBackend>, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + Send + Sync + 'static,
    {
        Self {
            backend,
            env: Arc::new(lookup),
            store: StateStore::new(CredentialState::default()),
            inner: Mutex::new(Inner {
                fsm: CredentialMachine::new(),
                epoch: 0,
                credential: None,
            }),
        }
    }

    /// Read the client credentials and ask the backend for a downstream
    /// token.
    ///
    /// No-op while `Ready` or while another initialization is running.
    /// Failures move the service to `Failed` and are returned.
    pub async fn initialize_from_env(&self) -> ProvisioningResult<()> {
        let epoch = {
            let mut inner = self.inner.lock();
            match CredentialPhase::from(inner.fsm.state()) {
                CredentialPhase::Ready => {
                    debug!("Credentials already provisioned");
                    return Ok(());
                }
                CredentialPhase::Initializing => {
                    debug!("Credential provisioning already in flight");
                    return Ok(());
                }
                CredentialPhase::Uninitialized | CredentialPhase::Failed => {}
            }
            Self::transition(&mut inner, CredentialMachineInput::Initialize)?;
            inner.epoch
        };
        self.publish(epoch, CredentialState::initializing());

        let result = match ClientCredentials::from_lookup(&*self.env) {
            Ok(credentials) => self.backend.fetch_credentials(&credentials).await,
            Err(e) => Err(e),
        };

        let outcome = {
            let mut inner = self.inner.lock();
            if inner.epoch != epoch {
                info!("Discarding credential result from before reset");
                return Ok(());
            }

            match result {
                Ok(credential) => {
                    Self::transition(&mut inner, CredentialMachineInput::InitSucceeded)?;
                    let has_valid_token = credential.has_valid_token();
                    inner.credential = Some(credential);
                    Ok(has_valid_token)
                }
                Err(e) => {
                    Self::transition(&mut inner, CredentialMachineInput::InitFailed)?;
                    Err(e)
                }
            }
        };

        match outcome {
            Ok(has_valid_token) => {
                info!(has_valid_token, "Downstream credentials ready");
                self.publish(epoch, CredentialState::ready(has_valid_token));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, transient = e.is_transient(), "Credential provisioning failed");
                self.publish(epoch, CredentialState::failed(e.to_string()));
                Err(e)
            }
        }
    }

    /// Re-run [`initialize_from_env`](Self::initialize_from_env).
    pub async fn retry(&self) -> ProvisioningResult<()> {
        debug!(phase = ?self.phase(), "Retrying credential provisioning");
        self.initialize_from_env().await
    }

    /// Drop any downstream credential and return to `Uninitialized`.
    pub fn reset(&self) {
        {
            let mut inner = self.inner.lock();
            inner.epoch += 1;
            inner.credential = None;
            if CredentialPhase::from(inner.fsm.state()) != CredentialPhase::Uninitialized {
                if let Err(e) = Self::transition(&mut inner, CredentialMachineInput::Reset) {
                    warn!(error = %e, "Credential reset transition failed");
                }
            }
        }

        if self.store.get() != CredentialState::default() {
            info!("Credential state reset");
            self.store.replace(CredentialState::default());
        }
    }

    /// Copy of the current state.
    pub fn state(&self) -> CredentialState {
        self.store.get()
    }

    pub fn phase(&self) -> CredentialPhase {
        CredentialPhase::from(self.inner.lock().fsm.state())
    }

    /// Current downstream bearer token, while ready and unexpired.
    pub fn access_token(&self) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .credential
            .as_ref()
            .filter(|credential| credential.has_valid_token())
            .map(|credential| credential.access_token.clone())
    }

    /// Observe state changes. The current state is delivered before this
    /// returns.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&CredentialState) + Send + Sync + 'static,
    {
        self.store.subscribe(listener)
    }

    fn transition(inner: &mut Inner, input: CredentialMachineInput) -> ProvisioningResult<()> {
        inner.fsm.consume(&input).map_err(|_| {
            ProvisioningError::InvalidStateTransition(format!(
                "Cannot apply {:?} in state {:?}",
                input,
                inner.fsm.state()
            ))
        })?;
        Ok(())
    }

    /// Publish `next` unless a reset happened since `epoch`.
    fn publish(&self, epoch: u64, next: CredentialState) {
        if self.inner.lock().epoch != epoch {
            return;
        }
        self.store.update(|state| {
            if self.inner.lock().epoch == epoch {
                *state = next;
            }
        });
    }
}
