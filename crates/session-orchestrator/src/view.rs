//! Screen selection derived from the two session stores.
//!
//! Rendering layers match on [`ViewPhase`] and never inspect the raw
//! states themselves.

use credential_provisioning::CredentialState;
use identity_session::AuthState;
use serde::Serialize;
use session_config_and_utils::{CLIENT_ID_ENV, CLIENT_SECRET_ENV};

/// Name used in the greeting when the identity has no display name.
pub const FALLBACK_DISPLAY_NAME: &str = "Agent";

/// Which screen to show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum ViewPhase {
    /// Silent check or login in progress.
    CheckingAuthentication,
    /// Not signed in and no login has been attempted yet.
    Connecting,
    /// An automatic login ran and the session is still absent; the host
    /// app most likely has no OAuth registration.
    ConfigurationRequired,
    SignedIn {
        greeting: String,
        credentials: CredentialView,
    },
}

/// Downstream credential panel shown inside the signed-in screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CredentialView {
    Ready {
        status_label: &'static str,
    },
    Connecting,
    SetupRequired {
        error: Option<String>,
        required_env_vars: Vec<&'static str>,
    },
}

impl ViewPhase {
    pub fn is_signed_in(&self) -> bool {
        matches!(self, ViewPhase::SignedIn { .. })
    }
}

/// Select the screen for the given snapshots.
pub fn derive_view(
    auth: &AuthState,
    credentials: &CredentialState,
    login_attempted: bool,
) -> ViewPhase {
    if !auth.loading && !auth.is_authenticated && login_attempted {
        return ViewPhase::ConfigurationRequired;
    }
    if auth.loading {
        return ViewPhase::CheckingAuthentication;
    }
    if !auth.is_authenticated {
        return ViewPhase::Connecting;
    }

    let name = auth
        .user
        .as_ref()
        .map(|user| user.display_name.as_str())
        .filter(|name| !name.is_empty())
        .unwrap_or(FALLBACK_DISPLAY_NAME);

    ViewPhase::SignedIn {
        greeting: format!("Hi {}", name),
        credentials: credential_view(credentials),
    }
}

fn credential_view(credentials: &CredentialState) -> CredentialView {
    if credentials.is_ready {
        let status_label = if credentials.status.auth_status.has_valid_token {
            "Connected"
        } else {
            "Configured"
        };
        CredentialView::Ready { status_label }
    } else if credentials.is_initializing {
        CredentialView::Connecting
    } else {
        CredentialView::SetupRequired {
            error: credentials.error.clone(),
            required_env_vars: vec![CLIENT_ID_ENV, CLIENT_SECRET_ENV],
        }
    }
}
