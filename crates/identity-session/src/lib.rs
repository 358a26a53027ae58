//! Platform identity session for the agency apps.
//!
//! This crate provides:
//! - An observable, shallow-merge state store with re-entrancy safe fan-out
//! - The auth session controller driving the host OAuth primitive
//! - An explicit FSM guarding overlapping initialize/login/logout calls
//! - Display-only JWT claim extraction

mod auth_fsm;
mod claims;
mod controller;
mod error;
mod host;
mod store;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use auth_fsm::auth_machine;
pub use auth_fsm::{AuthMachine, AuthMachineInput, AuthMachineState, AuthPhase};
pub use claims::{extract_identity, UserIdentity};
pub use controller::{
    AuthSessionController, AuthState, AuthStatePatch, LoginOutcome, CANCELLED_MESSAGE,
};
pub use error::{AuthError, AuthResult};
pub use host::{
    default_scope, AccessTokenRequest, AccessTokenResponse, AuthorizationResponse,
    AuthorizationStatus, HostOAuth, Scope,
};
pub use store::{StateStore, Subscription, SubscriptionId};
