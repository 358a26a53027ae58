//! Session orchestration for the agency apps.
//!
//! This crate provides:
//! - The orchestrator that provisions downstream credentials when the
//!   platform session signs in and resets them when it signs out
//! - View-model derivation from both session stores
//! - A bearer-token client for the downstream business API

mod api_client;
mod error;
mod orchestrator;
mod view;

pub use api_client::{ApiError, ApiResult, BearerApiClient};
pub use error::{OrchestratorError, OrchestratorResult};
pub use orchestrator::{plan_reactions, Reaction, ReactionTracker, SessionOrchestrator};
pub use view::{derive_view, CredentialView, ViewPhase, FALLBACK_DISPLAY_NAME};
