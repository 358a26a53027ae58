//! Downstream credential provisioning.
//!
//! This crate provides:
//! - The provisioning service state machine (uninitialized, initializing,
//!   ready, failed), observable through the shared state store
//! - The credential backend seam and its HTTP client-credentials
//!   implementation

mod backend;
mod error;
mod service;

pub use backend::{ClientCredentials, CredentialBackend, DownstreamCredential, HttpCredentialBackend};
pub use error::{ProvisioningError, ProvisioningResult};
pub use service::{
    credential_machine, AuthStatus, CredentialMachine, CredentialMachineInput,
    CredentialMachineState, CredentialPhase, CredentialState, CredentialStatus,
    ProvisioningService,
};
