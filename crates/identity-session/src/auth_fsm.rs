//! Session phase state machine using rust-fsm.
//!
//! The controller's `initialize`, `login` and `logout` each drive the
//! machine from a settled phase into a busy phase and back. A second
//! operation that arrives while the machine is busy is rejected before it
//! touches any state.
//!
//! ## State Diagram
//!
//! ```text
//! ┌─────────────────┐
//! │  Uninitialized  │ (initial)
//! └────────┬────────┘
//!          │ SilentCheck
//!          ▼
//! ┌─────────────────┐  NoSession   ┌─────────────────┐
//! │    Checking     │ ───────────► │    SignedOut    │ ◄──────────┐
//! └────────┬────────┘              └────────┬────────┘            │
//!          │ SessionFound                   │ LoginAttempt        │
//!          ▼                                ▼                     │
//! ┌─────────────────┐  LoginSuccess ┌─────────────────┐ LoginFailed
//! │    SignedIn     │ ◄──────────── │   Authorizing   │ ───────────┤
//! └────────┬────────┘               └─────────────────┘            │
//!          │ LogoutRequested                                       │
//!          ▼                                                       │
//! ┌─────────────────┐  LogoutComplete                               │
//! │   SigningOut    │ ──────────────────────────────────────────────┘
//! └─────────────────┘
//! ```
//!
//! Every settled phase (`Uninitialized`, `SignedOut`, `SignedIn`) accepts
//! `SilentCheck`, `LoginAttempt` and `LogoutRequested`.

use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub auth_machine(Uninitialized)

    Uninitialized => {
        SilentCheck => Checking,
        LoginAttempt => Authorizing,
        LogoutRequested => SigningOut
    },
    Checking => {
        SessionFound => SignedIn,
        NoSession => SignedOut
    },
    SignedOut => {
        SilentCheck => Checking,
        LoginAttempt => Authorizing,
        LogoutRequested => SigningOut
    },
    SignedIn => {
        SilentCheck => Checking,
        LoginAttempt => Authorizing,
        LogoutRequested => SigningOut
    },
    Authorizing => {
        LoginSuccess => SignedIn,
        LoginFailed => SignedOut
    },
    SigningOut => {
        LogoutComplete => SignedOut
    }
}

pub use auth_machine::Input as AuthMachineInput;
pub use auth_machine::State as AuthMachineState;
pub use auth_machine::StateMachine as AuthMachine;

/// Operation phase of the auth session, for logging and inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthPhase {
    /// Constructed, `initialize` not yet called.
    Uninitialized,
    /// Silent token check in progress.
    Checking,
    /// No session.
    SignedOut,
    /// Interactive authorization in progress.
    Authorizing,
    /// Session established.
    SignedIn,
    /// De-authorization in progress.
    SigningOut,
}

impl AuthPhase {
    /// Returns true while an operation is running.
    pub fn is_busy(&self) -> bool {
        matches!(
            self,
            AuthPhase::Checking | AuthPhase::Authorizing | AuthPhase::SigningOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AuthPhase::Uninitialized => "uninitialized",
            AuthPhase::Checking => "checking",
            AuthPhase::SignedOut => "signed_out",
            AuthPhase::Authorizing => "authorizing",
            AuthPhase::SignedIn => "signed_in",
            AuthPhase::SigningOut => "signing_out",
        }
    }
}

impl std::fmt::Display for AuthPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&AuthMachineState> for AuthPhase {
    fn from(state: &AuthMachineState) -> Self {
        match state {
            AuthMachineState::Uninitialized => AuthPhase::Uninitialized,
            AuthMachineState::Checking => AuthPhase::Checking,
            AuthMachineState::SignedOut => AuthPhase::SignedOut,
            AuthMachineState::Authorizing => AuthPhase::Authorizing,
            AuthMachineState::SignedIn => AuthPhase::SignedIn,
            AuthMachineState::SigningOut => AuthPhase::SigningOut,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_uninitialized() {
        let machine = AuthMachine::new();
        assert_eq!(*machine.state(), AuthMachineState::Uninitialized);
        assert!(!AuthPhase::from(machine.state()).is_busy());
    }

    #[test]
    fn test_silent_check_flows() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::SilentCheck).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::Checking);
        machine.consume(&AuthMachineInput::SessionFound).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedIn);

        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::SilentCheck).unwrap();
        machine.consume(&AuthMachineInput::NoSession).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedOut);
    }

    #[test]
    fn test_login_flow() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::SilentCheck).unwrap();
        machine.consume(&AuthMachineInput::NoSession).unwrap();

        machine.consume(&AuthMachineInput::LoginAttempt).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::Authorizing);

        machine.consume(&AuthMachineInput::LoginSuccess).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedIn);
    }

    #[test]
    fn test_failed_login_from_signed_in_ends_signed_out() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::LoginAttempt).unwrap();
        machine.consume(&AuthMachineInput::LoginSuccess).unwrap();

        machine.consume(&AuthMachineInput::LoginAttempt).unwrap();
        machine.consume(&AuthMachineInput::LoginFailed).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedOut);
    }

    #[test]
    fn test_logout_flow() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::LoginAttempt).unwrap();
        machine.consume(&AuthMachineInput::LoginSuccess).unwrap();

        machine.consume(&AuthMachineInput::LogoutRequested).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SigningOut);

        machine.consume(&AuthMachineInput::LogoutComplete).unwrap();
        assert_eq!(*machine.state(), AuthMachineState::SignedOut);
    }

    #[test]
    fn test_busy_phases_reject_new_operations() {
        let mut machine = AuthMachine::new();
        machine.consume(&AuthMachineInput::LoginAttempt).unwrap();

        assert!(machine.consume(&AuthMachineInput::LoginAttempt).is_err());
        assert!(machine.consume(&AuthMachineInput::SilentCheck).is_err());
        assert!(machine.consume(&AuthMachineInput::LogoutRequested).is_err());
        assert_eq!(*machine.state(), AuthMachineState::Authorizing);
    }

    #[test]
    fn test_cannot_complete_without_starting() {
        let mut machine = AuthMachine::new();
        assert!(machine.consume(&AuthMachineInput::LoginSuccess).is_err());
        assert!(machine.consume(&AuthMachineInput::SessionFound).is_err());
        assert!(machine.consume(&AuthMachineInput::LogoutComplete).is_err());
    }

    #[test]
    fn test_phase_conversion_and_busy_flags() {
        assert_eq!(
            AuthPhase::from(&AuthMachineState::Checking),
            AuthPhase::Checking
        );
        assert!(AuthPhase::Checking.is_busy());
        assert!(AuthPhase::Authorizing.is_busy());
        assert!(AuthPhase::SigningOut.is_busy());
        assert!(!AuthPhase::SignedIn.is_busy());
        assert!(!AuthPhase::SignedOut.is_busy());
        assert_eq!(AuthPhase::SigningOut.to_string(), "signing_out");
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        let json = serde_json::to_string(&AuthPhase::SignedIn).unwrap();
        assert_eq!(json, "\"signed_in\"");
    }
}
