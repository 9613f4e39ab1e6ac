//! Session state machine using rust-fsm.
//!
//! The phase graph is declared with `state_machine!`; [`SessionState`] carries
//! the data that travels with a phase (identity, error message). All state
//! changes go through the pure [`transition`] function.
//!
//! ## State Diagram
//!
//! ```text
//!                 SessionRestored
//! ┌─────────────────┐ ───────────────────────────────► ┌─────────────────┐
//! │ Unauthenticated │                                  │  Authenticated  │
//! └────────┬────────┘ ◄─────────────────────────────── └────────┬────────┘
//!          │          LoggedOut / RefreshFailed / NoSession     │
//!          │ AuthAttempt                                        │ RefreshSucceeded
//!          ▼                                                    │ (self loop)
//! ┌─────────────────┐          AuthSucceeded                    │
//! │ Authenticating  │ ──────────────────────────────────────────┘
//! └────────┬────────┘
//!          │ AuthRejected
//!          ▼
//! ┌─────────────────┐  ErrorAcknowledged
//! │      Error      │ ─────────────────► Unauthenticated
//! └─────────────────┘
//! ```
//!
//! `AuthAttempt`, `LoggedOut` and `RefreshFailed` are accepted in every phase.

use crate::error::SessionError;
use rust_fsm::*;
use serde::{Deserialize, Serialize};

state_machine! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub session_machine(Unauthenticated)

    Unauthenticated => {
        AuthAttempt => Authenticating,
        SessionRestored => Authenticated,
        NoSession => Unauthenticated,
        LoggedOut => Unauthenticated,
        RefreshFailed => Unauthenticated
    },
    Authenticating => {
        AuthAttempt => Authenticating,
        AuthSucceeded => Authenticated,
        AuthRejected => Error,
        LoggedOut => Unauthenticated,
        RefreshFailed => Unauthenticated
    },
    Authenticated => {
        AuthAttempt => Authenticating,
        AuthSucceeded => Authenticated,
        RefreshSucceeded => Authenticated,
        SessionRestored => Authenticated,
        NoSession => Unauthenticated,
        LoggedOut => Unauthenticated,
        RefreshFailed => Unauthenticated
    },
    Error => {
        AuthAttempt => Authenticating,
        ErrorAcknowledged => Unauthenticated,
        SessionRestored => Authenticated,
        NoSession => Unauthenticated,
        LoggedOut => Unauthenticated,
        RefreshFailed => Unauthenticated
    }
}

pub use session_machine::Input as SessionMachineInput;
pub use session_machine::State as SessionMachineState;
pub use session_machine::StateMachine as SessionMachine;

/// Externally visible session phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Unauthenticated,
    Authenticating,
    Authenticated,
    Error,
}

impl SessionPhase {
    pub fn is_authenticated(&self) -> bool {
        matches!(self, SessionPhase::Authenticated)
    }
}

impl From<SessionMachineState> for SessionPhase {
    fn from(state: SessionMachineState) -> Self {
        match state {
            SessionMachineState::Unauthenticated => SessionPhase::Unauthenticated,
            SessionMachineState::Authenticating => SessionPhase::Authenticating,
            SessionMachineState::Authenticated => SessionPhase::Authenticated,
            SessionMachineState::Error => SessionPhase::Error,
        }
    }
}

impl From<SessionPhase> for SessionMachineState {
    fn from(phase: SessionPhase) -> Self {
        match phase {
            SessionPhase::Unauthenticated => SessionMachineState::Unauthenticated,
            SessionPhase::Authenticating => SessionMachineState::Authenticating,
            SessionPhase::Authenticated => SessionMachineState::Authenticated,
            SessionPhase::Error => SessionMachineState::Error,
        }
    }
}

/// The logged-in user as shown to the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub email: String,
    pub display_name: String,
}

impl Identity {
    /// Identity for an email; the display name is its local part.
    pub fn from_email(email: impl Into<String>) -> Self {
        let email = email.into();
        let display_name = match email.split_once('@') {
            Some((local, _)) if !local.is_empty() => local.to_string(),
            _ => email.clone(),
        };
        Self {
            email,
            display_name,
        }
    }
}

/// Inputs to the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    AuthAttempt,
    AuthSucceeded { identity: Identity },
    AuthRejected { message: String },
    ErrorAcknowledged,
    SessionRestored { identity: Option<Identity> },
    NoSession,
    RefreshSucceeded,
    RefreshFailed,
    LoggedOut,
}

impl SessionEvent {
    fn machine_input(&self) -> SessionMachineInput {
        match self {
            SessionEvent::AuthAttempt => SessionMachineInput::AuthAttempt,
            SessionEvent::AuthSucceeded { .. } => SessionMachineInput::AuthSucceeded,
            SessionEvent::AuthRejected { .. } => SessionMachineInput::AuthRejected,
            SessionEvent::ErrorAcknowledged => SessionMachineInput::ErrorAcknowledged,
            SessionEvent::SessionRestored { .. } => SessionMachineInput::SessionRestored,
            SessionEvent::NoSession => SessionMachineInput::NoSession,
            SessionEvent::RefreshSucceeded => SessionMachineInput::RefreshSucceeded,
            SessionEvent::RefreshFailed => SessionMachineInput::RefreshFailed,
            SessionEvent::LoggedOut => SessionMachineInput::LoggedOut,
        }
    }
}

/// Observable session state.
///
/// `identity` is only set while authenticated; `error_message` only in the
/// error phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub phase: SessionPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<Identity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::unauthenticated()
    }
}

impl SessionState {
    pub fn unauthenticated() -> Self {
        Self {
            phase: SessionPhase::Unauthenticated,
            identity: None,
            error_message: None,
        }
    }

    pub fn authenticated(identity: Option<Identity>) -> Self {
        Self {
            phase: SessionPhase::Authenticated,
            identity,
            error_message: None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase.is_authenticated()
    }
}

/// Apply `event` to `state`.
///
/// Fails with `InvalidStateTransition` when the phase graph has no edge for
/// the event; the caller keeps the old state.
pub fn transition(state: &SessionState, event: &SessionEvent) -> Result<SessionState, SessionError> {
    let input = event.machine_input();
    let next = <session_machine::Impl as StateMachineImpl>::transition(
        &SessionMachineState::from(state.phase),
        &input,
    )
    .ok_or_else(|| {
        SessionError::InvalidStateTransition(format!(
            "Cannot apply {:?} in phase {:?}",
            input, state.phase
        ))
    })?;
    let phase = SessionPhase::from(next);

    let next_state = match event {
        SessionEvent::AuthSucceeded { identity } => SessionState::authenticated(Some(identity.clone())),
        SessionEvent::SessionRestored { identity } => SessionState::authenticated(identity.clone()),
        SessionEvent::AuthRejected { message } => SessionState {
            phase,
            identity: None,
            error_message: Some(message.clone()),
        },
        SessionEvent::RefreshSucceeded => state.clone(),
        SessionEvent::AuthAttempt
        | SessionEvent::ErrorAcknowledged
        | SessionEvent::NoSession
        | SessionEvent::RefreshFailed
        | SessionEvent::LoggedOut => SessionState {
            phase,
            identity: None,
            error_message: None,
        },
    };

    Ok(next_state)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity::from_email("ana@example.com")
    }

    fn apply(state: &SessionState, event: SessionEvent) -> SessionState {
        transition(state, &event).unwrap()
    }

    #[test]
    fn test_initial_machine_state_is_unauthenticated() {
        let machine = SessionMachine::new();
        assert_eq!(*machine.state(), SessionMachineState::Unauthenticated);
        assert_eq!(SessionState::default().phase, SessionPhase::Unauthenticated);
    }

    #[test]
    fn test_login_flow() {
        let state = apply(&SessionState::default(), SessionEvent::AuthAttempt);
        assert_eq!(state.phase, SessionPhase::Authenticating);

        let state = apply(
            &state,
            SessionEvent::AuthSucceeded {
                identity: identity(),
            },
        );
        assert_eq!(state.phase, SessionPhase::Authenticated);
        assert_eq!(state.identity.unwrap().email, "ana@example.com");
    }

    #[test]
    fn test_rejected_login_goes_to_error_then_acknowledged() {
        let state = apply(&SessionState::default(), SessionEvent::AuthAttempt);
        let state = apply(
            &state,
            SessionEvent::AuthRejected {
                message: "Invalid credentials".to_string(),
            },
        );
        assert_eq!(state.phase, SessionPhase::Error);
        assert_eq!(state.error_message.as_deref(), Some("Invalid credentials"));
        assert!(state.identity.is_none());

        let state = apply(&state, SessionEvent::ErrorAcknowledged);
        assert_eq!(state, SessionState::unauthenticated());
    }

    #[test]
    fn test_new_attempt_clears_error() {
        let state = SessionState {
            phase: SessionPhase::Error,
            identity: None,
            error_message: Some("boom".to_string()),
        };
        let state = apply(&state, SessionEvent::AuthAttempt);
        assert_eq!(state.phase, SessionPhase::Authenticating);
        assert!(state.error_message.is_none());
    }

    #[test]
    fn test_logout_and_refresh_failure_accepted_everywhere() {
        let phases = [
            SessionState::unauthenticated(),
            SessionState {
                phase: SessionPhase::Authenticating,
                identity: None,
                error_message: None,
            },
            SessionState::authenticated(Some(identity())),
            SessionState {
                phase: SessionPhase::Error,
                identity: None,
                error_message: Some("x".to_string()),
            },
        ];

        for state in &phases {
            for event in [SessionEvent::LoggedOut, SessionEvent::RefreshFailed] {
                let next = apply(state, event);
                assert_eq!(next, SessionState::unauthenticated());
            }
        }
    }

    #[test]
    fn test_refresh_success_keeps_identity() {
        let state = SessionState::authenticated(Some(identity()));
        let next = apply(&state, SessionEvent::RefreshSucceeded);
        assert_eq!(next, state);
    }

    #[test]
    fn test_refresh_success_cannot_resurrect_session() {
        let result = transition(&SessionState::unauthenticated(), &SessionEvent::RefreshSucceeded);
        assert!(matches!(
            result,
            Err(SessionError::InvalidStateTransition(_))
        ));
    }

    #[test]
    fn test_auth_success_requires_attempt() {
        let result = transition(
            &SessionState::unauthenticated(),
            &SessionEvent::AuthSucceeded {
                identity: identity(),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_overlapping_logins_last_identity_wins() {
        let other = Identity::from_email("bo@example.com");
        let state = SessionState::authenticated(Some(identity()));
        let next = apply(
            &state,
            SessionEvent::AuthSucceeded {
                identity: other.clone(),
            },
        );
        assert!(next.is_authenticated());
        assert_eq!(next.identity, Some(other));
    }

    #[test]
    fn test_restore_from_startup() {
        let state = apply(
            &SessionState::unauthenticated(),
            SessionEvent::SessionRestored {
                identity: Some(identity()),
            },
        );
        assert!(state.is_authenticated());

        let state = apply(&state, SessionEvent::NoSession);
        assert_eq!(state.phase, SessionPhase::Unauthenticated);
    }

    #[test]
    fn test_identity_display_name() {
        assert_eq!(identity().display_name, "ana");
        assert_eq!(Identity::from_email("@example.com").display_name, "@example.com");
        assert_eq!(Identity::from_email("ana").display_name, "ana");
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        let json = serde_json::to_string(&SessionPhase::Unauthenticated).unwrap();
        assert_eq!(json, "\"unauthenticated\"");
    }
}
