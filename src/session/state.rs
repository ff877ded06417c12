//! Session states, snapshots, and the events emitted on each transition.

use serde::Serialize;

use super::credentials::{Credentials, User};

#[derive(Debug, Clone, PartialEq)]
pub enum SessionState {
    /// No credentials stored.
    Anonymous,
    /// Credentials stored, identity lookup in flight.
    Authenticating { credentials: Credentials },
    /// Credentials stored and identity resolved.
    Authenticated { credentials: Credentials, user: User },
    /// Credentials stored but the identity lookup failed or never completed.
    Invalid {
        credentials: Credentials,
        reason: String,
    },
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Anonymous => SessionPhase::Anonymous,
            SessionState::Authenticating { .. } => SessionPhase::Authenticating,
            SessionState::Authenticated { .. } => SessionPhase::Authenticated,
            SessionState::Invalid { .. } => SessionPhase::Invalid,
        }
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        match self {
            SessionState::Anonymous => None,
            SessionState::Authenticating { credentials }
            | SessionState::Authenticated { credentials, .. }
            | SessionState::Invalid { credentials, .. } => Some(credentials),
        }
    }

    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated { user, .. } => Some(user),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    Anonymous,
    Authenticating,
    Authenticated,
    Invalid,
}

/// What observers see after every transition. Never carries the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub identifier: Option<String>,
    pub username: Option<String>,
    pub epoch: u64,
}

impl SessionSnapshot {
    pub fn of(state: &SessionState, epoch: u64) -> Self {
        Self {
            phase: state.phase(),
            identifier: state.credentials().map(|c| c.identifier.clone()),
            username: state.user().map(|u| u.username.clone()),
            epoch,
        }
    }
}

/// Events emitted by the session store, for logging only.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    Rehydrated { phase: SessionPhase },
    LoginStarted { identifier: String, is_email: bool },
    LoginSucceeded { username: String },
    LoginFailed { identifier: String, reason: String },
    UserRefreshed { username: String },
    LoggedOut,
    /// Forced logout after a dependent request failed.
    SessionInvalidated { reason: String },
}
