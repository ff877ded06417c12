//! Error taxonomy shared by every client operation.
//!
//! Each variant corresponds to a distinct way a failure is surfaced to the
//! user: a generic failure message, a login failure, a forced logout with its
//! own notification, an inline form error, or an inline row/form error for
//! mutations. Nothing in the library panics on a backend or storage failure;
//! it converts the failure into one of these.

use std::fmt::{Display, Formatter};

/// Notification shown when an authenticated fetch tears the session down.
pub const SESSION_EXPIRED_NOTICE: &str = "Backend Server Problem! Please Wait for a while.";

/// Which collection mutation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationAction {
    Create,
    Update,
    Delete,
}

impl Display for MutationAction {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Create => write!(f, "add"),
            Self::Update => write!(f, "update"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// Input rejected before any request is issued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("amount must be a number, got '{0}'")]
    InvalidAmount(String),
    #[error("amount must not be negative")]
    NegativeAmount,
    #[error("date must be YYYY-MM-DD, got '{0}'")]
    InvalidDate(String),
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request never produced a response (unreachable host, DNS, timeout).
    #[error("network error: {0}")]
    Transport(String),

    /// Identity lookup during login returned a non-2xx status or no record.
    #[error("User not found")]
    UserNotFound { status: Option<u16> },

    /// An authenticated fetch failed and the session was torn down.
    #[error("session ended: {reason}")]
    SessionExpired { reason: String },

    /// The backend kept failing but the session was kept (retry budget spent).
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Failed to {action} expense (status {status})")]
    Mutation { action: MutationAction, status: u16 },

    #[error("Signup failed (status {status})")]
    SignupFailed { status: u16 },

    /// No credentials or no resolved user id for an operation that needs both.
    #[error("You are not logged in or user ID is missing.")]
    Unauthenticated,

    /// A response arrived after the request it answers was superseded.
    #[error("response discarded: request was superseded")]
    Superseded,

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("session storage error: {0:#}")]
    Storage(anyhow::Error),
}

impl ClientError {
    /// True when the failure ended the session.
    pub fn is_session_fatal(&self) -> bool {
        matches!(self, Self::SessionExpired { .. })
    }

    /// Text for the transient notification shown to the user.
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(_) => "Something went wrong. Please try again.".to_string(),
            Self::UserNotFound { .. } => "Login failed: User not found".to_string(),
            Self::SessionExpired { .. } => SESSION_EXPIRED_NOTICE.to_string(),
            other => other.to_string(),
        }
    }
}
