//! Failure classification and the invalidation policy for authenticated fetches.
//!
//! The documented behavior treats any failed authenticated fetch as proof of
//! stale credentials and logs the user out. [`InvalidateOn::AuthErrorsOnly`]
//! narrows that to 401/403 and retries transient failures with backoff.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Canonical failure types for an authenticated fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureKind {
    /// No response at all.
    Transport(String),
    /// The backend answered with a non-2xx status.
    Status(u16),
    /// 2xx response whose body could not be decoded.
    Malformed(String),
}

impl FailureKind {
    /// 401 and 403 mean the credentials themselves were rejected.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, FailureKind::Status(401 | 403))
    }

    /// Returns true if this failure type is potentially recoverable via retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            FailureKind::Transport(_) => true,
            FailureKind::Status(status) => *status >= 500,
            FailureKind::Malformed(_) => false,
        }
    }
}

impl Display for FailureKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "transport failure: {}", msg),
            Self::Status(status) => write!(f, "backend returned status {}", status),
            Self::Malformed(msg) => write!(f, "malformed response: {}", msg),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidateOn {
    /// Any failed authenticated fetch forces logout.
    #[default]
    AnyFailure,
    /// Only 401/403 force logout; 5xx and transport failures are retried.
    AuthErrorsOnly,
}

/// What the caller should do after a failed authenticated fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureDecision {
    Retry { delay: Duration },
    Invalidate,
    Surface,
}

/// Retry policy configuration for failed authenticated fetches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailurePolicy {
    #[serde(default)]
    pub invalidate_on: InvalidateOn,
    /// Maximum retry attempts for transient failures. Default: 2
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff step in milliseconds. Default: 500
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    500
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            invalidate_on: InvalidateOn::default(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl FailurePolicy {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_retries > 10 {
            anyhow::bail!(
                "failure_policy.max_retries must be at most 10, got {}",
                self.max_retries
            );
        }
        Ok(())
    }

    /// `attempt` counts retries already made for this fetch.
    pub fn decide(&self, kind: &FailureKind, attempt: u32) -> FailureDecision {
        match self.invalidate_on {
            InvalidateOn::AnyFailure => FailureDecision::Invalidate,
            InvalidateOn::AuthErrorsOnly => {
                if kind.is_auth_error() {
                    FailureDecision::Invalidate
                } else if kind.is_retryable() && attempt < self.max_retries {
                    FailureDecision::Retry {
                        delay: Duration::from_millis(self.backoff_ms * u64::from(attempt + 1)),
                    }
                } else {
                    FailureDecision::Surface
                }
            }
        }
    }
}
