//! Session store: credentials plus resolved identity, persisted across restarts.
//!
//! This module is the ONLY place session transitions happen. The store owns
//! the [`SessionState`], persists it through a [`KeyValueStore`] under two
//! independent keys, broadcasts a [`SessionSnapshot`] after every transition,
//! and emits a [`SessionEvent`] to the structured log.
//!
//! Login writes the credentials *before* the identity lookup confirms them.
//! When the lookup fails the credentials stay stored and the session sits in
//! [`SessionState::Invalid`] until the next login or logout.

mod credentials;
mod signup;
mod state;

pub use credentials::{is_email, Credentials, User, UserId};
pub use signup::{signup, SignupForm};
pub use state::{SessionEvent, SessionPhase, SessionSnapshot, SessionState};

use serde::de::DeserializeOwned;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;

use crate::error::{ClientError, ValidationError};
use crate::http::{ApiClient, RequestOptions};
use crate::storage::{save_json, KeyValueStore};
use crate::structured_logger::StructuredLogger;

pub const CREDENTIALS_KEY: &str = "credentials";
pub const USER_KEY: &str = "user";

/// Everything an authenticated expense operation needs.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub credentials: Credentials,
    pub user_id: String,
    /// Session epoch at the time the context was taken.
    pub epoch: u64,
}

pub struct SessionStore {
    storage: Arc<dyn KeyValueStore>,
    state: Mutex<SessionState>,
    /// Bumped whenever the stored identity changes.
    epoch: AtomicU64,
    snapshot_tx: watch::Sender<SessionSnapshot>,
    logger: Option<Arc<StructuredLogger>>,
}

impl SessionStore {
    /// Restores credentials and user independently from storage.
    ///
    /// Nothing is re-validated against the backend. Entries that fail to
    /// decode are treated as absent.
    pub fn rehydrate(storage: Arc<dyn KeyValueStore>) -> anyhow::Result<Self> {
        let credentials: Option<Credentials> = read_entry(storage.as_ref(), CREDENTIALS_KEY)?;
        let user: Option<User> = read_entry(storage.as_ref(), USER_KEY)?;

        let state = match (credentials, user) {
            (Some(credentials), Some(user)) => SessionState::Authenticated { credentials, user },
            (Some(credentials), None) => SessionState::Invalid {
                credentials,
                reason: "identity not confirmed".to_string(),
            },
            (None, _) => SessionState::Anonymous,
        };

        tracing::debug!(phase = ?state.phase(), "session rehydrated");
        let (snapshot_tx, _) = watch::channel(SessionSnapshot::of(&state, 0));

        Ok(Self {
            storage,
            state: Mutex::new(state),
            epoch: AtomicU64::new(0),
            snapshot_tx,
            logger: None,
        })
    }

    pub fn with_logger(mut self, logger: Arc<StructuredLogger>) -> Self {
        logger.log_session_event(&SessionEvent::Rehydrated {
            phase: self.phase(),
        });
        self.logger = Some(logger);
        self
    }

    pub fn state(&self) -> SessionState {
        self.lock_state().clone()
    }

    pub fn phase(&self) -> SessionPhase {
        self.lock_state().phase()
    }

    pub fn credentials(&self) -> Option<Credentials> {
        self.lock_state().credentials().cloned()
    }

    pub fn user(&self) -> Option<User> {
        self.lock_state().user().cloned()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Credentials and user id, or [`ClientError::Unauthenticated`].
    pub fn auth_context(&self) -> Result<AuthContext, ClientError> {
        let state = self.lock_state();
        match &*state {
            SessionState::Authenticated { credentials, user } if credentials.is_complete() => {
                let user_id = user.normalized_id().ok_or(ClientError::Unauthenticated)?;
                Ok(AuthContext {
                    credentials: credentials.clone(),
                    user_id,
                    epoch: self.epoch(),
                })
            }
            _ => Err(ClientError::Unauthenticated),
        }
    }

    /// Logs in: classify, persist credentials, look the identity up.
    #[tracing::instrument(skip(self, api, password))]
    pub async fn login(
        &self,
        api: &ApiClient,
        identifier: &str,
        password: &str,
    ) -> Result<User, ClientError> {
        let credentials = self.begin_login(identifier, password)?;
        let url = api.endpoint(&credentials.lookup_path());

        let response = match api
            .request(&url, RequestOptions::get(), Some(&credentials))
            .await
        {
            Ok(response) => response,
            Err(e) => {
                self.fail_login(&credentials, &e.to_string());
                return Err(e);
            }
        };

        if !response.is_success() || response.is_empty() {
            self.fail_login(
                &credentials,
                &format!("lookup returned status {}", response.status),
            );
            return Err(ClientError::UserNotFound {
                status: Some(response.status),
            });
        }

        let user: User = match response.json() {
            Ok(user) => user,
            Err(e) => {
                self.fail_login(&credentials, &format!("undecodable user record: {}", e));
                return Err(e.into());
            }
        };

        self.complete_login(&credentials, user.clone())?;
        Ok(user)
    }

    /// Anonymous/any → Authenticating. Credentials are persisted immediately.
    ///
    /// The identifier is classified and stored exactly as typed; only an
    /// all-blank identifier is rejected.
    fn begin_login(&self, identifier: &str, password: &str) -> Result<Credentials, ClientError> {
        if identifier.trim().is_empty() {
            return Err(ValidationError::Required("username or email").into());
        }
        if password.is_empty() {
            return Err(ValidationError::Required("password").into());
        }

        let credentials = Credentials::classify(identifier, password);
        let state = self.lock_state();
        save_json(self.storage.as_ref(), CREDENTIALS_KEY, &credentials)
            .map_err(ClientError::Storage)?;
        // The in-memory state holds no user while authenticating; a user
        // entry left over from an earlier login would not match these credentials.
        self.storage
            .remove(USER_KEY)
            .map_err(ClientError::Storage)?;

        self.commit(
            state,
            SessionState::Authenticating {
                credentials: credentials.clone(),
            },
            SessionEvent::LoginStarted {
                identifier: credentials.identifier.clone(),
                is_email: credentials.is_email,
            },
        );
        Ok(credentials)
    }

    /// Authenticating → Authenticated, provided no other login or logout
    /// replaced ours. Check, user write and transition happen under one lock.
    fn complete_login(&self, credentials: &Credentials, user: User) -> Result<(), ClientError> {
        let state = self.lock_state();
        if !is_authenticating_with(&state, credentials) {
            return Err(ClientError::Superseded);
        }

        if let Err(e) = save_json(self.storage.as_ref(), USER_KEY, &user) {
            let reason = "failed to persist user record";
            tracing::warn!(identifier = %credentials.identifier, "login failed: {}", reason);
            self.commit(
                state,
                SessionState::Invalid {
                    credentials: credentials.clone(),
                    reason: reason.to_string(),
                },
                SessionEvent::LoginFailed {
                    identifier: credentials.identifier.clone(),
                    reason: reason.to_string(),
                },
            );
            return Err(ClientError::Storage(e));
        }

        let username = user.username.clone();
        self.commit(
            state,
            SessionState::Authenticated {
                credentials: credentials.clone(),
                user,
            },
            SessionEvent::LoginSucceeded { username },
        );
        Ok(())
    }

    /// Authenticating → Invalid. The stored credentials are left in place.
    fn fail_login(&self, credentials: &Credentials, reason: &str) {
        let state = self.lock_state();
        if !is_authenticating_with(&state, credentials) {
            return;
        }
        tracing::warn!(identifier = %credentials.identifier, "login failed: {}", reason);
        self.commit(
            state,
            SessionState::Invalid {
                credentials: credentials.clone(),
                reason: reason.to_string(),
            },
            SessionEvent::LoginFailed {
                identifier: credentials.identifier.clone(),
                reason: reason.to_string(),
            },
        );
    }

    /// Re-fetches the user record for the stored credentials.
    ///
    /// A failure here is reported but leaves the session untouched.
    pub async fn refresh_user(&self, api: &ApiClient) -> Result<User, ClientError> {
        let context = self.auth_context()?;
        let url = api.endpoint(&context.credentials.lookup_path());
        let response = api
            .request(&url, RequestOptions::get(), Some(&context.credentials))
            .await?;

        if !response.is_success() || response.is_empty() {
            return Err(ClientError::UserNotFound {
                status: Some(response.status),
            });
        }
        let user: User = response.json()?;

        let state = self.lock_state();
        let unchanged = self.epoch() == context.epoch
            && matches!(
                &*state,
                SessionState::Authenticated { credentials, .. } if *credentials == context.credentials
            );
        if !unchanged {
            return Err(ClientError::Superseded);
        }
        save_json(self.storage.as_ref(), USER_KEY, &user).map_err(ClientError::Storage)?;

        let username = user.username.clone();
        self.commit(
            state,
            SessionState::Authenticated {
                credentials: context.credentials,
                user: user.clone(),
            },
            SessionEvent::UserRefreshed { username },
        );
        Ok(user)
    }

    /// Clears credentials and user from memory and storage.
    pub fn logout(&self) -> Result<(), ClientError> {
        let state = self.lock_state();
        let cleared = self.clear_storage();
        self.commit(state, SessionState::Anonymous, SessionEvent::LoggedOut);
        cleared.map_err(ClientError::Storage)
    }

    /// Forced logout after a dependent request failed.
    pub fn invalidate(&self, reason: &str) {
        tracing::warn!("session invalidated: {}", reason);
        let state = self.lock_state();
        if let Err(e) = self.clear_storage() {
            tracing::warn!("failed to clear session storage: {:#}", e);
        }
        self.commit(
            state,
            SessionState::Anonymous,
            SessionEvent::SessionInvalidated {
                reason: reason.to_string(),
            },
        );
    }

    fn clear_storage(&self) -> anyhow::Result<()> {
        let credentials = self.storage.remove(CREDENTIALS_KEY);
        let user = self.storage.remove(USER_KEY);
        credentials.and(user)
    }

    /// Replaces the state, then broadcasts and logs while still holding the
    /// guard so observers see transitions in commit order.
    fn commit(
        &self,
        mut state: MutexGuard<'_, SessionState>,
        next: SessionState,
        event: SessionEvent,
    ) {
        let identity_changed =
            state.credentials() != next.credentials() || state.user() != next.user();
        *state = next;
        if identity_changed {
            self.epoch.fetch_add(1, Ordering::SeqCst);
        }

        self.snapshot_tx
            .send_replace(SessionSnapshot::of(&state, self.epoch()));
        if let Some(logger) = &self.logger {
            logger.log_session_event(&event);
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_authenticating_with(state: &SessionState, credentials: &Credentials) -> bool {
    matches!(
        state,
        SessionState::Authenticating { credentials: current } if current == credentials
    )
}

fn read_entry<T: DeserializeOwned>(
    storage: &dyn KeyValueStore,
    key: &str,
) -> anyhow::Result<Option<T>> {
    let Some(raw) = storage.get(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            tracing::warn!("ignoring unreadable '{}' entry: {}", key, e);
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests;
