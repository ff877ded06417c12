use super::*;
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::storage::{load_json, MemoryStore};
use crate::testing::{harness, logged_in_harness, user_json, ScriptedTransport};

fn stored_credentials(storage: &MemoryStore) -> Option<Credentials> {
    load_json(storage, CREDENTIALS_KEY).unwrap()
}

fn stored_user(storage: &MemoryStore) -> Option<User> {
    load_json(storage, USER_KEY).unwrap()
}

#[tokio::test]
async fn test_login_by_email_uses_email_endpoint() {
    let h = harness();
    h.transport.push_json(200, user_json("alice", "u-1"));

    let user = h
        .session
        .login(&h.api, "alice@example.com", "pw")
        .await
        .unwrap();
    assert_eq!(user.username, "alice");

    let sent = h.transport.requests();
    assert_eq!(
        sent[0].url,
        "http://localhost:8080/api/users/by-email/alice@example.com"
    );
    assert!(sent[0].header("Authorization").is_some());

    let creds = h.session.credentials().unwrap();
    assert!(creds.is_email);
    assert_eq!(h.session.phase(), SessionPhase::Authenticated);
}

#[tokio::test]
async fn test_login_by_username_persists_both_entries() {
    let h = harness();
    h.transport.push_json(200, user_json("alice", "u-1"));

    h.session.login(&h.api, "alice", "pw").await.unwrap();

    assert_eq!(
        h.transport.requests()[0].url,
        "http://localhost:8080/api/users/by-username/alice"
    );
    let creds = stored_credentials(&h.storage).unwrap();
    assert_eq!(creds.identifier, "alice");
    assert!(!creds.is_email);
    let user = stored_user(&h.storage).unwrap();
    assert_eq!(user.normalized_id().as_deref(), Some("u-1"));

    let context = h.session.auth_context().unwrap();
    assert_eq!(context.user_id, "u-1");
}

#[tokio::test]
async fn test_login_failure_keeps_credentials_and_marks_invalid() {
    let h = harness();
    h.transport.push_status(404, "");

    let err = h.session.login(&h.api, "ghost", "pw").await.unwrap_err();
    assert!(matches!(err, ClientError::UserNotFound { status: Some(404) }));
    assert_eq!(err.user_message(), "Login failed: User not found");

    assert_eq!(h.session.phase(), SessionPhase::Invalid);
    assert_eq!(h.session.user(), None);
    assert_eq!(stored_credentials(&h.storage).unwrap().identifier, "ghost");
    assert_eq!(stored_user(&h.storage), None);
    assert!(matches!(
        h.session.auth_context(),
        Err(ClientError::Unauthenticated)
    ));
}

#[tokio::test]
async fn test_null_lookup_body_is_user_not_found() {
    let h = harness();
    h.transport.push_status(200, "null");

    let err = h.session.login(&h.api, "ghost", "pw").await.unwrap_err();
    assert!(matches!(err, ClientError::UserNotFound { status: Some(200) }));
    assert_eq!(h.session.phase(), SessionPhase::Invalid);
}

#[tokio::test]
async fn test_transport_failure_during_login() {
    let h = harness();
    h.transport.push_transport_error("connection refused");

    let err = h.session.login(&h.api, "alice", "pw").await.unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)));
    assert_eq!(h.session.phase(), SessionPhase::Invalid);
}

#[tokio::test]
async fn test_blank_login_input_is_rejected_without_request() {
    let h = harness();

    let err = h.session.login(&h.api, "   ", "pw").await.unwrap_err();
    assert!(matches!(
        err,
        ClientError::Validation(ValidationError::Required(_))
    ));
    let err = h.session.login(&h.api, "alice", "").await.unwrap_err();
    assert!(matches!(err, ClientError::Validation(_)));

    assert_eq!(h.transport.request_count(), 0);
    assert_eq!(h.session.phase(), SessionPhase::Anonymous);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn test_logout_clears_storage_and_rehydrates_anonymous() {
    let h = logged_in_harness().await;
    assert_eq!(h.storage.len(), 2);

    h.session.logout().unwrap();
    assert_eq!(h.session.phase(), SessionPhase::Anonymous);
    assert!(h.storage.is_empty());

    let restored = SessionStore::rehydrate(Arc::new(h.storage.clone())).unwrap();
    assert_eq!(restored.state(), SessionState::Anonymous);
}

#[tokio::test]
async fn test_rehydrate_restores_authenticated_session() {
    let h = logged_in_harness().await;

    let restored = SessionStore::rehydrate(Arc::new(h.storage.clone())).unwrap();
    assert_eq!(restored.phase(), SessionPhase::Authenticated);
    assert_eq!(restored.user(), h.session.user());
    assert_eq!(restored.credentials(), h.session.credentials());
}

#[test]
fn test_rehydrate_partial_and_corrupt_entries() {
    let storage = MemoryStore::new();
    save_json(&storage, CREDENTIALS_KEY, &Credentials::classify("alice", "pw")).unwrap();
    let restored = SessionStore::rehydrate(Arc::new(storage.clone())).unwrap();
    assert!(matches!(restored.state(), SessionState::Invalid { .. }));
    assert!(restored.auth_context().is_err());

    let orphan_user = MemoryStore::new();
    orphan_user.set(USER_KEY, &user_json("alice", "u-1").to_string()).unwrap();
    let restored = SessionStore::rehydrate(Arc::new(orphan_user)).unwrap();
    assert_eq!(restored.phase(), SessionPhase::Anonymous);

    let corrupt = MemoryStore::new();
    corrupt.set(CREDENTIALS_KEY, "{not json").unwrap();
    let restored = SessionStore::rehydrate(Arc::new(corrupt)).unwrap();
    assert_eq!(restored.phase(), SessionPhase::Anonymous);
}

#[tokio::test]
async fn test_new_login_drops_previous_user_entry() {
    let h = logged_in_harness().await;
    h.transport.push_status(404, "");

    let _ = h.session.login(&h.api, "bob", "pw").await;
    assert_eq!(stored_credentials(&h.storage).unwrap().identifier, "bob");
    assert_eq!(stored_user(&h.storage), None);
}

#[tokio::test]
async fn test_snapshots_and_epoch_follow_transitions() {
    let h = harness();
    let mut rx = h.session.subscribe();
    assert_eq!(rx.borrow().phase, SessionPhase::Anonymous);
    let start = h.session.epoch();

    h.transport.push_json(200, user_json("alice", "u-1"));
    h.session.login(&h.api, "alice", "pw").await.unwrap();

    assert!(rx.has_changed().unwrap());
    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.phase, SessionPhase::Authenticated);
    assert_eq!(snapshot.identifier.as_deref(), Some("alice"));
    assert_eq!(snapshot.username.as_deref(), Some("alice"));
    assert!(snapshot.epoch > start);

    let before_logout = h.session.epoch();
    h.session.logout().unwrap();
    let snapshot = rx.borrow_and_update().clone();
    assert_eq!(snapshot.phase, SessionPhase::Anonymous);
    assert_eq!(snapshot.identifier, None);
    assert!(snapshot.epoch > before_logout);
}

#[tokio::test]
async fn test_invalidate_forces_anonymous() {
    let h = logged_in_harness().await;

    h.session.invalidate("status 500");
    assert_eq!(h.session.state(), SessionState::Anonymous);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn test_refresh_user_updates_record_and_failure_keeps_session() {
    let h = logged_in_harness().await;
    let epoch = h.session.epoch();

    h.transport.push_json(
        200,
        serde_json::json!({"id": "u-1", "username": "alice", "email": "new@example.com"}),
    );
    let user = h.session.refresh_user(&h.api).await.unwrap();
    assert_eq!(user.email, "new@example.com");
    assert_eq!(stored_user(&h.storage).unwrap().email, "new@example.com");
    assert!(h.session.epoch() > epoch);

    h.transport.push_status(500, "");
    let err = h.session.refresh_user(&h.api).await.unwrap_err();
    assert!(matches!(err, ClientError::UserNotFound { status: Some(500) }));
    assert_eq!(h.session.phase(), SessionPhase::Authenticated);
}

#[tokio::test]
async fn test_refresh_user_requires_session() {
    let h = harness();
    let err = h.session.refresh_user(&h.api).await.unwrap_err();
    assert!(matches!(err, ClientError::Unauthenticated));
    assert_eq!(h.transport.request_count(), 0);
}

#[tokio::test]
async fn test_user_without_id_is_unauthenticated_for_operations() {
    let h = harness();
    h.transport
        .push_json(200, serde_json::json!({"username": "alice", "email": "a@x.io"}));
    h.session.login(&h.api, "alice", "pw").await.unwrap();

    assert_eq!(h.session.phase(), SessionPhase::Authenticated);
    assert!(matches!(
        h.session.auth_context(),
        Err(ClientError::Unauthenticated)
    ));
}

#[tokio::test]
async fn test_identifier_is_classified_as_typed() {
    let h = harness();
    h.transport.push_json(200, user_json("alice", "u-1"));

    h.session
        .login(&h.api, " alice@example.com", "pw")
        .await
        .unwrap();

    assert_eq!(
        h.transport.requests()[0].url,
        "http://localhost:8080/api/users/by-username/%20alice@example.com"
    );
    let creds = stored_credentials(&h.storage).unwrap();
    assert_eq!(creds.identifier, " alice@example.com");
    assert!(!creds.is_email);
}

#[tokio::test]
async fn test_lookup_answered_after_logout_is_discarded() {
    let h = harness();
    let gate = h.transport.push_gated(200, user_json("alice", "u-1"));

    let (session, api) = (h.session.clone(), h.api.clone());
    let login = tokio::spawn(async move { session.login(&api, "alice", "pw").await });
    while h.transport.request_count() == 0 {
        tokio::task::yield_now().await;
    }

    h.session.logout().unwrap();
    gate.send(()).unwrap();

    let err = login.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::Superseded));
    assert_eq!(h.session.phase(), SessionPhase::Anonymous);
    assert_eq!(h.session.user(), None);
    assert!(h.storage.is_empty());
}

#[tokio::test]
async fn test_late_lookup_failure_leaves_newer_login_alone() {
    let h = harness();
    let gate = h.transport.push_gated(404, serde_json::Value::Null);

    let (session, api) = (h.session.clone(), h.api.clone());
    let first = tokio::spawn(async move { session.login(&api, "alice", "pw").await });
    while h.transport.request_count() == 0 {
        tokio::task::yield_now().await;
    }

    h.transport.push_json(200, user_json("bob", "u-2"));
    h.session.login(&h.api, "bob", "pw2").await.unwrap();
    gate.send(()).unwrap();

    let err = first.await.unwrap().unwrap_err();
    assert!(matches!(err, ClientError::UserNotFound { status: Some(404) }));
    assert_eq!(h.session.phase(), SessionPhase::Authenticated);
    assert_eq!(h.session.user().unwrap().username, "bob");
    assert_eq!(stored_credentials(&h.storage).unwrap().identifier, "bob");
    assert_eq!(stored_user(&h.storage).unwrap().username, "bob");
}

/// Starts a logout on another thread while the user entry is being written.
struct LogoutDuringUserWrite {
    inner: MemoryStore,
    session: OnceLock<Weak<SessionStore>>,
    logout: Mutex<Option<JoinHandle<()>>>,
}

impl KeyValueStore for LogoutDuringUserWrite {
    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.inner.get(key)
    }

    fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.inner.set(key, value)?;
        if key == USER_KEY {
            if let Some(session) = self.session.get().and_then(Weak::upgrade) {
                let handle = std::thread::spawn(move || session.logout().unwrap());
                *self.logout.lock().unwrap() = Some(handle);
                std::thread::sleep(Duration::from_millis(50));
            }
        }
        Ok(())
    }

    fn remove(&self, key: &str) -> anyhow::Result<()> {
        self.inner.remove(key)
    }
}

#[tokio::test]
async fn test_logout_racing_login_completion_wins() {
    let transport = Arc::new(ScriptedTransport::new());
    let api = ApiClient::new("http://localhost:8080/api", transport.clone());
    let entries = MemoryStore::new();
    let storage = Arc::new(LogoutDuringUserWrite {
        inner: entries.clone(),
        session: OnceLock::new(),
        logout: Mutex::new(None),
    });
    let session = Arc::new(SessionStore::rehydrate(storage.clone()).unwrap());
    storage.session.set(Arc::downgrade(&session)).unwrap();

    transport.push_json(200, user_json("alice", "u-1"));
    session.login(&api, "alice", "pw").await.unwrap();

    let logout = storage.logout.lock().unwrap().take().unwrap();
    logout.join().unwrap();

    assert_eq!(session.phase(), SessionPhase::Anonymous);
    assert_eq!(session.user(), None);
    assert!(entries.is_empty());
}
