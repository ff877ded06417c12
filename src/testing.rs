//! Test doubles shared by the unit test modules.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

use crate::http::{ApiClient, HttpRequest, HttpResponse, Transport, TransportError};
use crate::session::SessionStore;
use crate::storage::MemoryStore;

enum Scripted {
    Ready(Result<HttpResponse, TransportError>),
    Gated(oneshot::Receiver<()>, Result<HttpResponse, TransportError>),
}

/// Replays queued responses in order and records every request it sees.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_status(&self, status: u16, body: &str) {
        self.push(Scripted::Ready(Ok(HttpResponse {
            status,
            body: body.to_string(),
        })));
    }

    pub fn push_json(&self, status: u16, body: serde_json::Value) {
        self.push_status(status, &body.to_string());
    }

    pub fn push_transport_error(&self, message: &str) {
        self.push(Scripted::Ready(Err(TransportError(message.to_string()))));
    }

    /// The response is held back until the returned sender fires (or drops).
    pub fn push_gated(&self, status: u16, body: serde_json::Value) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.push(Scripted::Gated(
            rx,
            Ok(HttpResponse {
                status,
                body: body.to_string(),
            }),
        ));
        tx
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn push(&self, entry: Scripted) {
        self.script.lock().unwrap().push_back(entry);
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Ready(result)) => result,
            Some(Scripted::Gated(gate, result)) => {
                let _ = gate.await;
                result
            }
            None => Err(TransportError("no scripted response".to_string())),
        }
    }
}

pub struct Harness {
    pub transport: Arc<ScriptedTransport>,
    pub api: Arc<ApiClient>,
    pub storage: MemoryStore,
    pub session: Arc<SessionStore>,
}

/// Anonymous session over in-memory storage and a scripted backend.
pub fn harness() -> Harness {
    let transport = Arc::new(ScriptedTransport::new());
    let api = Arc::new(ApiClient::new(
        "http://localhost:8080/api",
        transport.clone(),
    ));
    let storage = MemoryStore::new();
    let session = Arc::new(
        SessionStore::rehydrate(Arc::new(storage.clone())).expect("empty storage rehydrates"),
    );
    Harness {
        transport,
        api,
        storage,
        session,
    }
}

pub fn user_json(username: &str, id: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "username": username,
        "email": format!("{}@example.com", username),
    })
}

/// Harness with `alice` already logged in.
pub async fn logged_in_harness() -> Harness {
    let h = harness();
    h.transport.push_json(200, user_json("alice", "u-1"));
    h.session
        .login(&h.api, "alice", "pw")
        .await
        .expect("scripted login succeeds");
    h
}
