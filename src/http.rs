//! HTTP client wrapper for the expense backend.
//!
//! [`ApiClient::request`] always sends a JSON content type, attaches Basic auth
//! when complete credentials are supplied, and hands back the raw response
//! whatever its status. Only a missing response is an error here.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use ureq::config::ConfigBuilder;
use ureq::typestate::AgentScope;

use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::session::Credentials;

/// Characters escaped when user input becomes a single path segment.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

pub fn encode_path_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT).to_string()
}

/// `Basic base64(identifier:password)`, or `None` if either half is empty.
pub fn basic_auth_header(credentials: &Credentials) -> Option<String> {
    if !credentials.is_complete() {
        return None;
    }
    let token = STANDARD.encode(format!(
        "{}:{}",
        credentials.identifier, credentials.password
    ));
    Some(format!("Basic {}", token))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

impl Display for Method {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
        }
    }
}

/// Method and optional JSON body for [`ApiClient::request`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn delete() -> Self {
        Self {
            method: Method::Delete,
            body: None,
        }
    }

    pub fn with_json<T: Serialize>(method: Method, body: &T) -> Result<Self, serde_json::Error> {
        Ok(Self {
            method,
            body: Some(serde_json::to_value(body)?),
        })
    }
}

/// A fully built request as handed to the [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_str(&self.body)
    }

    /// Empty body or a literal `null`.
    pub fn is_empty(&self) -> bool {
        let trimmed = self.body.trim();
        trimmed.is_empty() || trimmed == "null"
    }
}

/// No response was obtained.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct TransportError(pub String);

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        ClientError::Transport(err.0)
    }
}

/// Sends a built request over the wire.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Blocking `ureq` agent driven from tokio's blocking pool.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new(timeout: Duration) -> Self {
        Self::with_config(Self::config_builder(timeout))
    }

    /// Non-2xx statuses come back as responses, not errors.
    fn config_builder(timeout: Duration) -> ConfigBuilder<AgentScope> {
        ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .http_status_as_error(false)
    }

    fn with_config(builder: ConfigBuilder<AgentScope>) -> Self {
        Self {
            agent: builder.build().into(),
        }
    }

    fn send_blocking(agent: &ureq::Agent, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let HttpRequest {
            method,
            url,
            headers,
            body,
        } = request;

        let result = match method {
            Method::Get => {
                let mut builder = agent.get(url.as_str());
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            Method::Delete => {
                let mut builder = agent.delete(url.as_str());
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                builder.call()
            }
            Method::Post | Method::Put => {
                let mut builder = if method == Method::Post {
                    agent.post(url.as_str())
                } else {
                    agent.put(url.as_str())
                };
                for (name, value) in &headers {
                    builder = builder.header(name.as_str(), value.as_str());
                }
                match body {
                    Some(body) => builder.send(body.as_str()),
                    None => builder.send_empty(),
                }
            }
        };

        let mut response = result.map_err(|e| TransportError(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .body_mut()
            .read_to_string()
            .map_err(|e| TransportError(format!("failed to read response body: {}", e)))?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait]
impl Transport for UreqTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || Self::send_blocking(&agent, request))
            .await
            .map_err(|e| TransportError(format!("request task failed: {}", e)))?
    }
}

/// Entry point for every backend call.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn Transport>,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, transport: Arc<dyn Transport>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            transport,
        }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(
            config.api_base_url.clone(),
            Arc::new(UreqTransport::new(config.request_timeout())),
        )
    }

    /// Absolute URL for an API path such as `/expenses`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    #[tracing::instrument(skip(self, options, credentials), fields(method = %options.method))]
    pub async fn request(
        &self,
        url: &str,
        options: RequestOptions,
        credentials: Option<&Credentials>,
    ) -> Result<HttpResponse, ClientError> {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
        if let Some(auth) = credentials.and_then(basic_auth_header) {
            headers.push(("Authorization".to_string(), auth));
        }

        let body = options.body.as_ref().map(Value::to_string);

        let request = HttpRequest {
            method: options.method,
            url: url.to_string(),
            headers,
            body,
        };

        match self.transport.send(request).await {
            Ok(response) => {
                tracing::debug!(status = response.status, "response received");
                Ok(response)
            }
            Err(e) => {
                tracing::warn!("request failed: {}", e);
                Err(e.into())
            }
        }
    }
}
