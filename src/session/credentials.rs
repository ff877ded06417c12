//! Credentials and the resolved user identity.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt::{Debug, Formatter};
use std::sync::OnceLock;

use crate::http::encode_path_segment;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern is a valid regex"))
}

/// True when `identifier` looks like an email address rather than a username.
pub fn is_email(identifier: &str) -> bool {
    email_regex().is_match(identifier)
}

/// Login identifier and password used for HTTP Basic auth.
///
/// Serialized with the keys `username`, `password`, `isEmail`; `username`
/// holds whatever the user typed, username or email.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "username")]
    pub identifier: String,
    pub password: String,
    #[serde(rename = "isEmail", default)]
    pub is_email: bool,
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .field("is_email", &self.is_email)
            .finish()
    }
}

impl Credentials {
    /// Builds credentials, deciding once whether the identifier is an email.
    pub fn classify(identifier: impl Into<String>, password: impl Into<String>) -> Self {
        let identifier = identifier.into();
        let is_email = is_email(&identifier);
        Self {
            identifier,
            password: password.into(),
            is_email,
        }
    }

    /// Both halves present, so a Basic auth header can be built.
    pub fn is_complete(&self) -> bool {
        !self.identifier.is_empty() && !self.password.is_empty()
    }

    /// Lookup endpoint for the identity behind these credentials.
    pub fn lookup_path(&self) -> String {
        let kind = if self.is_email {
            "by-email"
        } else {
            "by-username"
        };
        format!("/users/{}/{}", kind, encode_path_segment(&self.identifier))
    }
}

/// User id as the backend sends it: a plain string, a number, or an object
/// wrapper such as `{"$oid": "..."}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserId {
    Plain(String),
    Numeric(Number),
    Wrapped(Map<String, Value>),
}

impl UserId {
    pub fn normalized(&self) -> String {
        match self {
            UserId::Plain(id) => id.clone(),
            UserId::Numeric(n) => n.to_string(),
            UserId::Wrapped(fields) => match fields.get("$oid") {
                Some(Value::String(oid)) => oid.clone(),
                _ => Value::Object(fields.clone()).to_string(),
            },
        }
    }
}

/// The identity resolved from the backend after login.
///
/// The backend names the id `id`; it is stored back as `userId`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(
        rename = "userId",
        alias = "id",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub user_id: Option<UserId>,
}

impl User {
    /// The id as a plain string, if one was resolved.
    pub fn normalized_id(&self) -> Option<String> {
        self.user_id
            .as_ref()
            .map(UserId::normalized)
            .filter(|id| !id.is_empty())
    }
}
