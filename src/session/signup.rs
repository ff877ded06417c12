//! Account creation. Unauthenticated, and never logs the new account in.

use serde::Serialize;
use std::fmt::{Debug, Formatter};

use super::credentials::{is_email, User};
use crate::error::{ClientError, ValidationError};
use crate::http::{ApiClient, Method, RequestOptions};

#[derive(Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Debug for SignupForm {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignupForm")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl SignupForm {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.username.trim().is_empty() {
            return Err(ValidationError::Required("username"));
        }
        if self.email.trim().is_empty() {
            return Err(ValidationError::Required("email"));
        }
        if !is_email(self.email.trim()) {
            return Err(ValidationError::InvalidEmail(self.email.clone()));
        }
        if self.password.is_empty() {
            return Err(ValidationError::Required("password"));
        }
        Ok(())
    }
}

/// POSTs the form to `/signup`.
///
/// Returns the created user. A 2xx with an empty body is still a success; the
/// user is then echoed back from the form without an id.
#[tracing::instrument(skip_all, fields(username = %form.username))]
pub async fn signup(api: &ApiClient, form: &SignupForm) -> Result<User, ClientError> {
    form.validate()?;

    let trimmed = SignupForm {
        username: form.username.trim().to_string(),
        email: form.email.trim().to_string(),
        password: form.password.clone(),
    };
    let options = RequestOptions::with_json(Method::Post, &trimmed)?;
    let response = api.request(&api.endpoint("/signup"), options, None).await?;

    if !response.is_success() {
        tracing::warn!(status = response.status, "signup rejected");
        return Err(ClientError::SignupFailed {
            status: response.status,
        });
    }

    if response.is_empty() {
        return Ok(User {
            username: trimmed.username,
            email: trimmed.email,
            user_id: None,
        });
    }
    Ok(response.json()?)
}
