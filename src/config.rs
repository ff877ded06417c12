use crate::failure::FailurePolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Overrides `api_base_url` from the config file.
pub const API_URL_ENV: &str = "EXPENSE_API_URL";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL of the backend REST API, without a trailing slash.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Global timeout for a single request, in seconds. Default: 10
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// How failed authenticated fetches affect the session.
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_api_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.normalized().validated()
    }

    /// Like [`ClientConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads `~/.expense-tracker/config.yaml` and applies environment overrides.
    pub fn resolve() -> Result<Self> {
        let path = crate::paths::config_path()?;
        Self::load_or_default(&path)?
            .with_env_overrides()
            .validated()
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_base_url = url;
            }
        }
        self.normalized()
    }

    /// Overrides the backend URL, e.g. from a command-line flag.
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Result<Self> {
        self.api_base_url = url.into();
        self.normalized().validated()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn normalized(mut self) -> Self {
        self.api_base_url = self.api_base_url.trim().trim_end_matches('/').to_string();
        self
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    fn validate(&self) -> Result<()> {
        if !self.api_base_url.starts_with("http://") && !self.api_base_url.starts_with("https://")
        {
            anyhow::bail!(
                "api_base_url must start with http:// or https://, got '{}'",
                self.api_base_url
            );
        }

        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }

        self.failure_policy.validate()?;

        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
