//! Configuration management for the session stack.

use crate::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default base URL of the middleware API (can be overridden at compile time
/// via AGENCY_API_BASE_URL).
pub const DEFAULT_API_BASE_URL: &str = match option_env!("AGENCY_API_BASE_URL") {
    Some(url) => url,
    None => "https://api.agency-middleware.example",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default timeout for middleware HTTP requests.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 15;

/// Environment variable holding the middleware client id.
pub const CLIENT_ID_ENV: &str = "AGENCY_CLIENT_ID";

/// Environment variable holding the middleware client secret.
pub const CLIENT_SECRET_ENV: &str = "AGENCY_CLIENT_SECRET";

/// Runtime configuration.
///
/// Client credentials are deliberately absent: they are read from
/// [`CLIENT_ID_ENV`] / [`CLIENT_SECRET_ENV`] at provisioning time and never
/// written to a config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Middleware API base URL.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// Timeout applied to middleware requests.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Trigger a login once when the silent check finds no session.
    #[serde(default = "default_auto_login")]
    pub auto_login: bool,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_auto_login() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
            auto_login: default_auto_login(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok());
        config
    }

    /// Load configuration from a file, then apply environment overrides.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> CoreResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override fields from environment variables resolved through `lookup`.
    ///
    /// Unparseable numeric/boolean values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).and_then(non_empty);

        if let Some(level) = lookup("SESSION_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = lookup("AGENCY_API_BASE_URL") {
            self.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(secs) = lookup("AGENCY_TIMEOUT_SECS").and_then(|s| s.parse().ok()) {
            self.request_timeout_secs = secs;
        }
        if let Some(flag) = lookup("SESSION_AUTO_LOGIN").and_then(|s| parse_bool(&s)) {
            self.auto_login = flag;
        }
    }

    /// Get the middleware base URL as a parsed URL.
    pub fn api_base_url(&self) -> CoreResult<Url> {
        let url = Url::parse(&self.api_base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CoreError::Config(format!(
                "Unsupported API scheme: {}",
                url.scheme()
            )));
        }
        Ok(url)
    }

    /// Request timeout as a duration.
    pub fn request_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.request_timeout_secs)
    }
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
