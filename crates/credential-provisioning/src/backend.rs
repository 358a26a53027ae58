//! Credential backend: trades the app's client credentials for a
//! downstream bearer token.

use crate::{ProvisioningError, ProvisioningResult};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use session_config_and_utils::{Config, CLIENT_ID_ENV, CLIENT_SECRET_ENV};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use tracing::{debug, error, info};

fn summarize_response_body(body: &str) -> String {
    let mut hasher = DefaultHasher::new();
    body.hash(&mut hasher);
    format!("len={},digest={:016x}", body.len(), hasher.finish())
}

/// Client id/secret pair read from the environment.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    client_secret: String,
}

impl ClientCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Read `AGENCY_CLIENT_ID` / `AGENCY_CLIENT_SECRET` from the process
    /// environment.
    pub fn from_env() -> ProvisioningResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the credential variables through `lookup`. Blank values count
    /// as missing; the error names every missing variable.
    pub fn from_lookup<F>(lookup: F) -> ProvisioningResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        match (read(CLIENT_ID_ENV), read(CLIENT_SECRET_ENV)) {
            (Some(client_id), Some(client_secret)) => Ok(Self::new(client_id, client_secret)),
            (client_id, client_secret) => {
                let mut missing = Vec::new();
                if client_id.is_none() {
                    missing.push(CLIENT_ID_ENV.to_string());
                }
                if client_secret.is_none() {
                    missing.push(CLIENT_SECRET_ENV.to_string());
                }
                Err(ProvisioningError::MissingCredentials(missing))
            }
        }
    }

    pub fn client_secret(&self) -> &str {
        &self.client_secret
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Bearer token for the downstream API.
#[derive(Clone, PartialEq, Eq)]
pub struct DownstreamCredential {
    pub access_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl DownstreamCredential {
    pub fn new(access_token: impl Into<String>, expires_at: Option<DateTime<Utc>>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    /// Token is non-empty and not past its expiry.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.access_token.is_empty() && self.expires_at.map_or(true, |expiry| expiry > now)
    }

    pub fn has_valid_token(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

impl std::fmt::Debug for DownstreamCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownstreamCredential")
            .field("access_token_len", &self.access_token.len())
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Source of downstream credentials.
#[async_trait]
pub trait CredentialBackend: Send + Sync {
    async fn fetch_credentials(
        &self,
        credentials: &ClientCredentials,
    ) -> ProvisioningResult<DownstreamCredential>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// OAuth client-credentials grant against `{api_base_url}/oauth/token`.
#[derive(Clone)]
pub struct HttpCredentialBackend {
    http_client: reqwest::Client,
    api_base_url: String,
}

impl HttpCredentialBackend {
    /// Create a backend for `api_base_url` with the given request timeout.
    pub fn new(
        api_base_url: impl Into<String>,
        timeout: std::time::Duration,
    ) -> ProvisioningResult<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Create a backend from the validated configuration.
    pub fn from_config(config: &Config) -> ProvisioningResult<Self> {
        config.api_base_url()?;
        Self::new(config.api_base_url.as_str(), config.request_timeout())
    }

    fn token_url(&self) -> String {
        format!("{}/oauth/token", self.api_base_url)
    }
}

/// `now + secs`, or `None` when `secs` is negative or out of range.
fn expiry_after(secs: i64) -> Option<DateTime<Utc>> {
    if secs < 0 {
        return None;
    }
    Duration::try_seconds(secs).and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}

#[async_trait]
impl CredentialBackend for HttpCredentialBackend {
    async fn fetch_credentials(
        &self,
        credentials: &ClientCredentials,
    ) -> ProvisioningResult<DownstreamCredential> {
        let url = self.token_url();
        debug!(url = %url, client_id = %credentials.client_id, "Requesting downstream credentials");

        let response = self
            .http_client
            .post(&url)
            .header("Accept", "application/json")
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret()),
            ])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(parsed) => parsed.error_description.unwrap_or(parsed.error),
                Err(_) => summarize_response_body(&body),
            };
            error!(status = %status, message = %message, "Credential backend rejected request");
            return Err(ProvisioningError::Backend {
                status: status.as_u16(),
                message,
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        if token.access_token.is_empty() {
            return Err(ProvisioningError::Backend {
                status: status.as_u16(),
                message: "empty access token".to_string(),
            });
        }

        let expires_at = match token.expires_in {
            Some(secs) => Some(expiry_after(secs).ok_or_else(|| {
                error!(expires_in = secs, "Credential backend returned an unusable expiry");
                ProvisioningError::Backend {
                    status: status.as_u16(),
                    message: format!("invalid expires_in: {secs}"),
                }
            })?),
            None => None,
        };
        info!(expires_at = ?expires_at, "Downstream credentials issued");

        Ok(DownstreamCredential::new(token.access_token, expires_at))
    }
}
