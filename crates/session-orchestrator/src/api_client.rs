//! Bearer-token client for the downstream business API.

use serde::de::DeserializeOwned;
use session_config_and_utils::Config;
use thiserror::Error;
use tracing::{debug, error};

/// Downstream API error. Display strings are safe to show to the user.
#[derive(Error, Debug)]
pub enum ApiError {
    /// HTTP transport error
    #[error("Unable to reach the service. Check your connection and try again.")]
    Http(#[from] reqwest::Error),

    /// Non-success status
    #[error("The service returned an error ({status}). Please try again.")]
    Status { status: u16, body_len: usize },

    /// Body could not be decoded
    #[error("The service returned an unexpected response.")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Http(e) => e.status().map(|s| s.as_u16()),
            ApiError::Json(_) => None,
        }
    }

    /// Returns true when the bearer token was refused.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}

/// Result type alias using ApiError.
pub type ApiResult<T> = Result<T, ApiError>;

/// GET client that attaches a bearer token to every request.
#[derive(Clone)]
pub struct BearerApiClient {
    http_client: reqwest::Client,
    api_base_url: String,
}

impl BearerApiClient {
    pub fn new(api_base_url: impl Into<String>, timeout: std::time::Duration) -> ApiResult<Self> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            api_base_url: api_base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> ApiResult<Self> {
        Self::new(config.api_base_url.as_str(), config.request_timeout())
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_base_url, path.trim_start_matches('/'))
    }

    /// GET `path` and decode the JSON body.
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, token: &str) -> ApiResult<T> {
        let url = self.url(path);
        debug!(url = %url, "Downstream API request");

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            error!(status = %status, body_len = body.len(), url = %url, "Downstream API request failed");
            return Err(ApiError::Status {
                status: status.as_u16(),
                body_len: body.len(),
            });
        }

        Ok(serde_json::from_str(&body)?)
    }
}
