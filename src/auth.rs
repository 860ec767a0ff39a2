//! Token exchange and caching.
//!
//! The [`Authenticator`] trades the configured credentials for a bearer
//! token with one `POST {base}/token` call and memoizes the result for the
//! lifetime of the instance. There is no expiry check: the cache is only
//! cleared when an upload is rejected with 401.

use crate::config::ClientConfig;
use crate::error::{excerpt, CodeFastError, Result};
use reqwest::header::{self, HeaderValue};
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// Body of the token request.
#[derive(Serialize)]
struct TokenRequest<'a> {
    email: &'a str,
    #[serde(rename = "teamSlug")]
    team_slug: &'a str,
    apikey: &'a str,
}

/// Obtains and caches the bearer token.
pub struct Authenticator {
    client: Client,
    token_url: String,
    email: String,
    team_slug: String,
    api_key: String,
    /// `None` until the first successful exchange, and again after a 401.
    token: Mutex<Option<String>>,
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("token_url", &self.token_url)
            .field("email", &self.email)
            .field("team_slug", &self.team_slug)
            .finish_non_exhaustive()
    }
}

impl Authenticator {
    /// Create an authenticator sharing the given HTTP client.
    pub fn new(client: Client, config: &ClientConfig) -> Self {
        Self {
            client,
            token_url: config.token_url(),
            email: config.email.clone(),
            team_slug: config.team_slug.clone(),
            api_key: config.api_key.clone(),
            token: Mutex::new(None),
        }
    }

    /// Return the cached token, fetching one first if none is cached.
    ///
    /// The cache lock is held across the request, so concurrent callers
    /// racing on first authentication share a single token request.
    pub async fn token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            debug!("Using cached access token");
            return Ok(token.clone());
        }

        let token = self.fetch().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Whether a token is currently cached.
    pub async fn has_token(&self) -> bool {
        self.token.lock().await.is_some()
    }

    /// Drop the cached token if it is still `rejected`.
    ///
    /// A token fetched by another caller after `rejected` was handed out
    /// is left alone.
    pub async fn invalidate(&self, rejected: &str) -> bool {
        let mut cached = self.token.lock().await;
        if cached.as_deref() == Some(rejected) {
            *cached = None;
            info!("Cleared rejected access token");
            true
        } else {
            false
        }
    }

    /// Drop whatever token is cached.
    pub async fn clear(&self) {
        self.token.lock().await.take();
    }

    async fn fetch(&self) -> Result<String> {
        let payload = TokenRequest {
            email: &self.email,
            team_slug: &self.team_slug,
            apikey: &self.api_key,
        };

        info!(url = %self.token_url, email = %self.email, "Requesting access token");

        let response = self
            .client
            .post(&self.token_url)
            .header(header::ACCEPT, "application/json")
            .header(header::CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "Network error during token request");
                CodeFastError::Authentication {
                    message: format!("network error occurred during authentication: {e}"),
                    status: None,
                    source: Some(e),
                }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| CodeFastError::Authentication {
            message: format!("failed to read token response: {e}"),
            status: Some(status.as_u16()),
            source: Some(e),
        })?;

        if !status.is_success() {
            error!(status = status.as_u16(), body = %excerpt(&body), "Token request rejected");
            return Err(CodeFastError::Authentication {
                message: format!(
                    "token endpoint returned {}: {}",
                    status.as_u16(),
                    excerpt(&body)
                ),
                status: Some(status.as_u16()),
                source: None,
            });
        }

        let data: Value = serde_json::from_str(&body).map_err(|e| {
            error!(body = %excerpt(&body), "Failed to decode token response");
            CodeFastError::auth(format!(
                "invalid JSON response received from token endpoint: {e}"
            ))
        })?;

        match data.get("access_token").and_then(Value::as_str) {
            Some(token) if HeaderValue::from_str(token).is_err() => {
                error!("Access token is not a valid header value");
                Err(CodeFastError::auth(
                    "access token contains characters not allowed in a header",
                ))
            }
            Some(token) if !token.is_empty() => {
                info!("Successfully retrieved access token");
                Ok(token.to_string())
            }
            _ => {
                error!(body = %excerpt(&body), "'access_token' not in token response");
                Err(CodeFastError::auth("'access_token' not found in API response"))
            }
        }
    }
}
