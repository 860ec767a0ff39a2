//! CodeFast API client.
//!
//! [`CodeFastClient`] ties the [`Authenticator`] to the upload endpoint:
//! ensure a token, build the multipart body, POST it, and translate the
//! outcome into an [`UploadResponse`] or a typed [`CodeFastError`].

use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::error::{excerpt, CodeFastError, Result};
use crate::request::{FileContent, UploadRequest, UploadResponse};
use reqwest::header::{self, HeaderValue};
use reqwest::multipart::Form;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, info_span, Instrument, Span};

/// Header carrying the bearer token on upload requests.
const TOKEN_HEADER: &str = "token";

/// Multipart field name of the uploaded file.
const FILE_FIELD: &str = "file";

/// Client for the CodeFast AI v2 upload API.
///
/// Safe to share across tasks behind an `Arc`.
#[derive(Debug)]
pub struct CodeFastClient {
    client: Client,
    config: Arc<ClientConfig>,
    auth: Authenticator,
    span: Span,
}

impl CodeFastClient {
    /// Create a new client.
    ///
    /// Fails with [`CodeFastError::InvalidArgument`] if any credential is
    /// empty. No network access happens here.
    pub fn new(config: ClientConfig) -> Result<Self> {
        config.validate()?;

        let mut headers = header::HeaderMap::new();
        headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .timeout(config.timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .default_headers(headers)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(CodeFastError::HttpClient)?;

        let auth = Authenticator::new(client.clone(), &config);
        let span = info_span!(
            "codefast_client",
            email = %config.email,
            base_url = %config.base_url()
        );

        info!(
            email = %config.email,
            base_url = %config.base_url(),
            "CodeFast client initialized"
        );

        Ok(Self {
            client,
            config: Arc::new(config),
            auth,
            span,
        })
    }

    /// Log every operation under `span` instead of the default client span.
    #[must_use]
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Return the bearer token, requesting one if none is cached.
    pub async fn token(&self) -> Result<String> {
        self.auth.token().instrument(self.span.clone()).await
    }

    /// Whether a token is currently cached.
    pub async fn has_token(&self) -> bool {
        self.auth.has_token().await
    }

    /// Forget the cached token so the next call re-authenticates.
    pub async fn invalidate_token(&self) {
        self.auth.clear().await;
    }

    /// Upload the file at `path` under its base name.
    pub async fn upload_path(&self, path: impl Into<PathBuf>) -> Result<UploadResponse> {
        self.upload(UploadRequest::from_path(path)).await
    }

    /// Upload in-memory `content` under `name`.
    pub async fn upload_content(
        &self,
        name: impl Into<String>,
        content: impl Into<FileContent>,
    ) -> Result<UploadResponse> {
        self.upload(UploadRequest::from_content(name, content)).await
    }

    /// Upload a file and return the server's JSON response.
    ///
    /// Input is validated first, then a token is ensured, then the file is
    /// resolved. A 401 from the upload endpoint clears the cached token and
    /// surfaces as [`CodeFastError::Authentication`].
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadResponse> {
        self.upload_inner(request).instrument(self.span.clone()).await
    }

    async fn upload_inner(&self, request: UploadRequest) -> Result<UploadResponse> {
        request.validate()?;

        let token = self.auth.token().await?;
        let Ok(token_value) = HeaderValue::from_str(&token) else {
            self.auth.invalidate(&token).await;
            return Err(CodeFastError::auth(
                "access token contains characters not allowed in a header",
            ));
        };

        let (file_name, part) = request.into_part().await?;
        let form = Form::new().part(FILE_FIELD, part);
        let url = self.config.upload_url();

        info!(file_name = %file_name, url = %url, "Uploading file");

        let response = self
            .client
            .post(&url)
            .header(TOKEN_HEADER, token_value)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!(file_name = %file_name, error = %e, "Network error during upload");
                CodeFastError::Upload {
                    message: format!("network error occurred during upload: {e}"),
                    status: None,
                    body: None,
                    source: Some(e),
                }
            })?;

        let status = response.status();
        info!(status = status.as_u16(), "Upload response received");

        if status == StatusCode::UNAUTHORIZED {
            // The token is rejected whether or not the body arrives intact
            let body = response.text().await.unwrap_or_default();
            error!(body = %excerpt(&body), "Upload rejected with 401");
            self.auth.invalidate(&token).await;
            return Err(CodeFastError::Authentication {
                message: format!(
                    "authentication failed during upload (status 401); \
                     token might be invalid or expired: {}",
                    excerpt(&body)
                ),
                status: Some(status.as_u16()),
                source: None,
            });
        }

        let body = response.text().await.map_err(|e| CodeFastError::Upload {
            message: format!("failed to read upload response: {e}"),
            status: Some(status.as_u16()),
            body: None,
            source: Some(e),
        })?;

        if !status.is_success() {
            error!(status = status.as_u16(), body = %excerpt(&body), "Upload failed");
            return Err(CodeFastError::Upload {
                message: format!("server returned {}: {}", status.as_u16(), excerpt(&body)),
                status: Some(status.as_u16()),
                body: Some(body),
                source: None,
            });
        }

        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Object(map)) => {
                info!(file_name = %file_name, "File uploaded successfully");
                Ok(map)
            }
            Ok(_) => Err(CodeFastError::Upload {
                message: "upload endpoint returned JSON that is not an object".to_string(),
                status: Some(status.as_u16()),
                body: Some(body),
                source: None,
            }),
            Err(e) => {
                error!(body = %excerpt(&body), "Failed to decode upload response");
                Err(CodeFastError::Upload {
                    message: format!(
                        "invalid JSON response received from upload endpoint \
                         after successful status: {e}"
                    ),
                    status: Some(status.as_u16()),
                    body: Some(body),
                    source: None,
                })
            }
        }
    }
}
