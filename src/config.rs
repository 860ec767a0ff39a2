//! Configuration management for the CodeFast client.
//!
//! Supports configuration via CLI arguments, environment variables,
//! and JSON configuration files with sensible defaults.

use crate::error::{CodeFastError, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default API host.
pub const DEFAULT_BASE_URL: &str = "https://dev-ai-v2.codefast.ai";

/// Path of the token endpoint relative to the base URL.
pub const TOKEN_ENDPOINT: &str = "/token";

/// Path of the upload endpoint relative to the base URL.
pub const UPLOAD_ENDPOINT: &str = "/api/v2/es/upload";

/// CLI arguments for the `codefast` uploader.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "codefast",
    version,
    about = "Upload files to the CodeFast AI v2 API",
    long_about = "Exchanges your email, team slug and API key for a token, then uploads\n\
                  each file as a multipart request and prints the server's JSON response.",
    after_help = "EXAMPLES:\n    \
        codefast --email me@example.com --team demo --api-key es-... report.csv\n    \
        codefast --config codefast.json --name notes.txt draft.md\n    \
        cat data.json | codefast --config codefast.json --stdin-name data.json"
)]
pub struct Args {
    /// Files to upload
    pub files: Vec<PathBuf>,

    /// Account email
    #[arg(long, env = "CODEFAST_EMAIL")]
    pub email: Option<String>,

    /// Team slug
    #[arg(long, env = "CODEFAST_TEAM_SLUG")]
    pub team: Option<String>,

    /// API key
    #[arg(long, env = "CODEFAST_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Base URL of the API
    #[arg(long, env = "CODEFAST_BASE_URL")]
    pub base_url: Option<String>,

    /// Request timeout in seconds
    #[arg(short, long, env = "CODEFAST_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Path to a client configuration file (JSON)
    #[arg(short, long, env = "CODEFAST_CONFIG")]
    pub config: Option<PathBuf>,

    /// Override the transmitted file name (single file only)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Upload standard input as a file with this name
    #[arg(long, conflicts_with = "files")]
    pub stdin_name: Option<String>,

    /// Only fetch a token to verify credentials
    #[arg(long)]
    pub token_only: bool,

    /// Enable verbose logging
    #[arg(short, long, env = "CODEFAST_VERBOSE")]
    pub verbose: bool,

    /// Output logs as JSON
    #[arg(long, env = "CODEFAST_JSON_LOGS")]
    pub json_logs: bool,

    /// Disable progress spinner
    #[arg(long, env = "CODEFAST_NO_PROGRESS")]
    pub no_progress: bool,
}

impl Args {
    /// Parse CLI arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Check argument combinations clap cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.token_only {
            return Ok(());
        }
        if self.files.is_empty() && self.stdin_name.is_none() {
            return Err(CodeFastError::InvalidArgument(
                "no files given; pass one or more paths or --stdin-name".to_string(),
            ));
        }
        if self.name.is_some() && self.files.len() > 1 {
            return Err(CodeFastError::InvalidArgument(
                "--name can only be used with a single file".to_string(),
            ));
        }
        Ok(())
    }
}

/// Immutable client configuration: credentials plus transport settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Account email.
    #[serde(default)]
    pub email: String,

    /// Team identifier.
    #[serde(default, rename = "teamSlug", alias = "team_slug")]
    pub team_slug: String,

    /// API key.
    #[serde(default, rename = "apiKey", alias = "api_key")]
    pub api_key: String,

    /// Base URL of the API.
    #[serde(default = "default_base_url", rename = "baseUrl", alias = "base_url")]
    pub base_url: String,

    /// Per-request timeout.
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("email", &self.email)
            .field("team_slug", &self.team_slug)
            .field("api_key", &"[REDACTED]")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ClientConfig {
    /// Create a configuration for the default host.
    pub fn new(
        email: impl Into<String>,
        team_slug: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            email: email.into(),
            team_slug: team_slug.into(),
            api_key: api_key.into(),
            base_url: default_base_url(),
            timeout: default_timeout(),
        }
    }

    /// Point the client at a different host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CodeFastError::ConfigRead {
            path: path.clone(),
            source: e,
        })?;

        serde_json::from_str(&content).map_err(|e| CodeFastError::ConfigParse {
            path: path.clone(),
            source: e,
        })
    }

    /// Create configuration from CLI arguments.
    pub fn from_args(args: &Args) -> Result<Self> {
        let mut config = match &args.config {
            Some(path) => Self::from_file(path)?,
            None => Self::new("", "", ""),
        };

        // Override with CLI args
        if let Some(email) = &args.email {
            config.email.clone_from(email);
        }
        if let Some(team) = &args.team {
            config.team_slug.clone_from(team);
        }
        if let Some(api_key) = &args.api_key {
            config.api_key.clone_from(api_key);
        }
        if let Some(base_url) = &args.base_url {
            config.base_url.clone_from(base_url);
        }
        if let Some(timeout) = args.timeout {
            config.timeout = Duration::from_secs(timeout);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("email", &self.email),
            ("team_slug", &self.team_slug),
            ("api_key", &self.api_key),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(field, _)| field)
        .collect();

        if !missing.is_empty() {
            return Err(CodeFastError::InvalidArgument(format!(
                "email, team_slug, and api_key must be provided (missing: {})",
                missing.join(", ")
            )));
        }

        if self.timeout.is_zero() {
            return Err(CodeFastError::InvalidArgument(
                "timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Base URL with the default applied and any trailing slash removed.
    pub fn base_url(&self) -> &str {
        let trimmed = self.base_url.trim().trim_end_matches('/');
        if trimmed.is_empty() {
            DEFAULT_BASE_URL
        } else {
            trimmed
        }
    }

    /// Full URL of the token endpoint.
    pub fn token_url(&self) -> String {
        format!("{}{}", self.base_url(), TOKEN_ENDPOINT)
    }

    /// Full URL of the upload endpoint.
    pub fn upload_url(&self) -> String {
        format!("{}{}", self.base_url(), UPLOAD_ENDPOINT)
    }
}

/// Custom serde module for humantime Duration parsing.
mod humantime_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_millis() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Accepts `"30s"`, `"500ms"`, `"30"`, or a bare number of seconds.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawDuration {
        Secs(u64),
        Text(String),
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = match RawDuration::deserialize(deserializer)? {
            RawDuration::Secs(secs) => return Ok(Duration::from_secs(secs)),
            RawDuration::Text(s) => s,
        };
        // "ms" must be checked before "s"
        if let Some(ms) = s.strip_suffix("ms") {
            ms.parse::<u64>()
                .map(Duration::from_millis)
                .map_err(serde::de::Error::custom)
        } else if let Some(secs) = s.strip_suffix('s') {
            secs.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        } else {
            s.parse::<u64>()
                .map(Duration::from_secs)
                .map_err(serde::de::Error::custom)
        }
    }
}
