//! # CodeFast Client
//!
//! Async client for the CodeFast AI v2 file-upload API.
//!
//! The client exchanges an email, team slug and API key for a bearer token,
//! caches it for the lifetime of the instance, and uploads files as
//! multipart requests, returning the server's JSON response verbatim.
//!
//! ## Features
//!
//! - **Token caching**: One token request per client; concurrent first
//!   calls share it, and a 401 clears it so the next call re-authenticates
//! - **Two upload forms**: Stream a file from disk, or send in-memory text
//!   or bytes under a given name
//! - **Typed errors**: Invalid input, authentication, missing file and
//!   upload failures are distinct [`CodeFastError`] variants
//! - **Injected logging**: Operations log through `tracing` under a span
//!   the caller can supply
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use codefast_client::{ClientConfig, CodeFastClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ClientConfig::new("me@example.com", "demo", "es-your-api-key");
//!     let client = CodeFastClient::new(config)?;
//!
//!     let response = client.upload_path("report.csv").await?;
//!     println!("{}", serde_json::to_string_pretty(&response)?);
//!
//!     let response = client.upload_content("notes.txt", "hello").await?;
//!     println!("{response:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration
//!
//! The `codefast` binary supports configuration via:
//! - Command-line arguments
//! - Environment variables (prefixed with `CODEFAST_`)
//! - JSON configuration files
//!
//! See [`ClientConfig`] for all available options.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod request;

// Re-exports for convenience
pub use auth::Authenticator;
pub use client::CodeFastClient;
pub use config::{Args, ClientConfig, DEFAULT_BASE_URL, TOKEN_ENDPOINT, UPLOAD_ENDPOINT};
pub use error::{CodeFastError, Result};
pub use request::{FileContent, UploadRequest, UploadResponse, UploadSource};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
