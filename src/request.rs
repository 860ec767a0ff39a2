//! Upload request and response types.
//!
//! An [`UploadRequest`] names exactly one payload: a file on disk, or
//! in-memory content with a mandatory file name.

use crate::error::{CodeFastError, Result};
use reqwest::multipart::Part;
use reqwest::Body;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// MIME type for files streamed from disk.
pub const PATH_MIME_TYPE: &str = "application/octet-stream";

/// MIME type for in-memory content.
pub const CONTENT_MIME_TYPE: &str = "text/plain; charset=utf-8";

/// Parsed JSON body of a successful upload, returned verbatim.
pub type UploadResponse = Map<String, Value>;

/// In-memory file content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// Text, transmitted as UTF-8.
    Text(String),
    /// Raw bytes, transmitted unchanged.
    Binary(Vec<u8>),
}

impl FileContent {
    /// Interpret `bytes` as text, failing if they are not valid UTF-8.
    pub fn text_from_bytes(bytes: Vec<u8>) -> Result<Self> {
        String::from_utf8(bytes).map(Self::Text).map_err(|e| {
            CodeFastError::InvalidArgument(format!("could not encode content as UTF-8: {e}"))
        })
    }

    /// Length in bytes of the transmitted payload.
    pub fn len(&self) -> usize {
        match self {
            Self::Text(text) => text.len(),
            Self::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The bytes that go on the wire.
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }
}

impl From<String> for FileContent {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for FileContent {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for FileContent {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

impl From<&[u8]> for FileContent {
    fn from(bytes: &[u8]) -> Self {
        Self::Binary(bytes.to_vec())
    }
}

/// Where the uploaded bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSource {
    /// Stream a file from disk. `name` defaults to the path's base name.
    Path {
        /// File to upload.
        path: PathBuf,
        /// Transmitted file name override.
        name: Option<String>,
    },
    /// Send in-memory content under the given name.
    Content {
        /// Transmitted file name.
        name: String,
        /// Payload.
        content: FileContent,
    },
}

/// A single file upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    source: UploadSource,
    mime_type: Option<String>,
}

impl UploadRequest {
    /// Upload the file at `path` under its base name.
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            source: UploadSource::Path {
                path: path.into(),
                name: None,
            },
            mime_type: None,
        }
    }

    /// Upload `content` under `name`.
    pub fn from_content(name: impl Into<String>, content: impl Into<FileContent>) -> Self {
        Self {
            source: UploadSource::Content {
                name: name.into(),
                content: content.into(),
            },
            mime_type: None,
        }
    }

    /// Build a request from loosely-specified parts.
    ///
    /// `path` wins when both `path` and `content` are given. Empty strings
    /// count as absent.
    pub fn from_parts(
        path: Option<PathBuf>,
        name: Option<String>,
        content: Option<FileContent>,
    ) -> Result<Self> {
        let path = path.filter(|p| !p.as_os_str().is_empty());
        let name = name.filter(|n| !n.is_empty());

        match (path, content) {
            (Some(path), _) => Ok(Self {
                source: UploadSource::Path { path, name },
                mime_type: None,
            }),
            (None, Some(content)) => {
                let Some(name) = name else {
                    return Err(CodeFastError::InvalidArgument(
                        "file name must be provided when using file content".to_string(),
                    ));
                };
                Ok(Self::from_content(name, content))
            }
            (None, None) => Err(CodeFastError::InvalidArgument(
                "either a file path or file content must be provided".to_string(),
            )),
        }
    }

    /// Override the transmitted file name.
    #[must_use]
    pub fn with_name(mut self, new_name: impl Into<String>) -> Self {
        match &mut self.source {
            UploadSource::Path { name, .. } => *name = Some(new_name.into()),
            UploadSource::Content { name, .. } => *name = new_name.into(),
        }
        self
    }

    /// Override the MIME type of the file part.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// The payload this request carries.
    pub fn source(&self) -> &UploadSource {
        &self.source
    }

    /// MIME type the file part will be sent with.
    pub fn mime_type(&self) -> &str {
        match (&self.mime_type, &self.source) {
            (Some(mime), _) => mime,
            (None, UploadSource::Path { .. }) => PATH_MIME_TYPE,
            (None, UploadSource::Content { .. }) => CONTENT_MIME_TYPE,
        }
    }

    /// Check caller input without touching the filesystem or network.
    pub fn validate(&self) -> Result<()> {
        if let UploadSource::Content { name, .. } = &self.source {
            if name.is_empty() {
                return Err(CodeFastError::InvalidArgument(
                    "file name must be provided when using file content".to_string(),
                ));
            }
        }

        Part::bytes(Vec::new())
            .mime_str(self.mime_type())
            .map(|_| ())
            .map_err(|_| {
                CodeFastError::InvalidArgument(format!("invalid MIME type '{}'", self.mime_type()))
            })
    }

    /// Resolve the payload into a multipart part, returning the file name
    /// alongside it.
    ///
    /// For the path form the opened file is owned by the part's body and
    /// closed when the request completes or is dropped.
    pub(crate) async fn into_part(self) -> Result<(String, Part)> {
        let mime = self.mime_type().to_string();

        let (file_name, part) = match self.source {
            UploadSource::Path { path, name } => {
                let metadata = match tokio::fs::metadata(&path).await {
                    Ok(metadata) if metadata.is_file() => metadata,
                    _ => {
                        error!(path = %path.display(), "File not found");
                        return Err(CodeFastError::FileNotFound { path });
                    }
                };

                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|source| CodeFastError::FileRead {
                        path: path.clone(),
                        source,
                    })?;

                let file_name = name
                    .filter(|n| !n.is_empty())
                    .unwrap_or_else(|| base_name(&path));
                debug!(path = %path.display(), size = metadata.len(), "Streaming file from disk");

                let part = Part::stream_with_length(Body::from(file), metadata.len());
                (file_name, part)
            }
            UploadSource::Content { name, content } => {
                debug!(size = content.len(), "Using provided file content");
                (name, Part::bytes(content.into_bytes()))
            }
        };

        let part = part
            .file_name(file_name.clone())
            .mime_str(&mime)
            .map_err(|_| CodeFastError::InvalidArgument(format!("invalid MIME type '{mime}'")))?;

        Ok((file_name, part))
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}
