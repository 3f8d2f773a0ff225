//! Storage collaborators: where finished documents go after the pipeline
//! has written them locally.
//!
//! Both collaborators are optional and both are non-fatal. A failed upload
//! or record is reported in [`crate::output::PipelineResult::Success`]
//! next to the translated file; it never turns a successful translation
//! into an error.

use crate::config::OutputMode;
use crate::error::StorageError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Remote object storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Upload the file at `path` and return its remote URL.
    async fn upload(&self, path: &Path) -> Result<String, StorageError>;
}

/// Persistence of file records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn record(&self, record: FileRecord) -> Result<(), StorageError>;
}

/// How a file entered the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileSource {
    /// Supplied by the caller.
    Upload,
    /// Produced by another subsystem.
    Generated,
    /// Output of this pipeline.
    Translated,
}

/// One stored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub filename: String,
    /// Extension without the dot (`pdf`, `docx`).
    pub file_type: String,
    /// Local path or remote URL.
    pub location: String,
    pub source: FileSource,
    pub uploaded_at: DateTime<Utc>,
}

impl FileRecord {
    /// Record for `path` stamped with the current time. `location` defaults
    /// to the path itself.
    pub fn for_path(path: &Path, source: FileSource, location: Option<String>) -> Self {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_type = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        Self {
            filename,
            file_type,
            location: location.unwrap_or_else(|| path.display().to_string()),
            source,
            uploaded_at: Utc::now(),
        }
    }
}

// ── HTTP object store ────────────────────────────────────────────────────

/// Uploads with `PUT {base_url}/{file_name}`.
///
/// Works against any bucket endpoint that accepts authenticated PUTs
/// (S3/GCS presigned prefixes, WebDAV, a local dev server).
#[derive(Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl std::fmt::Debug for HttpObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpObjectStore")
            .field("base_url", &self.base_url)
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, StorageError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| StorageError::UploadFailed {
                path: base_url.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base_url,
            bearer_token: None,
        })
    }

    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    /// URL the file named `name` is stored under.
    pub fn object_url(&self, name: &str) -> String {
        format!("{}/{}", self.base_url, encode_segment(name))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn upload(&self, path: &Path) -> Result<String, StorageError> {
        let failed = |reason: String| StorageError::UploadFailed {
            path: path.display().to_string(),
            reason,
        };

        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| failed("path has no file name".to_string()))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| failed(e.to_string()))?;
        let url = self.object_url(name);

        let mut request = self
            .client
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type(path))
            .body(bytes);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| failed(e.without_url().to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(failed(format!(
                "HTTP {}: {}",
                status,
                body.chars().take(200).collect::<String>()
            )));
        }

        debug!("Uploaded {} → {}", path.display(), url);
        Ok(url)
    }
}

fn content_type(path: &Path) -> &'static str {
    let mode = match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("pdf") => OutputMode::Overlay,
        Some(ext) if ext.eq_ignore_ascii_case("docx") => OutputMode::Flow,
        _ => return "application/octet-stream",
    };
    mode.mime_type()
}

/// Percent-encode everything outside the URL-path-safe ASCII set.
fn encode_segment(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for b in name.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{b:02X}"));
        }
    }
    out
}

// ── JSON-lines metadata store ────────────────────────────────────────────

/// Appends one JSON object per record to a file.
#[derive(Debug)]
pub struct JsonlMetadataStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl JsonlMetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back, skipping lines that do not parse.
    pub async fn records(&self) -> Result<Vec<FileRecord>, StorageError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(t) => t,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(StorageError::RecordFailed {
                    filename: self.path.display().to_string(),
                    reason: e.to_string(),
                })
            }
        };
        Ok(text
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }
}

#[async_trait]
impl MetadataStore for JsonlMetadataStore {
    async fn record(&self, record: FileRecord) -> Result<(), StorageError> {
        let failed = |reason: String| StorageError::RecordFailed {
            filename: record.filename.clone(),
            reason,
        };

        let mut line = serde_json::to_string(&record).map_err(|e| failed(e.to_string()))?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| failed(e.to_string()))?;
        }
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| failed(e.to_string()))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| failed(e.to_string()))?;
        file.flush().await.map_err(|e| failed(e.to_string()))?;
        Ok(())
    }
}
