//! Input staging: copy or download the source document into a scratch
//! directory owned by the run.
//!
//! ## Why stage even local files?
//!
//! The run works on its own copy: the caller's file is never opened for
//! writing, a download and a local path look the same to later stages, and
//! every staged byte lives in one `TempDir` that is removed when
//! [`StagedInput`] is dropped. That drop happens on success, on error, and on
//! panic alike, so no exit path leaks temporary files.
//!
//! The PDF header (`%PDF-` within the first KiB) is checked here so a wrong
//! file type fails with [`TranslateError::UnsupportedFormat`] before any
//! parsing or network work.

use crate::error::TranslateError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Readers accept a header anywhere in the first 1024 bytes.
const HEADER_WINDOW: usize = 1024;

/// A source document copied into a private temporary directory.
#[derive(Debug)]
pub struct StagedInput {
    path: PathBuf,
    original_name: String,
    dir: TempDir,
}

impl StagedInput {
    /// Path of the staged copy.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name the caller supplied (URL segment, path file name, or the
    /// name given to [`stage_bytes`]).
    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    /// File stem used to name outputs.
    pub fn stem(&self) -> &str {
        Path::new(&self.original_name)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("document")
    }

    /// Directory that disappears with this value.
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Stage `input`, a local path or an HTTP(S) URL.
pub async fn stage(input: &str, download_timeout_secs: u64) -> Result<StagedInput, TranslateError> {
    if input.trim().is_empty() {
        return Err(TranslateError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        stage_url(input, download_timeout_secs).await
    } else {
        stage_local(Path::new(input)).await
    }
}

/// Stage an in-memory document under `filename`.
pub async fn stage_bytes(bytes: &[u8], filename: &str) -> Result<StagedInput, TranslateError> {
    let name = sanitize_filename(filename);
    check_header(bytes, Path::new(&name))?;
    write_staged(bytes, &name).await
}

async fn stage_local(path: &Path) -> Result<StagedInput, TranslateError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(TranslateError::PermissionDenied {
                path: path.to_path_buf(),
            })
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(TranslateError::FileNotFound {
                path: path.to_path_buf(),
            })
        }
        Err(e) => {
            return Err(TranslateError::InvalidInput {
                input: format!("{}: {}", path.display(), e),
            })
        }
    };
    check_header(&bytes, path)?;

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(sanitize_filename)
        .unwrap_or_else(|| "document.pdf".to_string());
    let staged = write_staged(&bytes, &name).await?;
    debug!("Staged local file {} → {}", path.display(), staged.path.display());
    Ok(staged)
}

async fn stage_url(url: &str, timeout_secs: u64) -> Result<StagedInput, TranslateError> {
    info!("Downloading document from: {}", url);

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| TranslateError::DownloadFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            TranslateError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            TranslateError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;

    if !response.status().is_success() {
        return Err(TranslateError::DownloadFailed {
            url: url.to_string(),
            reason: format!("HTTP {}", response.status()),
        });
    }

    let name = filename_from_url(url);
    let bytes = response.bytes().await.map_err(|e| {
        if e.is_timeout() {
            TranslateError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            TranslateError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    })?;
    check_header(&bytes, Path::new(&name))?;

    let staged = write_staged(&bytes, &name).await?;
    info!("Downloaded {} bytes to: {}", bytes.len(), staged.path.display());
    Ok(staged)
}

async fn write_staged(bytes: &[u8], name: &str) -> Result<StagedInput, TranslateError> {
    let dir = TempDir::new()
        .map_err(|e| TranslateError::Internal(format!("Failed to create temp dir: {e}")))?;
    let path = dir.path().join(name);
    tokio::fs::write(&path, bytes)
        .await
        .map_err(|e| TranslateError::Internal(format!("Failed to write temp file: {e}")))?;
    Ok(StagedInput {
        path,
        original_name: name.to_string(),
        dir,
    })
}

/// Reject anything without a PDF header.
pub fn check_header(bytes: &[u8], path: &Path) -> Result<(), TranslateError> {
    let window = &bytes[..bytes.len().min(HEADER_WINDOW)];
    if window.windows(5).any(|w| w == b"%PDF-") {
        return Ok(());
    }
    let reason = if bytes.is_empty() {
        "file is empty".to_string()
    } else {
        let head: String = bytes
            .iter()
            .take(4)
            .map(|b| if b.is_ascii_graphic() { *b as char } else { '.' })
            .collect();
        format!("missing %PDF header (starts with {head:?})")
    };
    Err(TranslateError::UnsupportedFormat {
        path: path.to_path_buf(),
        reason,
    })
}

/// Last URL path segment that looks like a file name.
fn filename_from_url(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return sanitize_filename(last);
                }
            }
        }
    }
    "downloaded.pdf".to_string()
}

/// Keep only the final component and replace characters that are unsafe in
/// file names.
pub fn sanitize_filename(name: &str) -> String {
    let last = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = last
        .chars()
        .map(|c| {
            if c.is_control() || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|') {
                '_'
            } else {
                c
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c: char| c == '.' || c.is_whitespace());
    if cleaned.is_empty() {
        "document.pdf".to_string()
    } else {
        cleaned.to_string()
    }
}
