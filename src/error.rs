//! Error types for the edgequake-pdf-translate library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`TranslateError`] — **Fatal** for the document: bad input, provider
//!   failure, detection outage. Returned as `Err(TranslateError)` from
//!   [`crate::process::Pipeline::process`]. The pipeline never retries; the
//!   caller decides whether the failure class is worth another attempt
//!   (see [`TranslateError::is_transient`]).
//!
//! * [`LayoutError`] — **Local** to one block in overlay mode: the translated
//!   text does not fit its bounding box. Recovered in place by skipping the
//!   text insertion; surfaces only as
//!   [`crate::pipeline::overlay::LayoutOutcome::Skipped`].
//!
//! * [`StorageError`] — **Non-fatal** collaborator failure (upload, metadata
//!   record). Reported next to a successful translation, never instead of it.
//!
//! A language mismatch is not an error at all: it is a
//! [`crate::output::Warning`] carried by
//! [`crate::output::PipelineResult::Failure`], because the caller fixes it by
//! changing input rather than by retrying.

use crate::output::ResponseKind;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-pdf-translate library.
#[derive(Debug, Error)]
pub enum TranslateError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a valid file path or URL.
    #[error("Invalid input '{input}': not a file path or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    /// Input is not a paginated document this crate can read.
    #[error("Unsupported format for '{path}': {reason}")]
    UnsupportedFormat { path: PathBuf, reason: String },

    // ── Language errors ───────────────────────────────────────────────────
    /// A language code or name could not be resolved.
    #[error("Invalid language '{input}'. Use an ISO 639-1 code such as 'en', 'fr', 'vi'.")]
    InvalidLanguage { input: String },

    /// The detection service could not classify the text.
    #[error("Language detection unavailable: {reason}")]
    DetectionUnavailable { reason: String },

    // ── Provider errors ───────────────────────────────────────────────────
    /// Translation provider returned a non-success status or malformed payload.
    #[error("Translation provider error: {message}")]
    ProviderError { message: String },

    /// Provider returned HTTP 429.
    #[error("Rate limit exceeded for provider '{provider}'")]
    RateLimited {
        provider: String,
        retry_after_secs: Option<u64>,
    },

    /// An external call exceeded its timeout.
    #[error("{operation} timed out after {secs}s")]
    Timeout { operation: String, secs: u64 },

    /// Input bytes could not be interpreted as UTF-8 text.
    #[error("Text is not valid UTF-8: {0}")]
    EncodingError(#[from] std::string::FromUtf8Error),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write the output document.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TranslateError {
    /// True for failures a caller may reasonably retry unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TranslateError::ProviderError { .. }
                | TranslateError::RateLimited { .. }
                | TranslateError::Timeout { .. }
                | TranslateError::DetectionUnavailable { .. }
                | TranslateError::DownloadTimeout { .. }
        )
    }

    /// Classify the error for the response boundary.
    pub fn response_kind(&self) -> ResponseKind {
        match self {
            TranslateError::UnsupportedFormat { .. } => ResponseKind::UnsupportedFormat,
            TranslateError::ProviderError { .. }
            | TranslateError::RateLimited { .. }
            | TranslateError::Timeout { .. }
            | TranslateError::DetectionUnavailable { .. } => ResponseKind::ProviderFailure,
            TranslateError::FileNotFound { .. }
            | TranslateError::PermissionDenied { .. }
            | TranslateError::InvalidInput { .. }
            | TranslateError::InvalidLanguage { .. }
            | TranslateError::EncodingError(_)
            | TranslateError::InvalidConfig(_) => ResponseKind::InvalidRequest,
            TranslateError::DownloadFailed { .. } | TranslateError::DownloadTimeout { .. } => {
                ResponseKind::ProviderFailure
            }
            TranslateError::OutputWriteFailed { .. } | TranslateError::Internal(_) => {
                ResponseKind::InternalError
            }
        }
    }
}

impl From<lopdf::Error> for TranslateError {
    fn from(err: lopdf::Error) -> Self {
        TranslateError::Internal(format!("PDF: {err}"))
    }
}

/// The translated text could not be placed inside its bounding box.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayoutError {
    /// The box is smaller than one line at the minimum font size.
    #[error("box {width:.1}x{height:.1}pt cannot hold a single line")]
    BoxTooSmall { width: f32, height: f32 },

    /// Wrapped text overflows the box even at the minimum font size.
    #[error("text needs {lines} lines at {font_size}pt, box holds {capacity}")]
    Overflow {
        lines: usize,
        capacity: usize,
        font_size: f32,
    },

    /// A single word is wider than the box at the minimum font size.
    #[error("word '{word}' is wider than the box")]
    WordTooWide { word: String },

    /// Most of the text has no glyph in the overlay font's encoding.
    #[error("{unencodable} of {total} characters cannot be drawn with the overlay font")]
    UnsupportedScript { unencodable: usize, total: usize },
}

/// A collaborator (object store, metadata store) failed.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum StorageError {
    /// Upload to object storage failed.
    #[error("upload of '{path}' failed: {reason}")]
    UploadFailed { path: String, reason: String },

    /// Persisting a file record failed.
    #[error("metadata record for '{filename}' failed: {reason}")]
    RecordFailed { filename: String, reason: String },
}
