//! Configuration types for document translation.
//!
//! All run behaviour is controlled through [`TranslationConfig`], built via
//! its [`TranslationConfigBuilder`]. Service handles (detector, translator,
//! storage) are *not* part of the config: they are constructed once per
//! process and injected into [`crate::process::Pipeline`], so one config can
//! be reused across pipelines and vice versa.

use crate::error::TranslateError;
use crate::language::normalize_code;
use crate::pipeline::chunk::DEFAULT_MAX_CHARS;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Configuration for one translation run.
///
/// # Example
/// ```rust
/// use edgequake_pdf_translate::{OutputMode, TranslationConfig};
///
/// let config = TranslationConfig::builder()
///     .source_language("ja")
///     .target_language("Vietnamese")
///     .output_mode(OutputMode::Overlay)
///     .build()
///     .unwrap();
/// assert_eq!(config.target_language, "vi");
/// ```
#[derive(Clone)]
pub struct TranslationConfig {
    /// Expected language of the source text (canonical code). Default: "en".
    pub source_language: String,

    /// Language to translate into (canonical code). Default: "vi".
    pub target_language: String,

    /// Which reconstructor produces the output. Default: [`OutputMode::Flow`].
    pub output_mode: OutputMode,

    /// Directory that receives output documents. Default: `docs`.
    pub output_dir: PathBuf,

    /// Per-request character limit of the provider. Default: 5000.
    ///
    /// Blocks longer than this are split at word boundaries and the
    /// translated pieces joined with single spaces.
    pub max_chars: usize,

    /// Blocks validated and translated at once. Default: 1.
    ///
    /// Results are always reassembled in extraction order. Values above 1
    /// allow translation of block *n+1* to start before block *n* has
    /// finished; a mismatch still aborts the run and discards everything.
    pub concurrency: usize,

    /// Per-call timeout for detection and translation, in seconds. Default: 30.
    pub api_timeout_secs: u64,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// What to do when a block is not in `source_language`.
    pub mismatch_policy: MismatchPolicy,

    /// Optional per-block progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            source_language: "en".to_string(),
            target_language: "vi".to_string(),
            output_mode: OutputMode::default(),
            output_dir: PathBuf::from("docs"),
            max_chars: DEFAULT_MAX_CHARS,
            concurrency: 1,
            api_timeout_secs: 30,
            download_timeout_secs: 120,
            mismatch_policy: MismatchPolicy::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for TranslationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TranslationConfig")
            .field("source_language", &self.source_language)
            .field("target_language", &self.target_language)
            .field("output_mode", &self.output_mode)
            .field("output_dir", &self.output_dir)
            .field("max_chars", &self.max_chars)
            .field("concurrency", &self.concurrency)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("mismatch_policy", &self.mismatch_policy)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn TranslationProgressCallback>"),
            )
            .finish()
    }
}

impl TranslationConfig {
    /// Create a new builder for `TranslationConfig`.
    pub fn builder() -> TranslationConfigBuilder {
        TranslationConfigBuilder {
            config: Self::default(),
            source_raw: None,
            target_raw: None,
        }
    }
}

/// Builder for [`TranslationConfig`].
///
/// Language inputs are kept raw until [`build`](Self::build) so an invalid
/// name is reported as an error rather than silently replaced.
#[derive(Debug)]
pub struct TranslationConfigBuilder {
    config: TranslationConfig,
    source_raw: Option<String>,
    target_raw: Option<String>,
}

impl TranslationConfigBuilder {
    pub fn source_language(mut self, lang: impl Into<String>) -> Self {
        self.source_raw = Some(lang.into());
        self
    }

    pub fn target_language(mut self, lang: impl Into<String>) -> Self {
        self.target_raw = Some(lang.into());
        self
    }

    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.config.output_mode = mode;
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn max_chars(mut self, n: usize) -> Self {
        self.config.max_chars = n.max(1);
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn mismatch_policy(mut self, policy: MismatchPolicy) -> Self {
        self.config.mismatch_policy = policy;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<TranslationConfig, TranslateError> {
        if let Some(raw) = self.source_raw.take() {
            self.config.source_language = normalize_code(&raw)?;
        }
        if let Some(raw) = self.target_raw.take() {
            self.config.target_language = normalize_code(&raw)?;
        }

        let c = &self.config;
        if c.api_timeout_secs == 0 {
            return Err(TranslateError::InvalidConfig(
                "API timeout must be ≥ 1 second".into(),
            ));
        }
        if c.source_language == c.target_language {
            return Err(TranslateError::InvalidConfig(format!(
                "source and target language are both '{}'",
                c.source_language
            )));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Output form of a translated document.
///
/// | Mode | Output | Keeps |
/// |------|--------|-------|
/// | Flow | `.docx` | every block's text and font; no page geometry |
/// | Overlay | `.pdf` | page geometry, images, original text on a hidden layer |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    #[default]
    Flow,
    Overlay,
}

impl OutputMode {
    /// File extension of the produced document.
    pub fn extension(self) -> &'static str {
        match self {
            OutputMode::Flow => "docx",
            OutputMode::Overlay => "pdf",
        }
    }

    /// MIME type of the produced document.
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputMode::Flow => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            OutputMode::Overlay => "application/pdf",
        }
    }
}

/// Handling of blocks whose detected language differs from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MismatchPolicy {
    /// Stop at the first mismatch and return `Failure`. (default)
    #[default]
    FailFast,
    /// Leave mismatched blocks out of the output, keep going, and report
    /// every mismatch on `Success`.
    CollectWarnings,
}
