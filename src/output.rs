//! Result types returned by the pipeline.
//!
//! [`PipelineResult`] is constructed exactly once per
//! [`crate::process::Pipeline::process`] call and never mutated afterwards.
//! It is `Serialize` so HTTP front-ends can return it as JSON directly.

use crate::error::StorageError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Why a block was flagged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    LanguageMismatch,
}

/// Position of a block inside the source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockRef {
    pub page_index: usize,
    pub block_index: usize,
}

/// A precondition violation found while validating a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub detected: String,
    pub expected: String,
    pub block: BlockRef,
}

impl Warning {
    pub fn language_mismatch(
        detected: impl Into<String>,
        expected: impl Into<String>,
        block: BlockRef,
    ) -> Self {
        Self {
            kind: WarningKind::LanguageMismatch,
            detected: detected.into(),
            expected: expected.into(),
            block,
        }
    }
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Detected language is {}, but the selected language is {} (page {}, block {})",
            self.detected,
            self.expected,
            self.block.page_index + 1,
            self.block.block_index
        )
    }
}

/// Counters collected during a successful run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    pub pages: usize,
    pub blocks_total: usize,
    pub blocks_translated: usize,
    /// Blocks left out because of a mismatch under the lenient policy.
    pub blocks_excluded: usize,
    /// Provider requests issued (chunks count separately).
    pub chunks_sent: usize,
    /// Overlay blocks whose text did not fit (cover still painted).
    pub layout_skipped: usize,
    pub duration_ms: u64,
}

/// Outcome of one `process` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineResult {
    Success {
        output_path: PathBuf,
        cloud_url: Option<String>,
        /// Non-empty only under [`crate::config::MismatchPolicy::CollectWarnings`].
        warnings: Vec<Warning>,
        storage_errors: Vec<StorageError>,
        stats: RunStats,
    },
    Failure {
        warnings: Vec<Warning>,
    },
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineResult::Success { .. })
    }

    pub fn warnings(&self) -> &[Warning] {
        match self {
            PipelineResult::Success { warnings, .. } | PipelineResult::Failure { warnings } => {
                warnings
            }
        }
    }

    pub fn output_path(&self) -> Option<&PathBuf> {
        match self {
            PipelineResult::Success { output_path, .. } => Some(output_path),
            PipelineResult::Failure { .. } => None,
        }
    }

    pub fn response_kind(&self) -> ResponseKind {
        match self {
            PipelineResult::Success { .. } => ResponseKind::Success,
            PipelineResult::Failure { .. } => ResponseKind::ValidationFailure,
        }
    }
}

/// What the boundary tells the user, and therefore what they should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseKind {
    /// Output produced.
    Success,
    /// Language mismatch: fix the input or the selected language.
    ValidationFailure,
    /// Translation or detection service unavailable: retry later.
    ProviderFailure,
    /// The file cannot be processed at all: abandon.
    UnsupportedFormat,
    /// Bad arguments (missing file, unknown language, invalid config).
    InvalidRequest,
    /// Local failure (disk, internal bug).
    InternalError,
}

impl ResponseKind {
    /// Process exit code used by the CLI.
    pub fn exit_code(self) -> i32 {
        match self {
            ResponseKind::Success => 0,
            ResponseKind::InternalError => 1,
            ResponseKind::ValidationFailure => 2,
            ResponseKind::ProviderFailure => 3,
            ResponseKind::UnsupportedFormat => 4,
            ResponseKind::InvalidRequest => 64,
        }
    }
}
