//! Orchestrator: one document in, one translated document (or a list of
//! warnings) out.
//!
//! ```text
//! stage ─▶ load ─▶ extract ─▶ ┌ validate ─▶ translate ┐ ─▶ reconstruct ─▶ write ─▶ upload/record
//!                             └──── per block, ordered ┘
//! ```
//!
//! ## Why a `Pipeline` value?
//!
//! The detector, translator, and storage clients are built once per process
//! and injected here, so repeated runs reuse their connection pools and tests
//! swap them for fakes. A `Pipeline` holds only `Arc` handles and is cheap to
//! clone; one instance can serve many concurrent `process` calls.
//!
//! ## Failure model
//!
//! - A language mismatch under [`MismatchPolicy::FailFast`] ends the run with
//!   [`PipelineResult::Failure`]. Nothing is written; blocks already
//!   translated are discarded.
//! - A detection or translation error ends the run with `Err`. The pipeline
//!   never retries.
//! - Storage failures are collected into `Success.storage_errors`.
//!
//! The staged input lives in a `TempDir` owned by this call, so it is removed
//! on every one of those exits.

use crate::config::{MismatchPolicy, OutputMode, TranslationConfig};
use crate::document::{TextBlock, TranslatedBlock};
use crate::error::{StorageError, TranslateError};
use crate::output::{BlockRef, PipelineResult, RunStats, Warning};
use crate::pipeline::flow::{FlowBlock, FlowDocument};
use crate::pipeline::gate::{LanguageDetector, LanguageGate};
use crate::pipeline::input::{self, StagedInput};
use crate::pipeline::overlay::OverlayWriter;
use crate::pipeline::translate::{TranslationClient, TranslationProvider};
use crate::pipeline::{extract, load};
use crate::storage::{FileRecord, FileSource, MetadataStore, ObjectStore};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Injected services for translation runs.
#[derive(Clone)]
pub struct Pipeline {
    detector: Arc<dyn LanguageDetector>,
    translator: Arc<dyn TranslationProvider>,
    object_store: Option<Arc<dyn ObjectStore>>,
    metadata_store: Option<Arc<dyn MetadataStore>>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("translator", &self.translator.name())
            .field("object_store", &self.object_store.is_some())
            .field("metadata_store", &self.metadata_store.is_some())
            .finish()
    }
}

/// What happened to one block in the validate/translate stage.
enum BlockStep {
    Translated {
        block: TranslatedBlock,
        requests: usize,
    },
    Mismatch(Warning),
}

impl Pipeline {
    pub fn new(
        detector: Arc<dyn LanguageDetector>,
        translator: Arc<dyn TranslationProvider>,
    ) -> Self {
        Self {
            detector,
            translator,
            object_store: None,
            metadata_store: None,
        }
    }

    /// Upload every output document after it is written.
    pub fn with_object_store(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.object_store = Some(store);
        self
    }

    /// Record the source and the output document after each run.
    pub fn with_metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata_store = Some(store);
        self
    }

    /// Translate the document at `input`, a local path or an HTTP(S) URL.
    ///
    /// # Errors
    /// `Err` for fatal problems only: unreadable or unsupported input,
    /// detection/translation failures, and local write failures. A language
    /// mismatch is `Ok(PipelineResult::Failure)`.
    pub async fn process(
        &self,
        input: impl AsRef<str>,
        config: &TranslationConfig,
    ) -> Result<PipelineResult, TranslateError> {
        let start = Instant::now();
        let input = input.as_ref();
        info!(
            "Translating {} ({} → {}, {:?})",
            input, config.source_language, config.target_language, config.output_mode
        );
        let staged = input::stage(input, config.download_timeout_secs).await?;
        self.run(&staged, config, start).await
    }

    /// Translate an in-memory document. `filename` names the outputs.
    pub async fn process_bytes(
        &self,
        bytes: &[u8],
        filename: &str,
        config: &TranslationConfig,
    ) -> Result<PipelineResult, TranslateError> {
        let start = Instant::now();
        info!(
            "Translating {} bytes as '{}' ({} → {})",
            bytes.len(),
            filename,
            config.source_language,
            config.target_language
        );
        let staged = input::stage_bytes(bytes, filename).await?;
        self.run(&staged, config, start).await
    }

    /// Blocking wrapper around [`process`](Self::process).
    ///
    /// Creates a temporary tokio runtime internally; do not call from inside
    /// an async context.
    pub fn process_sync(
        &self,
        input: impl AsRef<str>,
        config: &TranslationConfig,
    ) -> Result<PipelineResult, TranslateError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| TranslateError::Internal(format!("Failed to create tokio runtime: {e}")))?
            .block_on(self.process(input, config))
    }

    async fn run(
        &self,
        staged: &StagedInput,
        config: &TranslationConfig,
        start: Instant,
    ) -> Result<PipelineResult, TranslateError> {
        // ── Step 1: Load and extract ─────────────────────────────────────
        let doc = load::load(staged.path()).await?;
        let blocks: Vec<TextBlock> = extract::extract(&doc).collect();
        let total = blocks.len();
        info!("{} pages, {} text blocks", doc.page_count(), total);

        let progress = config.progress_callback.clone();
        if let Some(cb) = &progress {
            cb.on_run_start(total);
        }

        // ── Step 2: Validate and translate ───────────────────────────────
        let translated = self.translate_blocks(blocks, config).await;
        let translated_count = translated
            .as_ref()
            .map(|t| t.blocks.len())
            .unwrap_or_default();
        if let Some(cb) = &progress {
            cb.on_run_complete(total, translated_count);
        }
        let translated = translated?;

        if config.mismatch_policy == MismatchPolicy::FailFast && !translated.warnings.is_empty() {
            info!(
                "Stopped at language mismatch: {}",
                translated.warnings[0]
            );
            return Ok(PipelineResult::Failure {
                warnings: translated.warnings,
            });
        }

        // ── Step 3: Reconstruct ──────────────────────────────────────────
        let (bytes, layout_skipped) = reconstruct(
            config.output_mode,
            staged.path().to_path_buf(),
            translated.blocks,
            config.target_language.clone(),
            staged.stem().to_string(),
        )
        .await?;

        // ── Step 4: Write ────────────────────────────────────────────────
        let file_name = output_file_name(
            staged.stem(),
            &config.target_language,
            config.output_mode.extension(),
        );
        let output_path = write_atomic(&config.output_dir, &file_name, &bytes).await?;
        info!("Wrote {} ({} bytes)", output_path.display(), bytes.len());

        // ── Step 5: Hand off to collaborators ────────────────────────────
        let mut storage_errors = Vec::new();
        let cloud_url = self.upload(&output_path, &mut storage_errors).await;
        self.record(staged, &output_path, cloud_url.as_deref(), &mut storage_errors)
            .await;

        let stats = RunStats {
            pages: doc.page_count(),
            blocks_total: total,
            blocks_translated: translated_count,
            blocks_excluded: translated.warnings.len(),
            chunks_sent: translated.requests,
            layout_skipped,
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Translation complete: {}/{} blocks, {} requests, {}ms",
            stats.blocks_translated, stats.blocks_total, stats.chunks_sent, stats.duration_ms
        );

        Ok(PipelineResult::Success {
            output_path,
            cloud_url,
            warnings: translated.warnings,
            storage_errors,
            stats,
        })
    }

    /// Run every block through the gate and the translator, in order.
    ///
    /// Under fail-fast the returned `warnings` holds at most one entry and
    /// `blocks` is whatever was translated before it; the caller discards
    /// both.
    async fn translate_blocks(
        &self,
        blocks: Vec<TextBlock>,
        config: &TranslationConfig,
    ) -> Result<Translated, TranslateError> {
        let timeout = Duration::from_secs(config.api_timeout_secs);
        let gate = LanguageGate::new(Arc::clone(&self.detector), timeout);
        let client = TranslationClient::new(Arc::clone(&self.translator), timeout, config.max_chars);
        let source = config.source_language.as_str();
        let target = config.target_language.as_str();
        let progress = config.progress_callback.as_ref();

        let steps = stream::iter(blocks.into_iter().map(|block| {
            let gate = &gate;
            let client = &client;
            async move {
                let at = BlockRef {
                    page_index: block.page_index,
                    block_index: block.block_index,
                };
                if let Some(cb) = progress {
                    cb.on_block_start(at.page_index, at.block_index);
                }

                let checked = gate.validate(&block.text, source, at).await;
                let warning = match checked {
                    Ok(w) => w,
                    Err(e) => {
                        if let Some(cb) = progress {
                            cb.on_block_error(at.page_index, at.block_index, &e.to_string());
                        }
                        return Err(e);
                    }
                };
                if let Some(w) = warning {
                    if let Some(cb) = progress {
                        cb.on_block_error(at.page_index, at.block_index, &w.to_string());
                    }
                    return Ok(BlockStep::Mismatch(w));
                }

                match client.translate_text(&block.text, target).await {
                    Ok(t) => {
                        debug!(
                            "Page {} block {}: {} → {} chars",
                            at.page_index + 1,
                            at.block_index,
                            block.text.chars().count(),
                            t.text.chars().count()
                        );
                        if let Some(cb) = progress {
                            cb.on_block_complete(at.page_index, at.block_index, t.text.len());
                        }
                        Ok(BlockStep::Translated {
                            block: TranslatedBlock {
                                block,
                                translated_text: t.text,
                            },
                            requests: t.requests,
                        })
                    }
                    Err(e) => {
                        if let Some(cb) = progress {
                            cb.on_block_error(at.page_index, at.block_index, &e.to_string());
                        }
                        Err(e)
                    }
                }
            }
        }))
        .buffered(config.concurrency.max(1));
        let mut steps = std::pin::pin!(steps);

        let mut out = Translated::default();
        while let Some(step) = steps.next().await {
            match step? {
                BlockStep::Translated { block, requests } => {
                    out.requests += requests;
                    out.blocks.push(block);
                }
                BlockStep::Mismatch(w) => {
                    warn!("{}", w);
                    out.warnings.push(w);
                    if config.mismatch_policy == MismatchPolicy::FailFast {
                        // Dropping the stream cancels any block still in flight.
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    async fn upload(&self, path: &Path, errors: &mut Vec<StorageError>) -> Option<String> {
        let store = self.object_store.as_ref()?;
        match store.upload(path).await {
            Ok(url) => {
                info!("Uploaded output to {}", url);
                Some(url)
            }
            Err(e) => {
                warn!("Upload failed, keeping local output only: {}", e);
                errors.push(e);
                None
            }
        }
    }

    async fn record(
        &self,
        staged: &StagedInput,
        output_path: &Path,
        cloud_url: Option<&str>,
        errors: &mut Vec<StorageError>,
    ) {
        let Some(store) = self.metadata_store.as_ref() else {
            return;
        };
        let source = FileRecord::for_path(
            Path::new(staged.original_name()),
            FileSource::Upload,
            Some(staged.original_name().to_string()),
        );
        let output = FileRecord::for_path(
            output_path,
            FileSource::Translated,
            cloud_url.map(str::to_string),
        );
        for record in [source, output] {
            if let Err(e) = store.record(record).await {
                warn!("Metadata record failed: {}", e);
                errors.push(e);
            }
        }
    }
}

#[derive(Default)]
struct Translated {
    blocks: Vec<TranslatedBlock>,
    warnings: Vec<Warning>,
    requests: usize,
}

/// Build the output document bytes. Returns the count of overlay blocks
/// whose text could not be placed.
async fn reconstruct(
    mode: OutputMode,
    source: PathBuf,
    blocks: Vec<TranslatedBlock>,
    target_language: String,
    title: String,
) -> Result<(Vec<u8>, usize), TranslateError> {
    tokio::task::spawn_blocking(move || match mode {
        OutputMode::Flow => {
            let flow: Vec<FlowBlock> = blocks.iter().map(FlowBlock::from).collect();
            let bytes = FlowDocument::build(&flow)
                .with_language(target_language)
                .with_title(title)
                .to_bytes()?;
            Ok((bytes, 0))
        }
        OutputMode::Overlay => {
            let mut writer = OverlayWriter::open(&source)?;
            let report = writer.apply(&blocks, &target_language)?;
            Ok((writer.to_bytes()?, report.skipped()))
        }
    })
    .await
    .map_err(|e| TranslateError::Internal(format!("reconstruction task panicked: {e}")))?
}

/// `<stem>-<target>-<uuid>.<ext>`; the UUID keeps concurrent runs on the
/// same input from colliding.
pub fn output_file_name(stem: &str, target_language: &str, extension: &str) -> String {
    format!("{stem}-{target_language}-{}.{extension}", uuid::Uuid::new_v4())
}

/// Write via a temp file in the same directory and rename, so a reader
/// never sees a partial document.
async fn write_atomic(dir: &Path, file_name: &str, bytes: &[u8]) -> Result<PathBuf, TranslateError> {
    let path = dir.join(file_name);
    let write_failed = |source: std::io::Error| TranslateError::OutputWriteFailed {
        path: path.clone(),
        source,
    };

    tokio::fs::create_dir_all(dir).await.map_err(write_failed)?;
    let tmp_path = dir.join(format!(".{file_name}.tmp"));
    if let Err(e) = tokio::fs::write(&tmp_path, bytes).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(write_failed(e));
    }
    Ok(path)
}
