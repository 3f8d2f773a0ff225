//! # edgequake-pdf-translate
//!
//! Translate PDF documents while keeping their text metadata or their page
//! layout.
//!
//! ## Why this crate?
//!
//! Copying text out of a PDF, translating it, and pasting it back loses two
//! things: the font each paragraph used, and where on the page it sat. This
//! crate keeps one or the other, by choice:
//!
//! - **flow** writes a `.docx` with one paragraph per source block, carrying
//!   the block's font family and size;
//! - **overlay** keeps the source PDF, paints over each block and draws the
//!   translation inside the same box on a toggleable layer named after the
//!   target language. Turning the layer off in a viewer shows the original.
//!
//! Every block is checked against the expected source language before it is
//! translated. By default the first mismatch stops the run and nothing is
//! written, so a document never comes out half in one language.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input      stage local file or URL download into a temp dir
//!  ├─ 2. Load       content streams → typed page tree (spawn_blocking)
//!  ├─ 3. Extract    page tree → ordered text blocks
//!  ├─ 4. Gate       detect language per block, stop on mismatch
//!  ├─ 5. Translate  chunk at 5000 chars, call provider, decode entities
//!  ├─ 6. Rebuild    DOCX (flow) or overlaid PDF (overlay)
//!  └─ 7. Output     atomic write, optional upload and metadata record
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_pdf_translate::{GoogleTranslate, OutputMode, Pipeline, TranslationConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let google = Arc::new(GoogleTranslate::new(
//!         std::env::var("GOOGLE_TRANSLATE_API_KEY")?,
//!         Duration::from_secs(30),
//!     )?);
//!     let pipeline = Pipeline::new(google.clone(), google);
//!
//!     let config = TranslationConfig::builder()
//!         .source_language("en")
//!         .target_language("fr")
//!         .output_mode(OutputMode::Overlay)
//!         .build()?;
//!
//!     let result = pipeline.process("paper.pdf", &config).await?;
//!     match result.output_path() {
//!         Some(path) => println!("{}", path.display()),
//!         None => eprintln!("{}", result.warnings()[0]),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdftrans` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-pdf-translate = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod language;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod progress;
pub mod providers;
pub mod storage;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{MismatchPolicy, OutputMode, TranslationConfig, TranslationConfigBuilder};
pub use document::{BoundingBox, ContentNode, Page, SourceDocument, TextBlock, TranslatedBlock};
pub use error::{LayoutError, StorageError, TranslateError};
pub use output::{BlockRef, PipelineResult, ResponseKind, RunStats, Warning, WarningKind};
pub use pipeline::gate::LanguageDetector;
pub use pipeline::translate::TranslationProvider;
pub use process::Pipeline;
pub use progress::{NoopProgressCallback, ProgressCallback, TranslationProgressCallback};
pub use providers::GoogleTranslate;
pub use storage::{FileRecord, FileSource, HttpObjectStore, JsonlMetadataStore, MetadataStore, ObjectStore};
