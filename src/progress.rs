//! Progress-callback trait for per-block translation events.
//!
//! Inject an [`Arc<dyn TranslationProgressCallback>`] via
//! [`crate::config::TranslationConfigBuilder::progress_callback`] to receive
//! events as the pipeline validates and translates each block.
//!
//! Callbacks are the least-invasive integration point: callers can forward
//! events to a channel, a WebSocket, or a terminal progress bar without the
//! library knowing how the host application communicates.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf_translate::{TranslationConfig, TranslationProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl TranslationProgressCallback for CountingCallback {
//!     fn on_block_complete(&self, page_index: usize, block_index: usize, translated_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("page {} block {} done ({} chars)", page_index + 1, block_index, translated_len);
//!     }
//! }
//!
//! let config = TranslationConfig::builder()
//!     .source_language("en")
//!     .target_language("fr")
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes each block.
///
/// All methods have default no-op implementations. With
/// `concurrency > 1` the per-block methods may be called from several tasks
/// at once, so shared state needs synchronisation.
pub trait TranslationProgressCallback: Send + Sync {
    /// Called once after extraction, before any block is validated.
    fn on_run_start(&self, total_blocks: usize) {
        let _ = total_blocks;
    }

    /// Called before a block is validated.
    fn on_block_start(&self, page_index: usize, block_index: usize) {
        let _ = (page_index, block_index);
    }

    /// Called when a block has been translated.
    fn on_block_complete(&self, page_index: usize, block_index: usize, translated_len: usize) {
        let _ = (page_index, block_index, translated_len);
    }

    /// Called when a block fails validation or translation.
    fn on_block_error(&self, page_index: usize, block_index: usize, error: &str) {
        let _ = (page_index, block_index, error);
    }

    /// Called once after the last block, whether or not the run succeeded.
    fn on_run_complete(&self, total_blocks: usize, translated: usize) {
        let _ = (total_blocks, translated);
    }
}

/// A no-op implementation; the default when no callback is configured.
pub struct NoopProgressCallback;

impl TranslationProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::TranslationConfig`].
pub type ProgressCallback = Arc<dyn TranslationProgressCallback>;
