//! Language gate: check that a block is written in the expected language
//! before any translation work is spent on it.
//!
//! Detection is delegated to a [`LanguageDetector`] (a network service in
//! production, a fake in tests). The gate adds the policy around it:
//! empty text is vacuously valid and never reaches the detector, codes are
//! compared by primary subtag, and each call carries a timeout.

use crate::error::TranslateError;
use crate::language::same_language;
use crate::output::{BlockRef, Warning};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// A language-detection service.
#[async_trait]
pub trait LanguageDetector: Send + Sync {
    /// Return the language code of `text`.
    ///
    /// Fails with [`TranslateError::DetectionUnavailable`] when the service
    /// cannot answer.
    async fn detect(&self, text: &str) -> Result<String, TranslateError>;
}

/// Validates block text against an expected source language.
#[derive(Clone)]
pub struct LanguageGate {
    detector: Arc<dyn LanguageDetector>,
    timeout: Duration,
}

impl LanguageGate {
    pub fn new(detector: Arc<dyn LanguageDetector>, timeout: Duration) -> Self {
        Self { detector, timeout }
    }

    /// Detect the language of `text`, bounded by the gate's timeout.
    pub async fn detect(&self, text: &str) -> Result<String, TranslateError> {
        match tokio::time::timeout(self.timeout, self.detector.detect(text)).await {
            Ok(result) => result,
            Err(_) => Err(TranslateError::Timeout {
                operation: "language detection".to_string(),
                secs: self.timeout.as_secs(),
            }),
        }
    }

    /// Return a warning when `text` is not in `expected`.
    ///
    /// Blank text yields `Ok(None)` without a detection call.
    pub async fn validate(
        &self,
        text: &str,
        expected: &str,
        block: BlockRef,
    ) -> Result<Option<Warning>, TranslateError> {
        if text.trim().is_empty() {
            return Ok(None);
        }

        let detected = self.detect(text).await?;
        debug!(
            "Page {} block {}: detected '{}', expected '{}'",
            block.page_index + 1,
            block.block_index,
            detected,
            expected
        );

        if same_language(&detected, expected) {
            Ok(None)
        } else {
            Ok(Some(Warning::language_mismatch(detected, expected, block)))
        }
    }
}
