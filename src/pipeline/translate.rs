//! Translation client: one provider call per chunk, with timeout and
//! entity decoding.
//!
//! The [`TranslationProvider`] trait is the narrow seam to the external
//! service; it knows nothing about chunking. [`TranslationClient`] wraps a
//! provider and owns the policies every caller needs:
//!
//! - each call is bounded by `api_timeout`; an elapsed timeout is reported
//!   as [`TranslateError::Timeout`], the same failure class as a provider
//!   error
//! - provider output is HTML-unescaped (`&amp;` → `&`, `&#39;` → `'`)
//! - text over `max_chars` is split at word boundaries and the translated
//!   pieces are joined with single spaces in original order

use crate::document::TranslationUnit;
use crate::error::TranslateError;
use crate::pipeline::chunk;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// An external translation service.
#[async_trait]
pub trait TranslationProvider: Send + Sync {
    /// Short identifier used in logs and errors (e.g. `"google"`).
    fn name(&self) -> &str;

    /// Translate `text` into `target_language`.
    ///
    /// May fail with [`TranslateError::ProviderError`],
    /// [`TranslateError::RateLimited`], or [`TranslateError::Timeout`].
    async fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslateError>;
}

/// Text translated through the client, with the number of provider calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Translation {
    pub text: String,
    pub requests: usize,
}

/// Provider wrapper applying timeout, chunking, and entity decoding.
#[derive(Clone)]
pub struct TranslationClient {
    provider: Arc<dyn TranslationProvider>,
    timeout: Duration,
    max_chars: usize,
}

impl TranslationClient {
    pub fn new(provider: Arc<dyn TranslationProvider>, timeout: Duration, max_chars: usize) -> Self {
        Self {
            provider,
            timeout,
            max_chars: max_chars.max(1),
        }
    }

    /// Translate one unit (a whole block or one chunk) with a single call.
    pub async fn translate(&self, unit: &TranslationUnit) -> Result<String, TranslateError> {
        if unit.source_text.trim().is_empty() {
            return Ok(String::new());
        }

        let call = self
            .provider
            .translate(&unit.source_text, &unit.target_language);
        let raw = match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TranslateError::Timeout {
                    operation: format!("{} translation", self.provider.name()),
                    secs: self.timeout.as_secs(),
                })
            }
        };

        Ok(decode_entities(&raw))
    }

    /// Translate text of any length, chunking when it exceeds `max_chars`.
    pub async fn translate_text(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<Translation, TranslateError> {
        if text.trim().is_empty() {
            return Ok(Translation {
                text: String::new(),
                requests: 0,
            });
        }

        if !chunk::needs_split(text, self.max_chars) {
            let translated = self
                .translate(&TranslationUnit {
                    source_text: text.to_string(),
                    target_language: target_language.to_string(),
                })
                .await?;
            return Ok(Translation {
                text: translated,
                requests: 1,
            });
        }

        let chunks = chunk::split(text, self.max_chars);
        debug!(
            "Splitting {} chars into {} chunks (limit {})",
            text.chars().count(),
            chunks.len(),
            self.max_chars
        );

        let mut translated = Vec::with_capacity(chunks.len());
        for piece in &chunks {
            let out = self
                .translate(&TranslationUnit {
                    source_text: piece.clone(),
                    target_language: target_language.to_string(),
                })
                .await?;
            translated.push(out);
        }

        Ok(Translation {
            text: translated.join(" "),
            requests: chunks.len(),
        })
    }

    /// Translate raw bytes, which must be UTF-8.
    pub async fn translate_bytes(
        &self,
        bytes: &[u8],
        target_language: &str,
    ) -> Result<Translation, TranslateError> {
        let text = String::from_utf8(bytes.to_vec())?;
        self.translate_text(&text, target_language).await
    }
}

/// Decode HTML entities the provider escaped.
pub fn decode_entities(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}
