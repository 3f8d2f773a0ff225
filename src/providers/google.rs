//! Google Cloud Translation (v2 REST) client.
//!
//! Translation is `POST {endpoint}?key=…` with `{q, target, format: "text"}`;
//! detection is `POST {endpoint}/detect?key=…` with `{q}`. Response parsing
//! is split into pure functions so every status and payload shape is unit
//! tested without a network.
//!
//! The API key only ever travels in the query string, and `reqwest` errors
//! are stripped of their URL before they reach an error message or a log.

use crate::error::TranslateError;
use crate::pipeline::gate::LanguageDetector;
use crate::pipeline::translate::TranslationProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Public Cloud Translation v2 endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://translation.googleapis.com/language/translate/v2";

const PROVIDER: &str = "google";

/// Client for Cloud Translation v2. Cheap to clone.
#[derive(Clone)]
pub struct GoogleTranslate {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    timeout: Duration,
}

impl std::fmt::Debug for GoogleTranslate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleTranslate")
            .field("endpoint", &self.endpoint)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

impl GoogleTranslate {
    /// Client for the public endpoint with a per-request timeout.
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, TranslateError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TranslateError::InvalidConfig(format!("HTTP client: {}", e.without_url())))?;
        Ok(Self {
            client,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: api_key.into(),
            timeout,
        })
    }

    /// Point the client at another base URL (proxies, test servers).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<(u16, Option<u64>, String), reqwest::Error> {
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let text = response.text().await?;
        Ok((status, retry_after, text))
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TranslateRequest<'a> {
    q: &'a str,
    target: &'a str,
    format: &'a str,
}

#[derive(Serialize)]
struct DetectRequest<'a> {
    q: &'a str,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: Option<T>,
    error: Option<ApiError>,
}

#[derive(Deserialize)]
struct ApiError {
    message: String,
}

#[derive(Deserialize)]
struct TranslateData {
    translations: Vec<TranslationItem>,
}

#[derive(Deserialize)]
struct TranslationItem {
    #[serde(rename = "translatedText")]
    translated_text: String,
}

#[derive(Deserialize)]
struct DetectData {
    detections: Vec<Vec<DetectionItem>>,
}

#[derive(Deserialize)]
struct DetectionItem {
    language: String,
}

// ── Response parsing ─────────────────────────────────────────────────────

fn api_message(body: &str) -> String {
    serde_json::from_str::<Envelope<serde_json::Value>>(body)
        .ok()
        .and_then(|e| e.error)
        .map(|e| e.message)
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Interpret a translate response. The text is returned as sent by the API;
/// entity decoding happens in the translation client.
pub fn parse_translation(
    status: u16,
    retry_after_secs: Option<u64>,
    body: &str,
) -> Result<String, TranslateError> {
    if status == 429 {
        return Err(TranslateError::RateLimited {
            provider: PROVIDER.to_string(),
            retry_after_secs,
        });
    }
    if !(200..300).contains(&status) {
        return Err(TranslateError::ProviderError {
            message: format!("HTTP {status}: {}", api_message(body)),
        });
    }

    let envelope: Envelope<TranslateData> =
        serde_json::from_str(body).map_err(|e| TranslateError::ProviderError {
            message: format!("malformed response: {e}"),
        })?;
    envelope
        .data
        .and_then(|d| d.translations.into_iter().next())
        .map(|t| t.translated_text)
        .ok_or_else(|| TranslateError::ProviderError {
            message: "response has no data.translations[0].translatedText".to_string(),
        })
}

/// Interpret a detect response.
pub fn parse_detection(status: u16, body: &str) -> Result<String, TranslateError> {
    if !(200..300).contains(&status) {
        return Err(TranslateError::DetectionUnavailable {
            reason: format!("HTTP {status}: {}", api_message(body)),
        });
    }

    let envelope: Envelope<DetectData> =
        serde_json::from_str(body).map_err(|e| TranslateError::DetectionUnavailable {
            reason: format!("malformed response: {e}"),
        })?;
    let language = envelope
        .data
        .and_then(|d| d.detections.into_iter().next())
        .and_then(|candidates| candidates.into_iter().next())
        .map(|c| c.language)
        .ok_or_else(|| TranslateError::DetectionUnavailable {
            reason: "response has no detections".to_string(),
        })?;

    if language.is_empty() || language == "und" {
        return Err(TranslateError::DetectionUnavailable {
            reason: "language could not be determined".to_string(),
        });
    }
    Ok(language)
}

// ── Trait impls ──────────────────────────────────────────────────────────

#[async_trait]
impl TranslationProvider for GoogleTranslate {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn translate(&self, text: &str, target_language: &str) -> Result<String, TranslateError> {
        let request = TranslateRequest {
            q: text,
            target: target_language,
            format: "text",
        };
        let (status, retry_after, body) =
            self.post(&self.endpoint, &request).await.map_err(|e| {
                if e.is_timeout() {
                    TranslateError::Timeout {
                        operation: "google translation".to_string(),
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    TranslateError::ProviderError {
                        message: e.without_url().to_string(),
                    }
                }
            })?;
        debug!("google translate → HTTP {} ({} bytes)", status, body.len());
        parse_translation(status, retry_after, &body)
    }
}

#[async_trait]
impl LanguageDetector for GoogleTranslate {
    async fn detect(&self, text: &str) -> Result<String, TranslateError> {
        let url = format!("{}/detect", self.endpoint);
        let (status, _, body) = self
            .post(&url, &DetectRequest { q: text })
            .await
            .map_err(|e| TranslateError::DetectionUnavailable {
                reason: e.without_url().to_string(),
            })?;
        debug!("google detect → HTTP {}", status);
        parse_detection(status, &body)
    }
}
