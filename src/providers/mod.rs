//! Concrete network services behind the pipeline's service traits.
//!
//! The pipeline only sees [`crate::pipeline::gate::LanguageDetector`] and
//! [`crate::pipeline::translate::TranslationProvider`]; anything that speaks
//! those two traits can be plugged in. This module ships the Google Cloud
//! Translation v2 client, which implements both.

pub mod google;

pub use google::GoogleTranslate;
