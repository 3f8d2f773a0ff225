//! Language-code normalisation.
//!
//! Users type `"French"`, `"FR"`, or `"fr-CA"`; providers answer with
//! `"fr"`. Everything the pipeline compares goes through
//! [`normalize_code`] first so a mismatch means a different language, not a
//! different spelling of the same one.

use crate::error::TranslateError;

/// ISO 639-1 codes (plus the Chinese script variants providers use) with
/// English names.
pub const LANGUAGES: &[(&str, &str)] = &[
    ("af", "afrikaans"),
    ("ar", "arabic"),
    ("bg", "bulgarian"),
    ("bn", "bengali"),
    ("ca", "catalan"),
    ("cs", "czech"),
    ("da", "danish"),
    ("de", "german"),
    ("el", "greek"),
    ("en", "english"),
    ("es", "spanish"),
    ("et", "estonian"),
    ("fa", "persian"),
    ("fi", "finnish"),
    ("fr", "french"),
    ("he", "hebrew"),
    ("hi", "hindi"),
    ("hr", "croatian"),
    ("hu", "hungarian"),
    ("id", "indonesian"),
    ("it", "italian"),
    ("ja", "japanese"),
    ("ko", "korean"),
    ("lt", "lithuanian"),
    ("lv", "latvian"),
    ("ms", "malay"),
    ("nl", "dutch"),
    ("no", "norwegian"),
    ("pl", "polish"),
    ("pt", "portuguese"),
    ("ro", "romanian"),
    ("ru", "russian"),
    ("sk", "slovak"),
    ("sl", "slovenian"),
    ("sr", "serbian"),
    ("sv", "swedish"),
    ("sw", "swahili"),
    ("ta", "tamil"),
    ("th", "thai"),
    ("tl", "filipino"),
    ("tr", "turkish"),
    ("uk", "ukrainian"),
    ("ur", "urdu"),
    ("vi", "vietnamese"),
    ("zh-cn", "chinese (simplified)"),
    ("zh-tw", "chinese (traditional)"),
];

/// Resolve a code or English language name to its canonical code.
///
/// Region subtags are dropped (`en-US` → `en`) except for the Chinese
/// script variants, which providers treat as distinct targets.
pub fn normalize_code(input: &str) -> Result<String, TranslateError> {
    let lowered = input.trim().to_lowercase().replace('_', "-");
    if lowered.is_empty() {
        return Err(TranslateError::InvalidLanguage {
            input: input.to_string(),
        });
    }

    if let Some((code, _)) = LANGUAGES.iter().find(|(code, _)| *code == lowered) {
        return Ok((*code).to_string());
    }

    if let Some((code, _)) = LANGUAGES.iter().find(|(_, name)| *name == lowered) {
        return Ok((*code).to_string());
    }

    match lowered.as_str() {
        "zh" | "zh-hans" | "chinese" => return Ok("zh-cn".to_string()),
        "zh-hant" => return Ok("zh-tw".to_string()),
        "iw" => return Ok("he".to_string()),
        _ => {}
    }

    if let Some((primary, _)) = lowered.split_once('-') {
        if let Some((code, _)) = LANGUAGES.iter().find(|(code, _)| *code == primary) {
            return Ok((*code).to_string());
        }
    }

    Err(TranslateError::InvalidLanguage {
        input: input.to_string(),
    })
}

/// Compare two language codes by primary subtag, ignoring case.
///
/// Unknown codes are compared verbatim so a detector that answers `"und"`
/// never silently matches.
pub fn same_language(a: &str, b: &str) -> bool {
    primary_subtag(a) == primary_subtag(b)
}

fn primary_subtag(code: &str) -> String {
    let lowered = code.trim().to_lowercase().replace('_', "-");
    let primary = lowered.split('-').next().unwrap_or_default();
    match primary {
        "iw" => "he".to_string(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_codes_names_and_regions() {
        assert_eq!(normalize_code("EN").unwrap(), "en");
        assert_eq!(normalize_code("French").unwrap(), "fr");
        assert_eq!(normalize_code("pt-BR").unwrap(), "pt");
        assert_eq!(normalize_code("zh_TW").unwrap(), "zh-tw");
        assert_eq!(normalize_code("zh").unwrap(), "zh-cn");
    }

    #[test]
    fn rejects_unknown() {
        assert!(matches!(
            normalize_code("klingon"),
            Err(TranslateError::InvalidLanguage { .. })
        ));
        assert!(normalize_code("  ").is_err());
    }

    #[test]
    fn same_language_ignores_region_and_case() {
        assert!(same_language("en", "en-US"));
        assert!(same_language("JA", "ja"));
        assert!(same_language("iw", "he"));
        assert!(!same_language("en", "fr"));
        assert!(!same_language("und", "en"));
    }
}
