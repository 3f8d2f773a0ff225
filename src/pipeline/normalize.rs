//! Text normalisation: deterministic cleanup of extracted block text.
//!
//! PDF text extraction yields artefacts that hurt both language detection
//! and translation quality:
//!
//! - words hyphenated across line breaks (`transla-\ntion`)
//! - line breaks inside Chinese or Japanese text, which has no word spaces
//! - invisible Unicode (zero-width spaces, BOM, soft hyphens)
//! - ragged whitespace from positioned glyph runs
//! - `\r\n` line endings from some producers
//!
//! Rules run in a fixed order: line endings first so dehyphenation sees
//! plain `\n`, invisible characters before whitespace collapsing so a
//! zero-width space between two spaces does not survive as a double space.

use once_cell::sync::Lazy;
use regex::Regex;

/// Apply all normalisation rules to a block's raw text.
///
/// 1. Normalise line endings (CRLF → LF)
/// 2. Join words hyphenated across a line break
/// 3. Drop line breaks between spaceless-script characters
/// 4. Strip invisible Unicode
/// 5. Collapse runs of whitespace (including newlines) to one space
/// 6. Trim
pub fn clean_block_text(input: &str) -> String {
    let s = normalise_line_endings(input);
    let s = dehyphenate(&s);
    let s = join_spaceless_lines(&s);
    let s = remove_invisible_chars(&s);
    let s = collapse_whitespace(&s);
    s.trim().to_string()
}

// ── Rule 1: Normalise line endings ───────────────────────────────────────────

fn normalise_line_endings(input: &str) -> String {
    input.replace("\r\n", "\n").replace('\r', "\n")
}

// ── Rule 2: Dehyphenate ──────────────────────────────────────────────────────

static RE_HYPHEN_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{L})-\n[ \t]*(\p{Ll})").unwrap());

static RE_COMPOUND_BREAK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\p{L})-\n[ \t]*(\p{Lu})").unwrap());

/// `"transla-\ntion"` → `"translation"`. A break before an upper-case letter
/// is a compound and keeps its hyphen: `"Jean-\nPaul"` → `"Jean-Paul"`.
fn dehyphenate(input: &str) -> String {
    let s = RE_HYPHEN_BREAK.replace_all(input, "$1$2");
    RE_COMPOUND_BREAK.replace_all(&s, "$1-$2").to_string()
}

// ── Rule 3: Join spaceless-script lines ─────────────────────────────────────

/// Chinese ideographs, kana and CJK punctuation. Hangul is excluded: Korean
/// separates words with spaces.
pub(crate) fn is_spaceless_script_char(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF
        | 0x3400..=0x4DBF
        | 0x20000..=0x2EBEF
        | 0x3040..=0x309F
        | 0x30A0..=0x30FF
        | 0x3000..=0x303F
        | 0xFF00..=0xFFEF)
}

fn join_spaceless_lines(input: &str) -> String {
    if !input.contains('\n') {
        return input.to_string();
    }
    let chars: Vec<char> = input.chars().collect();
    let blank = |c: &&char| matches!(c, ' ' | '\t');
    let mut out = String::with_capacity(input.len());
    let mut joined = false;
    for (i, &c) in chars.iter().enumerate() {
        if joined && matches!(c, ' ' | '\t') {
            continue;
        }
        joined = false;
        if c == '\n' {
            let before = chars[..i].iter().rev().find(|c| !blank(c));
            let after = chars[i + 1..].iter().find(|c| !blank(c));
            if let (Some(&b), Some(&a)) = (before, after) {
                if is_spaceless_script_char(b) && is_spaceless_script_char(a) {
                    while out.ends_with([' ', '\t']) {
                        out.pop();
                    }
                    joined = true;
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

// ── Rule 4: Remove invisible Unicode characters ─────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input.replace(
        [
            '\u{200B}', '\u{FEFF}', '\u{00AD}', '\u{200C}', '\u{200D}', '\u{2060}',
        ],
        "",
    )
}

// ── Rule 5: Collapse whitespace ─────────────────────────────────────────────

static RE_WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

fn collapse_whitespace(input: &str) -> String {
    RE_WHITESPACE.replace_all(input, " ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_hyphenated_line_break() {
        assert_eq!(clean_block_text("transla-\ntion works"), "translation works");
    }

    #[test]
    fn keeps_hyphen_before_capital() {
        assert_eq!(clean_block_text("Jean-\nPaul"), "Jean-Paul");
        assert_eq!(clean_block_text("Jean-\n  Paul Sartre"), "Jean-Paul Sartre");
    }

    #[test]
    fn crlf_hyphen_break() {
        assert_eq!(clean_block_text("docu-\r\nment"), "document");
    }

    #[test]
    fn strips_invisible_chars() {
        assert_eq!(clean_block_text("a\u{200B}b\u{FEFF}c"), "abc");
    }

    #[test]
    fn collapses_and_trims() {
        assert_eq!(clean_block_text("  Hello \n\n  world\t "), "Hello world");
    }

    #[test]
    fn spaceless_script_lines_join_without_space() {
        assert_eq!(clean_block_text("日本語の\nテキスト"), "日本語のテキスト");
        assert_eq!(clean_block_text("中文 \n 文本"), "中文文本");
    }

    #[test]
    fn mixed_script_line_break_keeps_space() {
        assert_eq!(clean_block_text("PDF\nファイル"), "PDF ファイル");
        assert_eq!(clean_block_text("한국어\n텍스트"), "한국어 텍스트");
    }

    #[test]
    fn empty_stays_empty() {
        assert_eq!(clean_block_text(""), "");
        assert_eq!(clean_block_text("\u{200B}  "), "");
    }
}
