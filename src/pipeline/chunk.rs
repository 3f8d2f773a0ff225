//! Word-boundary chunking for provider request limits.
//!
//! Translation APIs cap the size of one request (5 000 characters for
//! Google Cloud Translation v2). Long blocks are cut into segments that each
//! fit, splitting only between words so no word is ever torn in half.

/// Provider per-request character limit.
pub const DEFAULT_MAX_CHARS: usize = 5000;

/// Split `text` into whitespace-delimited segments of at most `max_chars`
/// characters each.
///
/// Greedy: words are appended to the current segment (with one separating
/// space) until the next word would push it past `max_chars`. A word longer
/// than `max_chars` on its own becomes its own segment, untruncated.
/// Joining the result with single spaces reproduces the input's word
/// sequence. Lengths are counted in `char`s, not bytes.
pub fn split(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        let needed = if current_len == 0 { word_len } else { word_len + 1 };

        if current_len > 0 && current_len + needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if current_len > 0 {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(word);
        current_len += word_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// True when `text` must be split before it is sent.
pub fn needs_split(text: &str, max_chars: usize) -> bool {
    text.chars().count() > max_chars
}
