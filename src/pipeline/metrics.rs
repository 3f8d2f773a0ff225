//! Approximate glyph metrics for the standard Helvetica face.
//!
//! Used in two places: the loader estimates how far each text run advances
//! (source fonts are rarely embedded with usable width tables), and the
//! overlay layout measures translated text it is about to draw in Helvetica.
//! Widths are in 1/1000 em, taken from the Adobe core-14 AFM for ASCII.

/// Advance width of `c` in 1/1000 em.
pub fn char_width(c: char) -> u16 {
    match c {
        ' ' | '!' | ',' | '.' | '/' | ':' | ';' | '[' | '\\' | ']' | 'f' | 't' | 'I' => 278,
        '"' => 355,
        '#' | '$' | '0'..='9' | '?' | '_' => 556,
        '%' => 889,
        '&' => 667,
        '\'' => 191,
        '(' | ')' | '-' | '`' | 'r' => 333,
        '*' => 389,
        '+' | '<' | '=' | '>' | '~' => 584,
        '@' => 1015,
        'A' | 'B' | 'E' | 'K' | 'P' | 'S' | 'V' | 'X' | 'Y' => 667,
        'C' | 'D' | 'H' | 'N' | 'R' | 'U' => 722,
        'F' | 'T' | 'Z' => 611,
        'G' | 'O' | 'Q' => 778,
        'J' | 'c' | 'k' | 's' | 'v' | 'x' | 'y' | 'z' => 500,
        'L' | 'a' | 'b' | 'd' | 'e' | 'g' | 'h' | 'n' | 'o' | 'p' | 'q' | 'u' => 556,
        'M' | 'm' => 833,
        'W' => 944,
        '^' => 469,
        'i' | 'j' | 'l' => 222,
        'w' => 722,
        '{' | '}' => 334,
        '|' => 260,
        '\u{2014}' | '\u{2026}' => 1000,
        '\u{2013}' | '\u{20AC}' => 556,
        '\u{2018}' | '\u{2019}' | '\u{201A}' => 222,
        '\u{201C}' | '\u{201D}' | '\u{201E}' => 333,
        c if is_wide(c) => 1000,
        c if c.is_uppercase() => 667,
        _ => 556,
    }
}

/// Width of `text` at `font_size`, in points.
pub fn text_width(text: &str, font_size: f32) -> f32 {
    let units: u32 = text.chars().map(|c| char_width(c) as u32).sum();
    units as f32 * font_size / 1000.0
}

/// East-Asian wide characters occupy a full em.
fn is_wide(c: char) -> bool {
    matches!(c as u32,
        0x1100..=0x115F
        | 0x2E80..=0xA4CF
        | 0xAC00..=0xD7A3
        | 0xF900..=0xFAFF
        | 0xFE30..=0xFE4F
        | 0xFF00..=0xFF60
        | 0xFFE0..=0xFFE6
        | 0x20000..=0x3FFFD)
}
