//! Name normalization for merge comparisons and display.
//!
//! `normalized_name` is the aggressive comparison key: trademark glyphs and
//! the literal "(TM)" are stripped, every non-ASCII-alphanumeric character is
//! removed, and the result is lower-cased. Spacing and punctuation variants of
//! the same title collapse to one key, but edition words do not: "Game" and
//! "Game: Remastered" stay distinct comparison keys. That asymmetry is the
//! documented behavior, not an oversight — stripping suffix words changes
//! which records merge.

use std::sync::OnceLock;

use regex::Regex;

fn trademark_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\(tm\)|™|®").expect("trademark pattern"))
}

/// Comparison key: trademark-stripped, ASCII alphanumerics only, lower-case.
pub fn normalized_name(raw: &str) -> String {
    let stripped = trademark_re().replace_all(raw, "");
    stripped
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Display string: trademark glyphs removed, casing and punctuation kept.
pub fn display_name(raw: &str) -> String {
    trademark_re().replace_all(raw, "").trim().to_string()
}
