//! Text helpers

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s-]").unwrap());
static SEPARATORS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[-\s]+").unwrap());

/// Generate a clean, URL-safe slug from the given text.
///
/// Accented characters are folded to ASCII, anything that is not a word
/// character, whitespace or hyphen is dropped, and runs of separators
/// collapse into a single hyphen.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();
    let ascii: String = lowered.nfkd().filter(char::is_ascii).collect();

    let cleaned = DISALLOWED.replace_all(&ascii, " ");
    let hyphenated = SEPARATORS.replace_all(cleaned.trim(), "-");

    hyphenated.trim_matches('-').to_string()
}
