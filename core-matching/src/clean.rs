//! Metadata cleaning applied before any fuzzy comparison.

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

// ============================================================================
// Patterns
// ============================================================================

/// `(feat. X)` / `[ft X]` annotations.
static FEAT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[\s*(feat|ft)\.?\s*[^\]]+\]|\(\s*(feat|ft)\.?\s*[^)]+\)")
        .expect("valid feat pattern")
});

/// Bracketed release tags: `(Radio Edit)`, `[Live at Wembley]`, `(2011 Remastered)`.
static TAG_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)[\(\[][^\(\)\[\]]*?\b(?:remix|edit|live|version|explicit|clean|instrumental|deluxe|remaster(?:ed)?|mastered)\b[^\(\)\[\]]*[\)\]]",
    )
    .expect("valid release tag pattern")
});

static NON_ALPHANUMERIC: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\p{L}\p{N}\s]+").expect("valid punctuation pattern"));

static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace pattern"));

// ============================================================================
// Cleaning
// ============================================================================

/// Normalizes a title, artist or album string for matching.
///
/// Steps, in order: lowercase, strip diacritics, drop featured-artist
/// annotations, drop bracketed release tags, turn punctuation runs into a
/// space, collapse whitespace, trim. `clean(clean(s)) == clean(s)`.
///
/// ```
/// use core_matching::clean;
///
/// assert_eq!(clean("Beyoncé - Halo (feat. Someone) [Live]"), "beyonce halo");
/// ```
pub fn clean(s: &str) -> String {
    let lowered = s.to_lowercase();

    let folded: String = lowered.nfd().filter(|c| !is_combining_mark(*c)).collect();

    let without_feat = FEAT_PATTERN.replace_all(&folded, "");
    let without_tags = TAG_PATTERN.replace_all(&without_feat, "");
    let alphanumeric = NON_ALPHANUMERIC.replace_all(&without_tags, " ");
    let collapsed = WHITESPACE.replace_all(&alphanumeric, " ");

    collapsed.trim().to_string()
}
