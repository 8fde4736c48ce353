//! Validation gate for fetched result pages.
//!
//! A page is accepted when at least [`MIN_MARKERS`] of the fixed markers are
//! present. Block pages, consent walls and redirects usually carry one marker
//! at most (the host name), so one is not enough.

use once_cell::sync::Lazy;
use regex::Regex;

/// Number of distinct markers a genuine results page must contain.
pub const MIN_MARKERS: usize = 2;

/// Marker names paired with their case-insensitive patterns.
static MARKERS: Lazy<Vec<(&'static str, Regex)>> = Lazy::new(|| {
    [
        ("host", r"(?i)patentscope\.wipo\.int"),
        ("results_label", r"(?i)Search Results"),
        ("result_table", r"(?i)resultTable"),
        ("publication_number", r"(?i)publication number"),
        ("pct", r"(?i)PCT"),
    ]
    .into_iter()
    .filter_map(|(name, pattern)| Regex::new(pattern).ok().map(|re| (name, re)))
    .collect()
});

/// Names of the markers present in `content`.
#[must_use]
pub fn matched_markers(content: &str) -> Vec<&'static str> {
    MARKERS
        .iter()
        .filter(|(_, re)| re.is_match(content))
        .map(|(name, _)| *name)
        .collect()
}

/// Whether `content` looks like a genuine results page.
///
/// `None`, empty and whitespace-only content are never valid.
#[must_use]
pub fn validate(content: Option<&str>) -> bool {
    match content {
        Some(text) if !text.trim().is_empty() => matched_markers(text).len() >= MIN_MARKERS,
        _ => false,
    }
}
