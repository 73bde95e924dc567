//! Small helpers shared by the extraction stages
//!
//! - URL joining against detail pages
//! - Chapter number ordering
//! - Whitespace normalisation of scraped text
//!
//! # Examples
//!
//! ```
//! use catalogue_scraper::helpers::{chapter_sort_key, join_relative};
//!
//! assert!(chapter_sort_key("1.5") < chapter_sort_key("2"));
//! assert_eq!(
//!     join_relative("https://site.test/catalogue/foo", "scan/vf/").as_deref(),
//!     Some("https://site.test/catalogue/foo/scan/vf/")
//! );
//! ```

use crate::models::ChapterRecord;
use reqwest::Url;
use std::cmp::Ordering;

/// Join `relative` onto `base`, treating `base` as a directory.
pub fn join_relative(base: &str, relative: &str) -> Option<String> {
    let base = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{}/", base)
    };
    let base = Url::parse(&base).ok()?;
    base.join(relative.trim()).ok().map(|u| u.to_string())
}

/// Numeric value of a chapter number; non-numeric numbers sort last.
pub fn chapter_sort_key(number: &str) -> f64 {
    match number.trim().parse::<f64>() {
        Ok(n) if n.is_finite() => n,
        _ => f64::INFINITY,
    }
}

pub fn compare_chapter_numbers(a: &str, b: &str) -> Ordering {
    chapter_sort_key(a)
        .partial_cmp(&chapter_sort_key(b))
        .unwrap_or(Ordering::Equal)
}

/// Stable ascending sort by chapter number.
pub fn sort_chapters(chapters: &mut [ChapterRecord]) {
    chapters.sort_by(|a, b| compare_chapter_numbers(&a.number, &b.number));
}

/// Collapse runs of whitespace and trim.
pub fn clean_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// `None` for blank strings, the cleaned text otherwise.
pub fn non_empty(s: &str) -> Option<String> {
    let cleaned = clean_text(s);
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}
