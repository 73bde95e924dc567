//! Scan-variant discovery on a manga detail page.
//!
//! The detail page registers each variant through an inline
//! `panneauScan("name", "relative/url")` call. The first call on every page
//! is the template (`panneauScan("nom", "url")`) and carries no data.

use crate::config::HttpConfig;
use crate::helpers::join_relative;
use crate::http_client::Fetch;
use crate::models::{CatalogItem, ScanVariant};
use log::{info, warn};
use regex::Regex;
use std::sync::LazyLock;

/// Regex strategies from strictest to most permissive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairPattern {
    Strict,
    EscapedQuotes,
    Permissive,
}

impl PairPattern {
    pub const ORDER: [PairPattern; 3] = [
        PairPattern::Strict,
        PairPattern::EscapedQuotes,
        PairPattern::Permissive,
    ];

    fn regex(self) -> &'static Regex {
        static STRICT: LazyLock<Regex> =
            LazyLock::new(|| Regex::new(r#"panneauScan\("([^"]+)",\s*"([^"]+)"\);"#).expect("static regex"));
        static ESCAPED: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r#"panneauScan\(\\?"([^"\\]+)\\?",\s*\\?"([^"\\]+)\\?"\);"#).expect("static regex")
        });
        static PERMISSIVE: LazyLock<Regex> = LazyLock::new(|| {
            Regex::new(r#"panneauScan\(['"](.*?)['"]\s*,\s*['"](.*?)['"]"#).expect("static regex")
        });
        match self {
            PairPattern::Strict => &STRICT,
            PairPattern::EscapedQuotes => &ESCAPED,
            PairPattern::Permissive => &PERMISSIVE,
        }
    }
}

/// Well-known variant paths, relative to the detail page.
pub const FALLBACK_PATHS: [(&str, &str); 2] = [
    ("scan/vf/", "Scan VF"),
    ("scan_special/vf/", "Scan Spécial VF"),
];

/// `(name, relative_url)` pairs found by the first pattern with any match.
pub fn find_scan_pairs(markup: &str) -> Option<(PairPattern, Vec<(String, String)>)> {
    PairPattern::ORDER.iter().find_map(|&pattern| {
        let pairs: Vec<(String, String)> = pattern
            .regex()
            .captures_iter(markup)
            .map(|c| (c[1].trim().to_string(), c[2].trim().to_string()))
            .collect();
        if pairs.is_empty() {
            None
        } else {
            Some((pattern, pairs))
        }
    })
}

/// Variants declared in the detail markup, template entry removed.
pub fn variants_from_markup(detail_url: &str, markup: &str) -> Vec<ScanVariant> {
    let Some((pattern, pairs)) = find_scan_pairs(markup) else {
        return Vec::new();
    };
    log::debug!("panneauScan matched with {:?} pattern ({} calls)", pattern, pairs.len());

    pairs
        .into_iter()
        .skip(1)
        .filter_map(|(name, relative)| {
            let url = join_relative(detail_url, &relative)?;
            Some(ScanVariant::new(name, url))
        })
        .collect()
}

async fn probe_fallback_paths<F: Fetch + ?Sized>(
    fetcher: &F,
    detail_url: &str,
    http: &HttpConfig,
) -> Vec<ScanVariant> {
    let mut found = Vec::new();
    for (path, name) in FALLBACK_PATHS {
        let Some(url) = join_relative(detail_url, path) else {
            continue;
        };
        match fetcher.head(&url, http.probe_timeout()).await {
            Ok(200) => {
                info!("  Fallback found scan type: {} - {}", name, url);
                found.push(ScanVariant::new(name, url));
            }
            Ok(status) => log::debug!("  {} answered {}", url, status),
            Err(e) => warn!("  Error checking potential URL {}: {}", url, e),
        }
    }
    found
}

/// Resolve the scan variants of a catalogue item. Never fails: any network
/// problem on the detail page yields an empty list.
pub async fn resolve<F: Fetch + ?Sized>(fetcher: &F, item: &CatalogItem, http: &HttpConfig) -> Vec<ScanVariant> {
    info!("Processing for scan types: {} (from {})", item.title, item.url);

    let page = match fetcher.get(&item.url, http.detail_timeout()).await {
        Ok(page) if (200..300).contains(&page.status) => page,
        Ok(page) => {
            warn!("  Detail page {} answered {}", item.url, page.status);
            return Vec::new();
        }
        Err(e) => {
            warn!("  Error fetching page {} for scan types: {}", item.url, e);
            return Vec::new();
        }
    };

    let mut variants = variants_from_markup(&item.url, &page.body);
    if variants.is_empty() {
        variants = probe_fallback_paths(fetcher, &item.url, http).await;
    }

    if variants.is_empty() {
        info!("  No scan types found for {}", item.title);
    } else {
        info!("  {} scan types for {}", variants.len(), item.title);
    }
    variants
}
