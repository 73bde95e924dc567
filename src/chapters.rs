//! Chapter extraction for one scan variant.
//!
//! A variant page references a version-tagged `episodes.js` script. The script
//! declares one array per chapter:
//!
//! ```text
//! var eps1 = ['https://.../1.jpg', 'https://.../2.jpg'];
//! var eps2 = [];
//! eps2.length = 5;
//! ```
//!
//! Page count is the number of non-empty quoted entries, or the separate
//! `.length` assignment when the array is (nearly) empty.

use crate::config::HttpConfig;
use crate::helpers::sort_chapters;
use crate::http_client::Fetch;
use crate::models::{ChapterRecord, ScanChapters, ScanVariant};
use log::{debug, info, warn};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// Array bodies shorter than this defer to `.length` when one is present.
const NEAR_EMPTY_BODY: usize = 10;

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static regex")
}

static SCRIPT: LazyLock<Selector> = LazyLock::new(|| Selector::parse("script").expect("static selector"));
static DATA_ID: LazyLock<Selector> = LazyLock::new(|| Selector::parse("[data-id]").expect("static selector"));

static FILEVER: LazyLock<Regex> = LazyLock::new(|| re(r"filever=(\d+)"));
static INLINE_ASSIGNMENT: LazyLock<Regex> =
    LazyLock::new(|| re(r#"(?:scanID|idScan|id_scan|filever)\s*=\s*['"]?(\d+)['"]?"#));
static SRC_VERSION: LazyLock<Regex> = LazyLock::new(|| re(r"\.js\?v=(\d+)"));
static RAW_SWEEP: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"episodes\.js\?filever=(\d+)",
        r"episodes\.js\?v=(\d+)",
        r#"scan_id\s*=\s*['"]?(\d+)['"]?"#,
        r#"id_scan\s*=\s*['"]?(\d+)['"]?"#,
        r#"scanID\s*=\s*['"]?(\d+)['"]?"#,
        r#"data-id=['"](\d+)['"]"#,
        r"scan/(\d+)/",
    ]
    .iter()
    .map(|p| re(p))
    .collect()
});

/// `epsN = [` openers. See `array_bodies` for where a body ends.
static ARRAY_OPEN: LazyLock<Regex> = LazyLock::new(|| re(r"(?:var\s+)?\beps(\d+)\s*=\s*\["));
static LENGTH_FORM: LazyLock<Regex> = LazyLock::new(|| re(r"\beps(\d+)\.length\s*=\s*(\d+)\s*;"));
static QUOTED: LazyLock<Regex> = LazyLock::new(|| re(r#"'([^']*)'|"([^"]*)""#));
static OBJECT_FORM: LazyLock<Regex> = LazyLock::new(|| re(r"(?s)(?:var\s+)?\beps(\d+)\s*=\s*\{(.*?)\}"));
static OBJECT_PATH: LazyLock<Regex> = LazyLock::new(|| re(r#"\br\s*:\s*['"]([^'"]*)['"]"#));
static OBJECT_TITLE: LazyLock<Regex> = LazyLock::new(|| re(r#"\bt\s*:\s*['"]([^'"]*)['"]"#));

/// Ways of finding the `filever` tag on a variant page, tried in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanIdStrategy {
    ScriptSrcFilever,
    InlineFilever,
    InlineAssignment,
    ScriptSrcVersion,
    DataIdAttribute,
    RawTextSweep,
}

impl ScanIdStrategy {
    pub const ORDER: [ScanIdStrategy; 6] = [
        ScanIdStrategy::ScriptSrcFilever,
        ScanIdStrategy::InlineFilever,
        ScanIdStrategy::InlineAssignment,
        ScanIdStrategy::ScriptSrcVersion,
        ScanIdStrategy::DataIdAttribute,
        ScanIdStrategy::RawTextSweep,
    ];

    fn apply(self, document: &Html, scripts: &[ElementRef<'_>], raw: &str) -> Option<String> {
        let srcs = || scripts.iter().filter_map(|s| s.value().attr("src"));
        let inline = || scripts.iter().map(|s| s.text().collect::<String>());

        match self {
            ScanIdStrategy::ScriptSrcFilever => srcs()
                .filter(|src| src.contains("episodes.js?filever="))
                .find_map(|src| first_capture(&FILEVER, src)),
            ScanIdStrategy::InlineFilever => inline()
                .filter(|text| text.contains("episodes.js?filever="))
                .find_map(|text| first_capture(&FILEVER, &text)),
            ScanIdStrategy::InlineAssignment => inline().find_map(|text| first_capture(&INLINE_ASSIGNMENT, &text)),
            ScanIdStrategy::ScriptSrcVersion => srcs().find_map(|src| first_capture(&SRC_VERSION, src)),
            ScanIdStrategy::DataIdAttribute => document
                .select(&DATA_ID)
                .filter_map(|e| e.value().attr("data-id"))
                .find(|v| v.chars().any(|c| c.is_ascii_digit()))
                .map(|v| v.trim().to_string()),
            ScanIdStrategy::RawTextSweep => RAW_SWEEP.iter().find_map(|re| first_capture(re, raw)),
        }
    }
}

fn first_capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text).map(|c| c[1].to_string())
}

/// Find the chapter-index version tag on a variant page.
pub fn discover_scan_id(html: &str) -> Option<(ScanIdStrategy, String)> {
    let document = Html::parse_document(html);
    let scripts: Vec<ElementRef<'_>> = document.select(&SCRIPT).collect();
    ScanIdStrategy::ORDER.iter().find_map(|&strategy| {
        strategy
            .apply(&document, &scripts, html)
            .filter(|id| !id.is_empty())
            .map(|id| (strategy, id))
    })
}

/// `{base}/catalogue/{scan_path}/episodes.js?filever={id}` for a variant URL
/// of the form `.../catalogue/{scan_path}/`.
pub fn episodes_url(base_url: &str, variant_url: &str, scan_id: &str) -> Option<String> {
    let parts: Vec<&str> = variant_url.trim_end_matches('/').split("/catalogue/").collect();
    match parts.as_slice() {
        [_, scan_path] if !scan_path.is_empty() => Some(format!(
            "{}/catalogue/{}/episodes.js?filever={}",
            base_url.trim_end_matches('/'),
            scan_path,
            scan_id
        )),
        _ => None,
    }
}

fn chapter(number: &str, page_count: u32) -> ChapterRecord {
    ChapterRecord {
        number: number.to_string(),
        title: format!("Chapitre {}", number),
        page_count,
        reader_path: None,
    }
}

fn count_quoted(body: &str) -> u32 {
    QUOTED
        .captures_iter(body)
        .filter(|c| {
            c.get(1)
                .or_else(|| c.get(2))
                .is_some_and(|m| !m.as_str().trim().is_empty())
        })
        .count() as u32
}

/// `epsN.length = K;` assignments, first one per chapter.
fn length_overrides(raw: &str) -> Vec<(String, u32)> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for cap in LENGTH_FORM.captures_iter(raw) {
        let number = cap[1].to_string();
        let Ok(length) = cap[2].parse::<u32>() else {
            debug!("    Skipping unparsable length for eps{}", number);
            continue;
        };
        if seen.insert(number.clone()) {
            out.push((number, length));
        }
    }
    out
}

/// `(number, body)` for every `epsN = [ ... ]` array. A body ends at the first
/// `]`, or at the next opener when the array is never closed, so an
/// unterminated array cannot swallow the chapter after it. A `]` inside a
/// quoted entry still ends the body early.
fn array_bodies(raw: &str) -> Vec<(&str, &str)> {
    let opens: Vec<(&str, usize, usize)> = ARRAY_OPEN
        .captures_iter(raw)
        .filter_map(|c| {
            let whole = c.get(0)?;
            Some((c.get(1)?.as_str(), whole.start(), whole.end()))
        })
        .collect();

    opens
        .iter()
        .enumerate()
        .map(|(i, &(number, _, body_start))| {
            let limit = opens.get(i + 1).map_or(raw.len(), |&(_, next_start, _)| next_start);
            let rest = &raw[body_start..limit];
            let body = rest.find(']').map_or(rest, |close| &rest[..close]);
            (number, body)
        })
        .collect()
}

fn parse_array_table(raw: &str, lengths: &[(String, u32)]) -> Vec<ChapterRecord> {
    let by_number: HashMap<&str, u32> = lengths.iter().map(|(n, l)| (n.as_str(), *l)).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut chapters = Vec::new();

    for (number, body) in array_bodies(raw) {
        if seen.contains(number) {
            continue;
        }
        let body = body.trim();
        let page_count = if body.len() < NEAR_EMPTY_BODY {
            by_number.get(number).copied().unwrap_or_else(|| count_quoted(body))
        } else {
            match (count_quoted(body), by_number.get(number)) {
                (n, _) if n > 0 => n,
                (_, Some(&length)) => length,
                _ => {
                    debug!("    Dropping malformed entry eps{}", number);
                    continue;
                }
            }
        };
        seen.insert(number.to_string());
        chapters.push(chapter(number, page_count));
    }

    for (number, length) in lengths {
        if seen.insert(number.clone()) {
            chapters.push(chapter(number, *length));
        }
    }
    chapters
}

fn parse_object_map(raw: &str, lengths: &[(String, u32)]) -> Vec<ChapterRecord> {
    let by_number: HashMap<&str, u32> = lengths.iter().map(|(n, l)| (n.as_str(), *l)).collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut chapters = Vec::new();

    for cap in OBJECT_FORM.captures_iter(raw) {
        let number = &cap[1];
        let body = &cap[2];
        let Some(path) = OBJECT_PATH.captures(body).map(|c| c[1].to_string()) else {
            continue;
        };
        if !seen.insert(number.to_string()) {
            continue;
        }
        let mut record = chapter(number, by_number.get(number).copied().unwrap_or(0));
        if let Some(title) = OBJECT_TITLE.captures(body).map(|c| c[1].trim().to_string()) {
            if !title.is_empty() {
                record.title = title;
            }
        }
        record.reader_path = Some(path);
        chapters.push(record);
    }
    chapters
}

/// Parse an `episodes.js` body into a sorted, de-duplicated chapter list.
///
/// The array/length table is authoritative; the `{r: path, t: title}` object
/// map of older scripts is only consulted when the table yields nothing.
pub fn parse_episodes_js(raw: &str) -> Vec<ChapterRecord> {
    let lengths = length_overrides(raw);
    let mut chapters = parse_array_table(raw, &lengths);
    if chapters.is_empty() {
        chapters = parse_object_map(raw, &lengths);
    }
    sort_chapters(&mut chapters);
    chapters
}

/// Fetch a variant page and its episodes script. Failures at any step give
/// an empty chapter list; the returned variant carries whatever was resolved.
pub async fn resolve_chapters<F: Fetch + ?Sized>(
    fetcher: &F,
    base_url: &str,
    variant: &ScanVariant,
    http: &HttpConfig,
) -> ScanChapters {
    let mut resolved = ScanChapters {
        variant: variant.clone(),
        chapters: Vec::new(),
    };
    info!("Processing chapters for: {} at {}", variant.name, variant.url);

    let page = match fetcher.get(&variant.url, http.episodes_timeout()).await {
        Ok(page) if page.is_ok() => page,
        Ok(page) => {
            warn!("  Failed to access page, status code: {}", page.status);
            return resolved;
        }
        Err(e) => {
            warn!("  Error while retrieving data for {}: {}", variant.name, e);
            return resolved;
        }
    };

    let Some((strategy, scan_id)) = discover_scan_id(&page.body) else {
        info!("  No scan ID found for {}", variant.url);
        return resolved;
    };
    debug!("  Scan ID {} found via {:?}", scan_id, strategy);

    let Some(url) = episodes_url(base_url, &variant.url, &scan_id) else {
        warn!("  Invalid scan URL format: {}", variant.url);
        resolved.variant.scan_id = Some(scan_id);
        return resolved;
    };
    resolved.variant.scan_id = Some(scan_id);
    resolved.variant.episodes_url = Some(url.clone());

    let script = match fetcher.get(&url, http.episodes_timeout()).await {
        Ok(script) if script.is_ok() => script,
        Ok(script) => {
            warn!("  Failed to access episodes.js, status code: {}", script.status);
            return resolved;
        }
        Err(e) => {
            warn!("  Error while retrieving {}: {}", url, e);
            return resolved;
        }
    };

    resolved.chapters = parse_episodes_js(&script.body);
    let pages: u64 = resolved.chapters.iter().map(|c| c.page_count as u64).sum();
    info!(
        "  Added {} chapters ({} pages) for {}",
        resolved.chapters.len(),
        pages,
        variant.name
    );
    resolved
}
