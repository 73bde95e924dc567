use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One card from the catalogue listing.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    pub url: String,
    pub image_url: Option<String>,
    pub title: String,
    pub alt_title: Option<String>,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub language: String,
}

/// A translation/release track of a manga ("Scan VF", "Scan Spécial VF", ...).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ScanVariant {
    pub name: String,
    pub url: String,
    pub scan_id: Option<String>,
    pub episodes_url: Option<String>,
}

impl ScanVariant {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            scan_id: None,
            episodes_url: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ChapterRecord {
    pub number: String,
    pub title: String,
    pub page_count: u32,
    pub reader_path: Option<String>,
}

/// A variant together with the chapters extracted from its episodes script.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ScanChapters {
    pub variant: ScanVariant,
    #[serde(default)]
    pub chapters: Vec<ChapterRecord>,
}

/// A scraped manga and its scan tree, as handed to the reconciler.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MangaEntry {
    pub item: CatalogItem,
    #[serde(default)]
    pub scans: Vec<ScanChapters>,
}

/// Scan variant metadata as stored on the manga document.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ScanTypeSummary {
    pub name: String,
    pub url: String,
    pub scan_id: Option<String>,
    pub episodes_url: Option<String>,
    pub chapters_count: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MangaDocument {
    pub title: String,
    pub url: String,
    pub image_url: Option<String>,
    pub alt_title: Option<String>,
    pub genres: Vec<String>,
    pub content_type: String,
    pub language: String,
    pub scan_types: Vec<ScanTypeSummary>,
    pub total_chapters: u64,
    pub total_pages: u64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChapterDocument {
    pub manga_title: String,
    pub scan_name: String,
    pub number: String,
    pub title: String,
    pub page_count: u32,
    pub scan_id: Option<String>,
    pub episodes_url: Option<String>,
    pub reader_path: Option<String>,
    pub added_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Aggregates computed over the persisted chapters of one manga.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChapterTotals {
    pub chapters: u64,
    pub pages: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct TopManga {
    pub manga_title: String,
    pub chapter_count: u64,
    pub total_pages: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Stats {
    pub total_manga: u64,
    pub total_chapters: u64,
    pub total_pages: u64,
    pub avg_pages_per_chapter: f64,
    pub top_manga: Vec<TopManga>,
}
