//! Writes a scraped batch into the document store.
//!
//! Chapters go first so the manga aggregates can be read back from the store:
//! `total_chapters` and `total_pages` always describe what is persisted, not
//! what the current scrape happened to see.

use crate::db::{DocumentStore, UpsertOutcome};
use crate::error::StoreError;
use crate::models::{ChapterDocument, MangaDocument, MangaEntry, ScanChapters, ScanTypeSummary};
use chrono::{DateTime, Utc};
use log::{error, info, warn};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub mangas_added: usize,
    pub mangas_updated: usize,
    pub chapters_added: usize,
    pub chapters_updated: usize,
    pub failed_mangas: usize,
}

impl ReconcileReport {
    /// `(mangas_added, chapters_added)`
    pub fn added(&self) -> (usize, usize) {
        (self.mangas_added, self.chapters_added)
    }
}

pub struct Reconciler<'a, S: DocumentStore + ?Sized> {
    store: &'a mut S,
}

impl<'a, S: DocumentStore + ?Sized> Reconciler<'a, S> {
    pub fn new(store: &'a mut S) -> Self {
        Self { store }
    }

    pub fn reconcile(&mut self, batch: &[MangaEntry]) -> ReconcileReport {
        self.reconcile_at(batch, Utc::now())
    }

    /// Reconcile with an explicit clock.
    pub fn reconcile_at(&mut self, batch: &[MangaEntry], now: DateTime<Utc>) -> ReconcileReport {
        let mut report = ReconcileReport::default();

        for entry in batch {
            let title = &entry.item.title;
            for scan in &entry.scans {
                self.write_chapters(title, scan, now, &mut report);
            }
            match self.write_manga(entry, now) {
                Ok(UpsertOutcome::Inserted) => report.mangas_added += 1,
                Ok(UpsertOutcome::Updated) => report.mangas_updated += 1,
                Err(e) => {
                    error!("Failed to upsert manga {}: {}", title, e);
                    report.failed_mangas += 1;
                }
            }
        }

        info!(
            "Reconciled {} mangas: {} added, {} updated, {} failed; chapters {} added, {} updated",
            batch.len(),
            report.mangas_added,
            report.mangas_updated,
            report.failed_mangas,
            report.chapters_added,
            report.chapters_updated
        );
        report
    }

    fn write_chapters(
        &mut self,
        manga_title: &str,
        scan: &ScanChapters,
        now: DateTime<Utc>,
        report: &mut ReconcileReport,
    ) {
        for record in &scan.chapters {
            let document = ChapterDocument {
                manga_title: manga_title.to_string(),
                scan_name: scan.variant.name.clone(),
                number: record.number.clone(),
                title: record.title.clone(),
                page_count: record.page_count,
                scan_id: scan.variant.scan_id.clone(),
                episodes_url: scan.variant.episodes_url.clone(),
                reader_path: record.reader_path.clone(),
                added_at: now,
                updated_at: now,
            };
            match self.store.upsert_chapter(&document) {
                Ok(UpsertOutcome::Inserted) => report.chapters_added += 1,
                Ok(UpsertOutcome::Updated) => report.chapters_updated += 1,
                Err(e) => warn!(
                    "Skipping chapter {} of {} ({}): {}",
                    record.number, manga_title, scan.variant.name, e
                ),
            }
        }
    }

    fn write_manga(&mut self, entry: &MangaEntry, now: DateTime<Utc>) -> Result<UpsertOutcome, StoreError> {
        let totals = self.store.chapter_totals(&entry.item.title)?;
        let item = &entry.item;
        let document = MangaDocument {
            title: item.title.clone(),
            url: item.url.clone(),
            image_url: item.image_url.clone(),
            alt_title: item.alt_title.clone(),
            genres: item.genres.clone(),
            content_type: item.content_type.clone(),
            language: item.language.clone(),
            scan_types: entry.scans.iter().map(summarize).collect(),
            total_chapters: totals.chapters,
            total_pages: totals.pages,
            updated_at: now,
        };
        self.store.upsert_manga(&document)
    }
}

fn summarize(scan: &ScanChapters) -> ScanTypeSummary {
    ScanTypeSummary {
        name: scan.variant.name.clone(),
        url: scan.variant.url.clone(),
        scan_id: scan.variant.scan_id.clone(),
        episodes_url: scan.variant.episodes_url.clone(),
        chapters_count: u32::try_from(scan.chapters.len()).unwrap_or(u32::MAX),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::models::{CatalogItem, ChapterRecord, ScanVariant};
    use chrono::TimeZone;

    fn entry(title: &str, pages: &[u32]) -> MangaEntry {
        let chapters = pages
            .iter()
            .enumerate()
            .map(|(i, &p)| ChapterRecord {
                number: (i + 1).to_string(),
                title: format!("Chapitre {}", i + 1),
                page_count: p,
                reader_path: None,
            })
            .collect();
        MangaEntry {
            item: CatalogItem {
                url: format!("https://site.test/catalogue/{}/", title.to_lowercase()),
                image_url: None,
                title: title.to_string(),
                alt_title: None,
                genres: vec![],
                content_type: "Scans".to_string(),
                language: "VF".to_string(),
            },
            scans: vec![ScanChapters {
                variant: ScanVariant {
                    name: "Scan VF".to_string(),
                    url: "https://site.test/catalogue/x/scan/vf/".to_string(),
                    scan_id: Some("77".to_string()),
                    episodes_url: Some("https://site.test/catalogue/x/scan/vf/episodes.js?filever=77".to_string()),
                },
                chapters,
            }],
        }
    }

    #[test]
    fn second_pass_only_updates() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let batch = vec![entry("Solo", &[3, 5])];
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        let first = Reconciler::new(&mut store).reconcile_at(&batch, now);
        assert_eq!(first.added(), (1, 2));

        let second = Reconciler::new(&mut store).reconcile_at(&batch, now);
        assert_eq!(second.added(), (0, 0));
        assert_eq!(second.mangas_updated, 1);
        assert_eq!(second.chapters_updated, 2);

        let manga = store.find_manga("Solo").unwrap().unwrap();
        assert_eq!((manga.total_chapters, manga.total_pages), (2, 8));
        assert_eq!(manga.scan_types[0].chapters_count, 2);
        assert_eq!(manga.scan_types[0].scan_id.as_deref(), Some("77"));
    }

    #[test]
    fn entry_without_scans_still_persists_manga() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut bare = entry("Empty", &[]);
        bare.scans.clear();
        let report = Reconciler::new(&mut store).reconcile(&[bare]);
        assert_eq!(report.added(), (1, 0));
        let manga = store.find_manga("Empty").unwrap().unwrap();
        assert_eq!(manga.total_chapters, 0);
        assert!(manga.scan_types.is_empty());
    }
}
