//! Full scrape run: listing → items → scan variants → chapters → store.
//!
//! Every stage result is snapshotted before the next stage starts. A run that
//! fails part-way is resumed from the last snapshot by the next attempt; a run
//! that reaches the store clears the snapshots.

use crate::chapters::resolve_chapters;
use crate::config::Config;
use crate::db::{DocumentStore, SqliteStore};
use crate::error::PipelineError;
use crate::http_client::Fetch;
use crate::listing::{extract_items, fetch_listing};
use crate::models::{CatalogItem, MangaEntry, ScanChapters};
use crate::reconcile::{ReconcileReport, Reconciler};
use crate::scan_types;
use crate::snapshot::{SnapshotStore, Stage};
use log::info;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub items: usize,
    pub variants: usize,
    pub chapters: usize,
    /// Stages loaded from snapshots instead of being scraped again.
    pub resumed_stages: Vec<&'static str>,
    pub reconcile: ReconcileReport,
}

pub struct Pipeline<F: Fetch> {
    fetcher: F,
    config: Config,
    snapshots: SnapshotStore,
}

impl<F: Fetch> Pipeline<F> {
    pub fn new(fetcher: F, config: Config) -> Self {
        let snapshots = SnapshotStore::new(&config.snapshot_dir);
        Self {
            fetcher,
            config,
            snapshots,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn snapshots(&self) -> &SnapshotStore {
        &self.snapshots
    }

    /// Open the configured SQLite store, run, then close the store.
    pub async fn run_persisted(&self, fresh: bool) -> Result<RunReport, PipelineError> {
        let mut store = SqliteStore::open(&self.config.db_path)?;
        let report = self.run(&mut store, fresh).await?;
        store.close()?;
        Ok(report)
    }

    /// Run every stage against `store`. `fresh` discards existing snapshots.
    pub async fn run<S: DocumentStore + ?Sized>(
        &self,
        store: &mut S,
        fresh: bool,
    ) -> Result<RunReport, PipelineError> {
        if fresh {
            self.snapshots.clear()?;
        }
        let mut report = RunReport::default();

        let batch = self.chapter_tree(&mut report).await?;
        report.items = batch.len();
        report.variants = batch.iter().map(|e| e.scans.len()).sum();
        report.chapters = batch
            .iter()
            .flat_map(|e| e.scans.iter())
            .map(|s| s.chapters.len())
            .sum();

        info!("[4/4] Reconciling {} mangas with the store", batch.len());
        report.reconcile = Reconciler::new(store).reconcile(&batch);

        self.snapshots.clear()?;
        info!(
            "Run complete: {} items, {} scan types, {} chapters",
            report.items, report.variants, report.chapters
        );
        Ok(report)
    }

    async fn listing_html(&self, report: &mut RunReport) -> Result<String, PipelineError> {
        if let Some(html) = self.snapshots.load_text(Stage::Listing)? {
            info!("Resuming from {} snapshot", Stage::Listing.file_name());
            report.resumed_stages.push(Stage::Listing.file_name());
            return Ok(html);
        }
        info!("[1/4] Fetching catalogue listing from {}", self.config.base_url);
        let pages = fetch_listing(&self.fetcher, &self.config).await?;
        let html = pages.joined();
        self.snapshots.save_text(Stage::Listing, &html)?;
        Ok(html)
    }

    async fn catalog(&self, report: &mut RunReport) -> Result<Vec<CatalogItem>, PipelineError> {
        if let Some(items) = self.snapshots.load_json(Stage::Catalog)? {
            info!("Resuming from {} snapshot", Stage::Catalog.file_name());
            report.resumed_stages.push(Stage::Catalog.file_name());
            return Ok(items);
        }
        let html = self.listing_html(report).await?;
        let items = extract_items(&html);
        self.snapshots.save_json(Stage::Catalog, &items)?;
        Ok(items)
    }

    async fn scan_tree(&self, report: &mut RunReport) -> Result<Vec<MangaEntry>, PipelineError> {
        if let Some(entries) = self.snapshots.load_json(Stage::Scans)? {
            info!("Resuming from {} snapshot", Stage::Scans.file_name());
            report.resumed_stages.push(Stage::Scans.file_name());
            return Ok(entries);
        }
        let items = self.catalog(report).await?;
        info!("[2/4] Resolving scan types for {} items", items.len());

        let mut entries = Vec::with_capacity(items.len());
        for (i, item) in items.into_iter().enumerate() {
            log::debug!("Item {}: {}", i + 1, item.title);
            let variants = scan_types::resolve(&self.fetcher, &item, &self.config.http).await;
            let scans = variants
                .into_iter()
                .map(|variant| ScanChapters {
                    variant,
                    chapters: Vec::new(),
                })
                .collect();
            entries.push(MangaEntry { item, scans });
        }
        self.snapshots.save_json(Stage::Scans, &entries)?;
        Ok(entries)
    }

    async fn chapter_tree(&self, report: &mut RunReport) -> Result<Vec<MangaEntry>, PipelineError> {
        if let Some(entries) = self.snapshots.load_json(Stage::Chapters)? {
            info!("Resuming from {} snapshot", Stage::Chapters.file_name());
            report.resumed_stages.push(Stage::Chapters.file_name());
            return Ok(entries);
        }
        let entries = self.scan_tree(report).await?;
        info!("[3/4] Extracting chapters for {} items", entries.len());

        let mut resolved = Vec::with_capacity(entries.len());
        for entry in entries {
            let mut scans = Vec::with_capacity(entry.scans.len());
            for scan in &entry.scans {
                scans.push(
                    resolve_chapters(&self.fetcher, &self.config.base_url, &scan.variant, &self.config.http)
                        .await,
                );
            }
            resolved.push(MangaEntry {
                item: entry.item,
                scans,
            });
        }
        self.snapshots.save_json(Stage::Chapters, &resolved)?;
        Ok(resolved)
    }
}
