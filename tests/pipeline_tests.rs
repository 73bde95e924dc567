mod common;

use catalogue_scraper::db::{DocumentStore, SqliteStore};
use catalogue_scraper::error::{PipelineError, ScrapeError};
use catalogue_scraper::models::CatalogItem;
use catalogue_scraper::pipeline::{Pipeline, RunReport};
use catalogue_scraper::scheduler::{run_once, run_with_retries, RetryPolicy};
use catalogue_scraper::snapshot::Stage;
use common::*;
use std::cell::Cell;
use std::time::Duration;

#[tokio::test]
async fn test_manga_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_manga_site(), test_config(BASE, dir.path()));
    let mut store = SqliteStore::open_in_memory().unwrap();

    let report = pipeline.run(&mut store, false).await.unwrap();
    assert_eq!((report.items, report.variants, report.chapters), (1, 1, 2));
    assert_eq!(report.reconcile.added(), (1, 2));
    assert!(report.resumed_stages.is_empty());

    let manga = store.find_manga("Test Manga").unwrap().unwrap();
    assert_eq!(manga.total_chapters, 2);
    assert_eq!(manga.total_pages, 8);
    assert_eq!(manga.genres, vec!["Action", "Aventure"]);
    assert_eq!(manga.scan_types.len(), 1);
    assert_eq!(manga.scan_types[0].name, "Scan VF");
    assert_eq!(manga.scan_types[0].chapters_count, 2);
    assert_eq!(manga.scan_types[0].episodes_url.as_deref(), Some(EPISODES));

    let pages: Vec<_> = store
        .chapters_for("Test Manga")
        .unwrap()
        .into_iter()
        .map(|c| (c.number, c.page_count))
        .collect();
    assert_eq!(pages, vec![("1".to_string(), 3), ("2".to_string(), 5)]);

    for stage in Stage::ALL {
        assert!(!pipeline.snapshots().exists(stage), "{:?} snapshot left behind", stage);
    }
}

#[tokio::test]
async fn second_run_adds_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_manga_site(), test_config(BASE, dir.path()));
    let mut store = SqliteStore::open_in_memory().unwrap();

    pipeline.run(&mut store, false).await.unwrap();
    let again = pipeline.run(&mut store, false).await.unwrap();
    assert_eq!(again.reconcile.added(), (0, 0));
    assert_eq!(again.reconcile.chapters_updated, 2);
    assert_eq!(store.stats().unwrap().total_pages, 8);
}

#[tokio::test]
async fn resumes_from_catalog_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    // No listing pages: fetching the listing again would fail the run.
    let fetcher = FixtureFetcher::new()
        .page(DETAIL, detail_page(&[]))
        .head(SCAN_VF, 404);
    let pipeline = Pipeline::new(fetcher, test_config(BASE, dir.path()));

    let items = vec![CatalogItem {
        url: DETAIL.to_string(),
        image_url: None,
        title: "Test Manga".to_string(),
        alt_title: None,
        genres: vec![],
        content_type: "Scans".to_string(),
        language: "VF".to_string(),
    }];
    pipeline.snapshots().save_json(Stage::Catalog, &items).unwrap();

    let mut store = SqliteStore::open_in_memory().unwrap();
    let report = pipeline.run(&mut store, false).await.unwrap();
    assert_eq!(report.resumed_stages, vec!["catalog.json"]);
    assert_eq!(report.reconcile.added(), (1, 0));
    assert!(!pipeline.snapshots().exists(Stage::Catalog));
}

#[tokio::test]
async fn fresh_run_ignores_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(FixtureFetcher::new(), test_config(BASE, dir.path()));
    pipeline.snapshots().save_json::<Vec<CatalogItem>>(Stage::Catalog, &vec![]).unwrap();

    let mut store = SqliteStore::open_in_memory().unwrap();
    let err = pipeline.run(&mut store, true).await.unwrap_err();
    assert!(matches!(err, PipelineError::Scrape(ScrapeError::EmptyListing)));
}

#[tokio::test]
async fn corrupt_snapshot_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = Pipeline::new(test_manga_site(), test_config(BASE, dir.path()));
    std::fs::create_dir_all(pipeline.snapshots().dir()).unwrap();
    std::fs::write(pipeline.snapshots().path(Stage::Scans), "[{\"item\":").unwrap();

    let mut store = SqliteStore::open_in_memory().unwrap();
    let err = pipeline.run(&mut store, false).await.unwrap_err();
    assert!(matches!(err, PipelineError::Snapshot(_)));
    assert!(store.find_manga("Test Manga").unwrap().is_none());
}

#[tokio::test]
async fn retries_stop_at_first_success() {
    let calls = Cell::new(0u32);
    let policy = RetryPolicy {
        max_attempts: 3,
        delay: Duration::ZERO,
    };
    let outcome = run_with_retries(policy, |attempt| {
        calls.set(calls.get() + 1);
        async move {
            if attempt < 2 {
                Err(PipelineError::Scrape(ScrapeError::EmptyListing))
            } else {
                Ok(RunReport::default())
            }
        }
    })
    .await;

    assert!(outcome.success);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(calls.get(), 2);
}

#[tokio::test]
async fn retries_are_bounded() {
    let calls = Cell::new(0u32);
    let policy = RetryPolicy {
        max_attempts: 3,
        delay: Duration::ZERO,
    };
    let outcome = run_with_retries(policy, |_| {
        calls.set(calls.get() + 1);
        async { Err::<RunReport, _>(PipelineError::Scrape(ScrapeError::EmptyListing)) }
    })
    .await;

    assert!(!outcome.success);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(calls.get(), 3);
    assert_eq!((outcome.mangas_added, outcome.chapters_added), (0, 0));
}

#[tokio::test]
async fn run_once_persists_to_configured_store() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = test_config(BASE, dir.path());
    cfg.schedule.retry_delay_secs = 0;
    let db_path = cfg.db_path.clone();
    let pipeline = Pipeline::new(test_manga_site(), cfg);

    let outcome = run_once(&pipeline, true).await;
    assert!(outcome.success);
    assert_eq!((outcome.mangas_added, outcome.chapters_added), (1, 2));

    let store = SqliteStore::open(&db_path).unwrap();
    let stats = store.stats().unwrap();
    assert_eq!((stats.total_manga, stats.total_chapters, stats.total_pages), (1, 2, 8));
}
