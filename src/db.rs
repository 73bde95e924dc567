//! SQLite-backed document store.
//!
//! Two collections are kept as tables: `mangas` keyed by `title` and
//! `chapters` keyed by `(manga_title, scan_name, number)`. List-valued fields
//! (`genres`, `scan_types`) are stored as JSON text.

use crate::error::StoreError;
use crate::models::{ChapterDocument, ChapterTotals, MangaDocument, Stats, TopManga};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

const TOP_MANGA_LIMIT: usize = 10;

/// Whether an upsert created the document or touched an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

/// Persistence seam used by the reconciler.
pub trait DocumentStore {
    /// Insert or update by natural key. `added_at` is only written on insert.
    fn upsert_chapter(&mut self, chapter: &ChapterDocument) -> Result<UpsertOutcome, StoreError>;

    /// Count and page sum over every persisted chapter of `manga_title`.
    fn chapter_totals(&self, manga_title: &str) -> Result<ChapterTotals, StoreError>;

    fn upsert_manga(&mut self, manga: &MangaDocument) -> Result<UpsertOutcome, StoreError>;

    fn find_manga(&self, title: &str) -> Result<Option<MangaDocument>, StoreError>;

    /// Chapters of a manga ordered by scan name, then insertion order.
    fn chapters_for(&self, manga_title: &str) -> Result<Vec<ChapterDocument>, StoreError>;

    fn stats(&self) -> Result<Stats, StoreError>;

    /// Case-insensitive substring search over titles and alternative titles.
    fn search_manga(&self, query: &str) -> Result<Vec<MangaDocument>, StoreError>;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        log::info!("Opening store at {}", path.display());
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        create_tables(&conn)?;
        Ok(Self { conn })
    }

    /// Flush and release the connection.
    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, e)| StoreError::Sqlite(e))
    }
}

pub fn create_tables(conn: &Connection) -> Result<(), StoreError> {
    log::debug!("Creating tables if not exists...");

    conn.execute(
        "CREATE TABLE IF NOT EXISTS mangas (
            title TEXT NOT NULL,
            url TEXT NOT NULL,
            image_url TEXT,
            alt_title TEXT,
            genres TEXT NOT NULL DEFAULT '[]',
            content_type TEXT NOT NULL DEFAULT '',
            language TEXT NOT NULL DEFAULT '',
            scan_types TEXT NOT NULL DEFAULT '[]',
            total_chapters INTEGER NOT NULL DEFAULT 0,
            total_pages INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_mangas_title ON mangas(title);",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS chapters (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            manga_title TEXT NOT NULL,
            scan_name TEXT NOT NULL,
            number TEXT NOT NULL,
            title TEXT NOT NULL,
            page_count INTEGER NOT NULL DEFAULT 0,
            scan_id TEXT,
            episodes_url TEXT,
            reader_path TEXT,
            added_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_chapters_key
            ON chapters(manga_title, scan_name, number);",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_chapters_manga ON chapters(manga_title);",
        [],
    )?;
    Ok(())
}

/// Raw manga row; JSON columns are decoded outside the rusqlite closure.
struct MangaRow {
    title: String,
    url: String,
    image_url: Option<String>,
    alt_title: Option<String>,
    genres: String,
    content_type: String,
    language: String,
    scan_types: String,
    total_chapters: i64,
    total_pages: i64,
    updated_at: DateTime<Utc>,
}

const MANGA_COLUMNS: &str = "title, url, image_url, alt_title, genres, content_type, language, \
     scan_types, total_chapters, total_pages, updated_at";

impl MangaRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            title: row.get(0)?,
            url: row.get(1)?,
            image_url: row.get(2)?,
            alt_title: row.get(3)?,
            genres: row.get(4)?,
            content_type: row.get(5)?,
            language: row.get(6)?,
            scan_types: row.get(7)?,
            total_chapters: row.get(8)?,
            total_pages: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_document(self) -> Result<MangaDocument, StoreError> {
        Ok(MangaDocument {
            title: self.title,
            url: self.url,
            image_url: self.image_url,
            alt_title: self.alt_title,
            genres: serde_json::from_str(&self.genres)?,
            content_type: self.content_type,
            language: self.language,
            scan_types: serde_json::from_str(&self.scan_types)?,
            total_chapters: self.total_chapters.max(0) as u64,
            total_pages: self.total_pages.max(0) as u64,
            updated_at: self.updated_at,
        })
    }
}

fn chapter_from_row(row: &Row<'_>) -> rusqlite::Result<ChapterDocument> {
    Ok(ChapterDocument {
        manga_title: row.get(0)?,
        scan_name: row.get(1)?,
        number: row.get(2)?,
        title: row.get(3)?,
        page_count: row.get(4)?,
        scan_id: row.get(5)?,
        episodes_url: row.get(6)?,
        reader_path: row.get(7)?,
        added_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl DocumentStore for SqliteStore {
    fn upsert_chapter(&mut self, chapter: &ChapterDocument) -> Result<UpsertOutcome, StoreError> {
        if chapter.manga_title.is_empty() || chapter.number.is_empty() {
            return Err(StoreError::Rejected(format!(
                "chapter key incomplete: '{}' / '{}' / '{}'",
                chapter.manga_title, chapter.scan_name, chapter.number
            )));
        }

        let inserted = self.conn.execute(
            "INSERT INTO chapters (manga_title, scan_name, number, title, page_count, scan_id,
                episodes_url, reader_path, added_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(manga_title, scan_name, number) DO NOTHING",
            params![
                chapter.manga_title,
                chapter.scan_name,
                chapter.number,
                chapter.title,
                chapter.page_count,
                chapter.scan_id,
                chapter.episodes_url,
                chapter.reader_path,
                chapter.added_at,
                chapter.updated_at,
            ],
        )?;
        if inserted > 0 {
            return Ok(UpsertOutcome::Inserted);
        }

        self.conn.execute(
            "UPDATE chapters SET title = ?4, page_count = ?5, scan_id = ?6, episodes_url = ?7,
                reader_path = ?8, updated_at = ?9
             WHERE manga_title = ?1 AND scan_name = ?2 AND number = ?3",
            params![
                chapter.manga_title,
                chapter.scan_name,
                chapter.number,
                chapter.title,
                chapter.page_count,
                chapter.scan_id,
                chapter.episodes_url,
                chapter.reader_path,
                chapter.updated_at,
            ],
        )?;
        Ok(UpsertOutcome::Updated)
    }

    fn chapter_totals(&self, manga_title: &str) -> Result<ChapterTotals, StoreError> {
        let (chapters, pages): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(page_count), 0) FROM chapters WHERE manga_title = ?1",
            params![manga_title],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;
        Ok(ChapterTotals {
            chapters: chapters.max(0) as u64,
            pages: pages.max(0) as u64,
        })
    }

    fn upsert_manga(&mut self, manga: &MangaDocument) -> Result<UpsertOutcome, StoreError> {
        if manga.title.is_empty() {
            return Err(StoreError::Rejected("manga without title".to_string()));
        }
        let genres = serde_json::to_string(&manga.genres)?;
        let scan_types = serde_json::to_string(&manga.scan_types)?;
        let total_chapters = i64::try_from(manga.total_chapters).unwrap_or(i64::MAX);
        let total_pages = i64::try_from(manga.total_pages).unwrap_or(i64::MAX);

        let existed: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM mangas WHERE title = ?1",
                params![manga.title],
                |row| row.get(0),
            )
            .optional()?;

        self.conn.execute(
            "INSERT INTO mangas (title, url, image_url, alt_title, genres, content_type, language,
                scan_types, total_chapters, total_pages, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(title) DO UPDATE SET
                url = excluded.url,
                image_url = excluded.image_url,
                alt_title = excluded.alt_title,
                genres = excluded.genres,
                content_type = excluded.content_type,
                language = excluded.language,
                scan_types = excluded.scan_types,
                total_chapters = excluded.total_chapters,
                total_pages = excluded.total_pages,
                updated_at = excluded.updated_at",
            params![
                manga.title,
                manga.url,
                manga.image_url,
                manga.alt_title,
                genres,
                manga.content_type,
                manga.language,
                scan_types,
                total_chapters,
                total_pages,
                manga.updated_at,
            ],
        )?;

        Ok(if existed.is_some() {
            UpsertOutcome::Updated
        } else {
            UpsertOutcome::Inserted
        })
    }

    fn find_manga(&self, title: &str) -> Result<Option<MangaDocument>, StoreError> {
        let sql = format!("SELECT {} FROM mangas WHERE title = ?1", MANGA_COLUMNS);
        let row = self
            .conn
            .query_row(&sql, params![title], MangaRow::from_row)
            .optional()?;
        row.map(MangaRow::into_document).transpose()
    }

    fn chapters_for(&self, manga_title: &str) -> Result<Vec<ChapterDocument>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT manga_title, scan_name, number, title, page_count, scan_id, episodes_url,
                reader_path, added_at, updated_at
             FROM chapters WHERE manga_title = ?1 ORDER BY scan_name, id",
        )?;
        let rows = stmt.query_map(params![manga_title], chapter_from_row)?;
        let mut chapters = Vec::new();
        for row in rows {
            chapters.push(row?);
        }
        Ok(chapters)
    }

    fn stats(&self) -> Result<Stats, StoreError> {
        let total_manga: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM mangas", [], |row| row.get(0))?;
        let (total_chapters, total_pages): (i64, i64) = self.conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(page_count), 0) FROM chapters",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = self.conn.prepare(
            "SELECT manga_title, COUNT(*) AS chapter_count, COALESCE(SUM(page_count), 0)
             FROM chapters GROUP BY manga_title
             ORDER BY chapter_count DESC, manga_title ASC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![TOP_MANGA_LIMIT as i64], |row| {
            let count: i64 = row.get(1)?;
            let pages: i64 = row.get(2)?;
            Ok(TopManga {
                manga_title: row.get(0)?,
                chapter_count: count.max(0) as u64,
                total_pages: pages.max(0) as u64,
            })
        })?;
        let mut top_manga = Vec::new();
        for row in rows {
            top_manga.push(row?);
        }

        let total_chapters = total_chapters.max(0) as u64;
        let total_pages = total_pages.max(0) as u64;
        let avg_pages_per_chapter = if total_chapters == 0 {
            0.0
        } else {
            total_pages as f64 / total_chapters as f64
        };

        Ok(Stats {
            total_manga: total_manga.max(0) as u64,
            total_chapters,
            total_pages,
            avg_pages_per_chapter,
            top_manga,
        })
    }

    fn search_manga(&self, query: &str) -> Result<Vec<MangaDocument>, StoreError> {
        // SQLite's LOWER() only folds ASCII, so accented titles are matched here.
        let needle = query.trim().to_lowercase();
        let sql = format!("SELECT {} FROM mangas ORDER BY title", MANGA_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], MangaRow::from_row)?;
        let mut found = Vec::new();
        for row in rows {
            let doc = row?.into_document()?;
            let hit = doc.title.to_lowercase().contains(&needle)
                || doc
                    .alt_title
                    .as_deref()
                    .is_some_and(|alt| alt.to_lowercase().contains(&needle));
            if hit {
                found.push(doc);
            }
        }
        Ok(found)
    }
}
