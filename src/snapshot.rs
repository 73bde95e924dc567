//! Per-stage snapshots so an interrupted run resumes where it stopped.

use crate::error::SnapshotError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Joined listing container HTML.
    Listing,
    /// Extracted catalogue items.
    Catalog,
    /// Items with resolved scan variants, no chapters yet.
    Scans,
    /// Full manga tree, ready for reconciliation.
    Chapters,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Listing, Stage::Catalog, Stage::Scans, Stage::Chapters];

    pub fn file_name(self) -> &'static str {
        match self {
            Stage::Listing => "listing.html",
            Stage::Catalog => "catalog.json",
            Stage::Scans => "scans.json",
            Stage::Chapters => "chapters.json",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, stage: Stage) -> PathBuf {
        self.dir.join(stage.file_name())
    }

    pub fn exists(&self, stage: Stage) -> bool {
        self.path(stage).is_file()
    }

    pub fn save_text(&self, stage: Stage, content: &str) -> Result<(), SnapshotError> {
        self.write(stage, content.as_bytes())
    }

    pub fn load_text(&self, stage: Stage) -> Result<Option<String>, SnapshotError> {
        let path = self.path(stage);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    pub fn save_json<T: Serialize>(&self, stage: Stage, value: &T) -> Result<(), SnapshotError> {
        let path = self.path(stage);
        let bytes = serde_json::to_vec_pretty(value).map_err(|source| SnapshotError::Encode {
            path: path.display().to_string(),
            source,
        })?;
        self.write(stage, &bytes)
    }

    /// `Ok(None)` when the stage has no snapshot; a corrupt file is an error.
    pub fn load_json<T: DeserializeOwned>(&self, stage: Stage) -> Result<Option<T>, SnapshotError> {
        let Some(content) = self.load_text(stage)? else {
            return Ok(None);
        };
        serde_json::from_str(&content)
            .map(Some)
            .map_err(|source| SnapshotError::Decode {
                path: self.path(stage).display().to_string(),
                source,
            })
    }

    /// Remove every stage file. Missing files are ignored.
    pub fn clear(&self) -> Result<(), SnapshotError> {
        for stage in Stage::ALL {
            let path = self.path(stage);
            match fs::remove_file(&path) {
                Ok(()) => log::debug!("Removed snapshot {}", path.display()),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(io_error(&path, e)),
            }
        }
        Ok(())
    }

    // Temp file + rename: a stage file is either complete or absent.
    fn write(&self, stage: Stage, bytes: &[u8]) -> Result<(), SnapshotError> {
        fs::create_dir_all(&self.dir).map_err(|e| io_error(&self.dir, e))?;
        let path = self.path(stage);
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, bytes).map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;
        log::debug!("Saved snapshot {}", path.display());
        Ok(())
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SnapshotError {
    SnapshotError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CatalogItem;

    fn item(title: &str) -> CatalogItem {
        CatalogItem {
            url: format!("https://site.test/catalogue/{}/", title),
            image_url: None,
            title: title.to_string(),
            alt_title: None,
            genres: vec!["Action".to_string()],
            content_type: "Scans".to_string(),
            language: "VF".to_string(),
        }
    }

    #[test]
    fn json_round_trip_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path().join("snaps"));
        assert!(snapshots.load_json::<Vec<CatalogItem>>(Stage::Catalog).unwrap().is_none());

        let items = vec![item("solo"), item("tower")];
        snapshots.save_json(Stage::Catalog, &items).unwrap();
        snapshots.save_text(Stage::Listing, "<div id=\"list_catalog\"></div>").unwrap();
        assert!(snapshots.exists(Stage::Catalog));

        let loaded: Vec<CatalogItem> = snapshots.load_json(Stage::Catalog).unwrap().unwrap();
        assert_eq!(loaded, items);

        snapshots.clear().unwrap();
        assert!(!snapshots.exists(Stage::Catalog));
        assert!(!snapshots.exists(Stage::Listing));
        snapshots.clear().unwrap();
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let snapshots = SnapshotStore::new(dir.path());
        fs::write(snapshots.path(Stage::Scans), "{not json").unwrap();
        let err = snapshots.load_json::<Vec<CatalogItem>>(Stage::Scans).unwrap_err();
        assert!(matches!(err, SnapshotError::Decode { .. }));
    }
}
