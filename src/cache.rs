//! Per-book delivery cursors persisted between runs.
//!
//! The file is a JSON object keyed by book title:
//!
//! ```json
//! { "Dune": { "author": "Frank Herbert", "highlightCount": 42 } }
//! ```
//!
//! A cursor only moves after every pending highlight of a book was delivered.
//! If a run dies between a successful append and the cursor update, the next
//! run sends those highlights again.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::error::CacheError;
use crate::model::{BookGroup, Highlight, SyncRecord};

#[derive(Debug, Default)]
pub struct SyncCache {
    path: PathBuf,
    records: BTreeMap<String, SyncRecord>,
}

impl SyncCache {
    /// Loads the cache, starting empty when the file does not exist yet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CacheError> {
        let path = path.as_ref().to_path_buf();

        let records = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| CacheError::Json {
                path: path.display().to_string(),
                source,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no sync cache yet, starting fresh");
                BTreeMap::new()
            }
            Err(source) => {
                return Err(CacheError::Io {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        Ok(Self { path, records })
    }

    pub fn save(&self) -> Result<(), CacheError> {
        let io_error = |source| CacheError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let json = serde_json::to_string_pretty(&self.records).map_err(|source| CacheError::Json {
            path: self.path.display().to_string(),
            source,
        })?;

        // Atomic replace.
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(io_error)?;
        fs::rename(&tmp, &self.path).map_err(io_error)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, title: &str) -> Option<&SyncRecord> {
        self.records.get(title)
    }

    pub fn synced_count(&self, title: &str) -> usize {
        self.get(title).map_or(0, |r| r.highlight_count)
    }

    /// Highlights of `book` that have not been delivered yet.
    pub fn unsynced<'a>(&self, book: &'a BookGroup) -> &'a [Highlight] {
        let cursor = self.synced_count(&book.title).min(book.highlights.len());
        &book.highlights[cursor..]
    }

    /// Moves the cursor of `book` to its full highlight count. The cursor
    /// never moves backwards.
    pub fn mark_synced(&mut self, book: &BookGroup) {
        let total = book.highlights.len();
        let record = self
            .records
            .entry(book.title.clone())
            .or_insert_with(|| SyncRecord {
                author: book.author.clone(),
                highlight_count: 0,
                synced_at: None,
            });

        record.author = book.author.clone();
        record.highlight_count = record.highlight_count.max(total);
        record.synced_at = Some(Utc::now());
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book(title: &str, count: usize) -> BookGroup {
        BookGroup {
            title: title.to_string(),
            author: "Author".to_string(),
            highlights: (0..count)
                .map(|i| Highlight {
                    text: format!("h{i}"),
                    note: None,
                    page: "1".to_string(),
                    location: i.to_string(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_missing_file_is_empty_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SyncCache::load(dir.path().join("sync.json")).unwrap();
        assert!(cache.is_empty());
        assert_eq!(cache.synced_count("anything"), 0);
    }

    #[test]
    fn test_unsynced_slice_starts_at_cursor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.json");
        fs::write(&path, r#"{"Dune": {"author": "Author", "highlightCount": 2}}"#).unwrap();

        let cache = SyncCache::load(&path).unwrap();
        let dune = book("Dune", 5);
        let texts: Vec<&str> = cache.unsynced(&dune).iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["h2", "h3", "h4"]);

        // A cursor past the end yields nothing instead of panicking.
        assert!(cache.unsynced(&book("Dune", 1)).is_empty());
        assert_eq!(cache.unsynced(&book("Other", 2)).len(), 2);
    }

    #[test]
    fn test_mark_synced_is_monotonic_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sync.json");

        let mut cache = SyncCache::load(&path).unwrap();
        cache.mark_synced(&book("Dune", 4));
        cache.mark_synced(&book("Dune", 3));
        assert_eq!(cache.synced_count("Dune"), 4);
        cache.save().unwrap();

        let reloaded = SyncCache::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        let record = reloaded.get("Dune").unwrap();
        assert_eq!(record.highlight_count, 4);
        assert!(record.synced_at.is_some());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sync.json");
        fs::write(&path, "not json").unwrap();

        assert!(matches!(SyncCache::load(&path), Err(CacheError::Json { .. })));
    }
}
