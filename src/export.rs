use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::model::BookGroup;
use crate::parser::ParseReport;

pub const GROUPED_CLIPPINGS_FILE: &str = "grouped-clippings.json";

pub fn read_clippings(path: &Path) -> Result<String> {
    fs::read_to_string(path)
        .with_context(|| format!("failed to read clippings file {}", path.display()))
}

/// Writes `value` as pretty JSON, creating parent directories as needed.
pub fn write_json<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }

    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

pub fn export_grouped_clippings(books: &[BookGroup], output_dir: &Path) -> Result<PathBuf> {
    let path = output_dir.join(GROUPED_CLIPPINGS_FILE);
    write_json(books, &path)?;
    tracing::info!(path = %path.display(), books = books.len(), "exported grouped clippings");
    Ok(path)
}

/// Books reduced to the highlights that carry a note.
pub fn notes_only(books: &[BookGroup]) -> Vec<BookGroup> {
    books.iter().filter_map(BookGroup::with_notes_only).collect()
}

pub fn log_stats(books: &[BookGroup], report: &ParseReport) {
    tracing::info!(
        records = report.records,
        highlights = report.highlights,
        notes = report.notes,
        matched_notes = report.matched_notes,
        orphan_notes = report.orphan_notes,
        skipped = report.skipped(),
        "stats for clippings"
    );

    if report.skipped() > 0 {
        tracing::warn!(
            too_short = report.skipped_too_short,
            title_author = report.skipped_title_author,
            page_location = report.skipped_page_location,
            "some records could not be parsed, the export format may have changed"
        );
    }

    for book in books {
        tracing::info!(
            title = %book.title,
            author = %book.author,
            highlights = book.highlights.len(),
            "book"
        );
    }
}
