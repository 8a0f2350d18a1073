//! Clippings export parsing.
//!
//! The export is a flat stream of records separated by `==========` lines.
//! Each record has a `Title (Author)` line, a metadata line and a body:
//!
//! ```text
//! Dune (Herbert, Frank)
//! - Your Highlight on page 12 | location 180-183 | Added on Monday, 1 January 2024
//!
//! I must not fear.
//! ==========
//! ```
//!
//! Notes are separate records that follow the highlight they annotate, not
//! always immediately. [`parse_clippings`] pairs them back up.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::model::{Clipping, Highlight, PendingHighlight, RawEntry};

const BYTE_ORDER_MARK: char = '\u{FEFF}';
const NOTE_MARKER: &str = "Your Note";

static DELIMITER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^={3,}\r*\n").expect("delimiter regex should compile"));
static TITLE_AUTHOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(.+) \((.+)\)").expect("title regex should compile"));
static PAGE_LOCATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"page (\d+) \| location (\d+(?:-\d+)?)").expect("location regex should compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    TooShort,
    MissingTitleAuthor,
    MissingPageLocation,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use SkipReason::*;
        match self {
            TooShort => write!(f, "record has no body"),
            MissingTitleAuthor => write!(f, "first line is not `Title (Author)`"),
            MissingPageLocation => write!(f, "metadata line has no page/location"),
        }
    }
}

/// Counters describing one parse pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseReport {
    pub records: usize,
    pub highlights: usize,
    pub notes: usize,
    pub matched_notes: usize,
    pub orphan_notes: usize,
    pub skipped_too_short: usize,
    pub skipped_title_author: usize,
    pub skipped_page_location: usize,
}

impl ParseReport {
    pub fn skipped(&self) -> usize {
        self.skipped_too_short + self.skipped_title_author + self.skipped_page_location
    }

    fn record_skip(&mut self, reason: SkipReason) {
        match reason {
            SkipReason::TooShort => self.skipped_too_short += 1,
            SkipReason::MissingTitleAuthor => self.skipped_title_author += 1,
            SkipReason::MissingPageLocation => self.skipped_page_location += 1,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ParsedClippings {
    pub clippings: Vec<Clipping>,
    pub report: ParseReport,
}

/// Parses a whole export into reconciled clippings.
pub fn parse_clippings(raw: &str) -> ParsedClippings {
    let cleaned: String = raw.chars().filter(|c| *c != BYTE_ORDER_MARK).collect();
    let mut report = ParseReport::default();
    let mut entries = Vec::new();

    for (index, record) in segment(&cleaned).into_iter().enumerate() {
        report.records += 1;
        match parse_entry(record) {
            Ok(entry) => {
                if entry.is_note {
                    report.notes += 1;
                } else {
                    report.highlights += 1;
                }
                entries.push(entry);
            }
            Err(reason) => {
                tracing::warn!(record = index, %reason, "skipping malformed clipping");
                report.record_skip(reason);
            }
        }
    }

    let clippings = reconcile(entries, &mut report);
    tracing::debug!(?report, "parsed clippings");

    ParsedClippings { clippings, report }
}

/// Splits the export into records. The text after the last delimiter is
/// dropped, as are whitespace-only records.
pub fn segment(raw: &str) -> Vec<&str> {
    let mut parts: Vec<&str> = DELIMITER_RE.split(raw).collect();
    parts.pop();
    parts.retain(|part| !part.trim().is_empty());
    parts
}

pub fn parse_entry(record: &str) -> Result<RawEntry, SkipReason> {
    let lines: Vec<&str> = record.trim().lines().collect();
    if lines.len() < 3 {
        return Err(SkipReason::TooShort);
    }

    let captures = TITLE_AUTHOR_RE
        .captures(lines[0])
        .ok_or(SkipReason::MissingTitleAuthor)?;
    let title = captures[1].trim().to_string();
    let author = format_author_name(&captures[2]);

    let meta = lines[1];
    let is_note = meta.contains(NOTE_MARKER);
    let captures = PAGE_LOCATION_RE
        .captures(meta)
        .ok_or(SkipReason::MissingPageLocation)?;

    Ok(RawEntry {
        title,
        author,
        page: captures[1].to_string(),
        location: captures[2].to_string(),
        body: lines[2..].join("\n").trim().to_string(),
        is_note,
    })
}

/// Turns `Last, First` into `First Last`. Anything else is only trimmed.
pub fn format_author_name(raw: &str) -> String {
    let raw = raw.trim();
    match raw.split_once(", ") {
        Some((last, first)) if !first.contains(',') && !first.contains(';') => {
            format!("{} {}", first.trim(), last.trim())
        }
        _ => raw.to_string(),
    }
}

/// Highlights waiting for a note, indexed by `(title, page)`.
///
/// Slots keep insertion order so unmatched highlights are flushed in the
/// order they were read.
#[derive(Debug, Default)]
struct PendingSet {
    slots: Vec<Option<PendingHighlight>>,
    by_page: HashMap<(String, String), Vec<usize>>,
}

impl PendingSet {
    fn push(&mut self, pending: PendingHighlight) {
        let key = (pending.title.clone(), pending.page.clone());
        self.by_page.entry(key).or_default().push(self.slots.len());
        self.slots.push(Some(pending));
    }

    /// Removes and returns the oldest highlight the note can attach to.
    fn take_match(&mut self, title: &str, page: &str, location: &str) -> Option<PendingHighlight> {
        let key = (title.to_string(), page.to_string());
        let candidates = self.by_page.get_mut(&key)?;

        let position = candidates.iter().position(|&slot| {
            self.slots[slot]
                .as_ref()
                .is_some_and(|h| h.location == location || h.location.ends_with(location))
        })?;

        let slot = candidates.remove(position);
        if candidates.is_empty() {
            self.by_page.remove(&key);
        }
        self.slots[slot].take()
    }

    fn drain(self) -> impl Iterator<Item = PendingHighlight> {
        self.slots.into_iter().flatten()
    }
}

/// Pairs notes with the highlights they annotate.
pub fn reconcile(entries: Vec<RawEntry>, report: &mut ParseReport) -> Vec<Clipping> {
    let mut pending = PendingSet::default();
    let mut clippings = Vec::new();

    for entry in entries {
        if !entry.is_note {
            pending.push(PendingHighlight {
                title: entry.title,
                author: entry.author,
                page: entry.page,
                location: entry.location,
                text: entry.body,
            });
            continue;
        }

        let highlight = match pending.take_match(&entry.title, &entry.page, &entry.location) {
            Some(matched) => {
                report.matched_notes += 1;
                Highlight {
                    text: matched.text,
                    note: Some(entry.body),
                    page: entry.page,
                    location: matched.location,
                }
            }
            None => {
                report.orphan_notes += 1;
                tracing::debug!(title = %entry.title, location = %entry.location, "note has no matching highlight");
                Highlight {
                    text: String::new(),
                    note: Some(entry.body),
                    page: entry.page,
                    location: entry.location,
                }
            }
        };

        clippings.push(Clipping {
            title: entry.title,
            author: entry.author,
            highlight,
        });
    }

    for leftover in pending.drain() {
        clippings.push(Clipping {
            title: leftover.title,
            author: leftover.author,
            highlight: Highlight {
                text: leftover.text,
                note: None,
                page: leftover.page,
                location: leftover.location,
            },
        });
    }

    clippings
}

#[cfg(test)]
mod tests {
    use super::*;

    fn export(records: &[&str]) -> String {
        let mut out = String::new();
        for record in records {
            out.push_str(record);
            out.push_str("\r\n==========\r\n");
        }
        out
    }

    #[test]
    fn test_segment_drops_trailing_and_blank_records() {
        let raw = "first\n==========\n  \n==========\r\nsecond\n===\ntrailing";
        assert_eq!(segment(raw), vec!["first\n", "second\n"]);
    }

    #[test]
    fn test_segment_ignores_short_equals_runs() {
        let raw = "a == b\n==\nstill first\n==========\n";
        assert_eq!(segment(raw), vec!["a == b\n==\nstill first\n"]);
    }

    #[test]
    fn test_parse_entry_highlight() {
        let entry = parse_entry(
            "Dune (Herbert, Frank)\r\n- Your Highlight on page 12 | location 180-183 | Added on Monday\r\n\r\nI must not fear.\r\n",
        )
        .unwrap();

        assert_eq!(entry.title, "Dune");
        assert_eq!(entry.author, "Frank Herbert");
        assert_eq!(entry.page, "12");
        assert_eq!(entry.location, "180-183");
        assert_eq!(entry.body, "I must not fear.");
        assert!(!entry.is_note);
    }

    #[test]
    fn test_parse_entry_note_and_nested_parens() {
        let entry = parse_entry(
            "The Rust Book (2nd Edition) (Klabnik, Steve)\n- Your Note on page 3 | location 40\n\nowned",
        )
        .unwrap();

        assert_eq!(entry.title, "The Rust Book (2nd Edition)");
        assert_eq!(entry.author, "Steve Klabnik");
        assert!(entry.is_note);
        assert_eq!(entry.location, "40");
    }

    #[test]
    fn test_parse_entry_rejects_malformed() {
        assert_eq!(parse_entry("Title (A)\npage 1 | location 2"), Err(SkipReason::TooShort));
        assert_eq!(
            parse_entry("No author here\npage 1 | location 2\nbody"),
            Err(SkipReason::MissingTitleAuthor)
        );
        assert_eq!(
            parse_entry("Book (Author)\n- Your Highlight at location 2\nbody"),
            Err(SkipReason::MissingPageLocation)
        );
    }

    #[test]
    fn test_format_author_name() {
        assert_eq!(format_author_name("Herbert, Frank"), "Frank Herbert");
        assert_eq!(format_author_name("  Ursula K. Le Guin "), "Ursula K. Le Guin");
        assert_eq!(format_author_name("Smith, J; Doe, A"), "Smith, J; Doe, A");
    }

    #[test]
    fn test_note_merges_with_range_highlight() {
        let raw = export(&[
            "Book (Author)\npage 5 | location 100-105\nHello world",
            "Book (Author)\nYour Note | page 5 | location 105\nA note",
        ]);
        let parsed = parse_clippings(&raw);

        assert_eq!(parsed.clippings.len(), 1);
        assert_eq!(
            parsed.clippings[0].highlight,
            Highlight {
                text: "Hello world".to_string(),
                note: Some("A note".to_string()),
                page: "5".to_string(),
                location: "100-105".to_string(),
            }
        );
        assert_eq!(parsed.report.matched_notes, 1);
    }

    #[test]
    fn test_note_matches_once_and_interleaving() {
        let raw = export(&[
            "Book (Author)\npage 5 | location 100\nfirst",
            "Other (Someone)\npage 5 | location 100\nother book",
            "Book (Author)\nYour Note | page 5 | location 100\nnote one",
            "Book (Author)\nYour Note | page 5 | location 100\nnote two",
        ]);
        let parsed = parse_clippings(&raw);
        let clippings = parsed.clippings;

        assert_eq!(clippings.len(), 3);
        assert_eq!(clippings[0].highlight.text, "first");
        assert_eq!(clippings[0].highlight.note.as_deref(), Some("note one"));

        // Second note finds nothing left to attach to.
        assert_eq!(clippings[1].title, "Book");
        assert_eq!(clippings[1].highlight.text, "");
        assert_eq!(clippings[1].highlight.note.as_deref(), Some("note two"));
        assert_eq!(clippings[1].highlight.location, "100");

        // Unmatched highlights are flushed last.
        assert_eq!(clippings[2].title, "Other");
        assert_eq!(clippings[2].highlight.note, None);
        assert_eq!(parsed.report.orphan_notes, 1);
    }

    #[test]
    fn test_note_on_other_page_is_orphan() {
        let raw = export(&[
            "Book (Author)\npage 5 | location 100-105\ntext",
            "Book (Author)\nYour Note | page 6 | location 105\nelsewhere",
        ]);
        let clippings = parse_clippings(&raw).clippings;

        assert_eq!(clippings.len(), 2);
        assert!(clippings[0].highlight.is_orphan_note());
        assert_eq!(clippings[0].highlight.page, "6");
        assert_eq!(clippings[1].highlight.text, "text");
    }

    #[test]
    fn test_oldest_candidate_wins() {
        let raw = export(&[
            "Book (Author)\npage 1 | location 10-20\nolder",
            "Book (Author)\npage 1 | location 15-20\nnewer",
            "Book (Author)\nYour Note | page 1 | location 20\nnote",
        ]);
        let clippings = parse_clippings(&raw).clippings;

        assert_eq!(clippings[0].highlight.text, "older");
        assert_eq!(clippings[0].highlight.location, "10-20");
        assert_eq!(clippings[1].highlight.text, "newer");
        assert_eq!(clippings[1].highlight.note, None);
    }

    #[test]
    fn test_report_counts_and_byte_order_mark() {
        let raw = format!(
            "\u{FEFF}{}",
            export(&[
                "Book (Author)\npage 1 | location 1\nkept",
                "garbage line\npage 1 | location 1\nbody",
                "Book (Author)\nno metadata\nbody",
                "Book (Author)\npage 1",
            ])
        );
        let parsed = parse_clippings(&raw);

        assert_eq!(parsed.clippings.len(), 1);
        assert_eq!(parsed.clippings[0].title, "Book");
        assert_eq!(parsed.report.records, 4);
        assert_eq!(parsed.report.skipped(), 3);
        assert_eq!(parsed.report.skipped_title_author, 1);
        assert_eq!(parsed.report.skipped_page_location, 1);
        assert_eq!(parsed.report.skipped_too_short, 1);
    }

    #[test]
    fn test_every_highlight_has_page_and_location() {
        let raw = export(&[
            "A (X)\npage 1 | location 1-4\none",
            "A (X)\nYour Note | page 1 | location 4\nn1",
            "A (X)\nYour Note | page 2 | location 9\nn2",
            "B (Y)\npage 7 | location 70\ntwo",
        ]);
        for clipping in parse_clippings(&raw).clippings {
            let h = clipping.highlight;
            assert!(!h.page.is_empty());
            assert!(!h.location.is_empty());
            if h.text.is_empty() {
                assert!(h.note.is_some());
            }
        }
    }
}
