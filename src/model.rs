use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One parsed record of the clippings export, before reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub title: String,
    pub author: String,
    pub page: String,
    pub location: String,
    pub body: String,
    pub is_note: bool,
}

/// A highlight waiting for a note that may annotate it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingHighlight {
    pub title: String,
    pub author: String,
    pub page: String,
    pub location: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Highlight {
    pub text: String,
    pub note: Option<String>,
    pub page: String,
    pub location: String,
}

impl Highlight {
    pub fn is_orphan_note(&self) -> bool {
        self.text.is_empty() && self.note.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Clipping {
    pub title: String,
    pub author: String,
    pub highlight: Highlight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookGroup {
    pub title: String,
    pub author: String,
    pub highlights: Vec<Highlight>,
}

impl BookGroup {
    /// Copy of the group keeping only highlights that carry a note.
    pub fn with_notes_only(&self) -> Option<BookGroup> {
        let highlights: Vec<Highlight> = self
            .highlights
            .iter()
            .filter(|h| h.note.is_some())
            .cloned()
            .collect();

        if highlights.is_empty() {
            return None;
        }

        Some(BookGroup {
            title: self.title.clone(),
            author: self.author.clone(),
            highlights,
        })
    }
}

/// Delivery cursor for one book, persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRecord {
    pub author: String,
    pub highlight_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn highlight(text: &str, note: Option<&str>) -> Highlight {
        Highlight {
            text: text.to_string(),
            note: note.map(|n| n.to_string()),
            page: "1".to_string(),
            location: "10".to_string(),
        }
    }

    #[test]
    fn test_with_notes_only() {
        let group = BookGroup {
            title: "Dune".to_string(),
            author: "Frank Herbert".to_string(),
            highlights: vec![highlight("a", None), highlight("b", Some("why"))],
        };

        let filtered = group.with_notes_only().unwrap();
        assert_eq!(filtered.highlights.len(), 1);
        assert_eq!(filtered.highlights[0].text, "b");

        let bare = BookGroup {
            highlights: vec![highlight("a", None)],
            ..group
        };
        assert!(bare.with_notes_only().is_none());
    }

    #[test]
    fn test_sync_record_json_shape() {
        let record = SyncRecord {
            author: "Frank Herbert".to_string(),
            highlight_count: 3,
            synced_at: None,
        };
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value, serde_json::json!({"author": "Frank Herbert", "highlightCount": 3}));
    }

    #[test]
    fn test_orphan_note_detection() {
        assert!(highlight("", Some("lonely")).is_orphan_note());
        assert!(!highlight("text", Some("note")).is_orphan_note());
        assert!(!highlight("text", None).is_orphan_note());
    }
}
