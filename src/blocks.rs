//! Conversion of highlights into Notion content blocks.
//!
//! Notion accepts at most 100 children per request and at most 2000
//! characters per rich text run, so highlights are chunked and emitted in
//! bounded batches. A batch never splits a highlight.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::model::Highlight;

pub const MAX_BLOCKS_PER_REQUEST: usize = 100;
pub const MAX_TEXT_LENGTH: usize = 2000;
pub const SAFETY_MARGIN: usize = 5;

const NOT_AVAILABLE: &str = "N/A";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLimits {
    pub max_blocks_per_request: usize,
    pub max_text_length: usize,
    pub safety_margin: usize,
}

impl Default for BlockLimits {
    fn default() -> Self {
        Self {
            max_blocks_per_request: MAX_BLOCKS_PER_REQUEST,
            max_text_length: MAX_TEXT_LENGTH,
            safety_margin: SAFETY_MARGIN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextContent {
    pub content: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Annotations {
    pub italic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RichText {
    #[serde(rename = "type")]
    kind: &'static str,
    pub text: TextContent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<Annotations>,
}

impl RichText {
    pub fn plain(content: impl Into<String>) -> Self {
        Self {
            kind: "text",
            text: TextContent {
                content: content.into(),
            },
            annotations: None,
        }
    }

    pub fn italic(content: impl Into<String>) -> Self {
        Self {
            annotations: Some(Annotations { italic: true }),
            ..Self::plain(content)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Paragraph(Vec<RichText>),
    Quote(Vec<RichText>),
    Divider,
}

impl Block {
    pub fn kind(&self) -> &'static str {
        match self {
            Block::Paragraph(_) => "paragraph",
            Block::Quote(_) => "quote",
            Block::Divider => "divider",
        }
    }

    /// Concatenated text of all rich text runs.
    pub fn plain_text(&self) -> String {
        match self {
            Block::Paragraph(runs) | Block::Quote(runs) => {
                runs.iter().map(|r| r.text.content.as_str()).collect()
            }
            Block::Divider => String::new(),
        }
    }
}

#[derive(Serialize)]
struct RichTextBody<'a> {
    rich_text: &'a [RichText],
}

#[derive(Serialize)]
struct EmptyBody {}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3))?;
        map.serialize_entry("object", "block")?;
        map.serialize_entry("type", self.kind())?;
        match self {
            Block::Paragraph(runs) | Block::Quote(runs) => {
                map.serialize_entry(self.kind(), &RichTextBody { rich_text: runs })?
            }
            Block::Divider => map.serialize_entry(self.kind(), &EmptyBody {})?,
        }
        map.end()
    }
}

/// Blocks for a prefix of the input plus how many highlights they cover.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    pub blocks: Vec<Block>,
    pub processed: usize,
}

pub fn format_batch(highlights: &[Highlight], limits: &BlockLimits) -> Batch {
    let mut blocks = Vec::new();
    let mut processed = 0;

    for highlight in highlights {
        let highlight_blocks = highlight_blocks(highlight, limits.max_text_length);
        if blocks.len() + highlight_blocks.len() > limits.max_blocks_per_request {
            break;
        }

        blocks.extend(highlight_blocks);
        processed += 1;

        // Stop once within the safety margin of the cap.
        if blocks.len() + limits.safety_margin >= limits.max_blocks_per_request {
            break;
        }
    }

    tracing::debug!("created {} blocks for {} highlights", blocks.len(), processed);
    Batch { blocks, processed }
}

pub fn highlight_blocks(highlight: &Highlight, max_text_length: usize) -> Vec<Block> {
    let mut blocks = Vec::new();

    if !highlight.text.trim().is_empty() {
        for chunk in chunk_text(&highlight.text, max_text_length) {
            blocks.push(Block::Paragraph(vec![RichText::plain(chunk)]));
        }
    }

    blocks.push(Block::Paragraph(vec![RichText::italic(format!(
        "Page: {}, Location: {}",
        or_not_available(&highlight.page),
        or_not_available(&highlight.location)
    ))]));

    if let Some(note) = highlight.note.as_deref().filter(|n| !n.is_empty()) {
        for (i, chunk) in chunk_text(note, max_text_length).into_iter().enumerate() {
            let runs = if i == 0 {
                vec![RichText::italic("Note: "), RichText::plain(chunk)]
            } else {
                vec![RichText::plain(chunk)]
            };
            blocks.push(Block::Quote(runs));
        }
    }

    blocks.push(Block::Divider);
    blocks
}

fn or_not_available(value: &str) -> &str {
    if value.is_empty() { NOT_AVAILABLE } else { value }
}

/// Splits text into chunks of at most `max_length` UTF-16 code units, the
/// unit Notion measures rich text in. Prefers to break after a sentence, at
/// a newline or at a space within the last fifth of the window. Whitespace
/// at chunk boundaries is dropped.
pub fn chunk_text(text: &str, max_length: usize) -> Vec<String> {
    let max_length = max_length.max(1);
    if text.encode_utf16().count() <= max_length {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        let cut = break_point(remaining, max_length);
        chunks.push(remaining[..cut].to_string());
        remaining = remaining[cut..].trim();
    }

    chunks
}

/// Byte offset at which to cut `text`. Positions are counted in UTF-16
/// units and cuts always land on a char boundary.
fn break_point(text: &str, max_length: usize) -> usize {
    let mut last_space = None;
    let mut last_newline = None;
    let mut last_period = None;

    // (utf-16 position, byte offset) of the end of the window.
    let mut window = (0, 0);
    for (byte, c) in text.char_indices() {
        let position = window.0;
        if position + c.len_utf16() > max_length {
            break;
        }
        match c {
            ' ' => last_space = Some((position, byte)),
            '\n' => last_newline = Some((position, byte)),
            '.' => last_period = Some((position, byte)),
            _ => {}
        }
        window = (position + c.len_utf16(), byte + c.len_utf8());
    }

    if window.1 == text.len() {
        return text.len();
    }
    if window.1 == 0 {
        // A single char wider than the window.
        return text.chars().next().map_or(text.len(), char::len_utf8);
    }

    let threshold = max_length as f64 * 0.8;
    let beyond_threshold = |position: usize| position as f64 > threshold;

    let mut chosen = window;
    if let Some(space) = last_space.filter(|&(p, _)| beyond_threshold(p)) {
        chosen = space;
    }
    if let Some(newline) = last_newline.filter(|&(p, _)| beyond_threshold(p)) {
        if last_space.is_none_or(|(space, _)| newline.0 > space) {
            chosen = newline;
        }
    }
    if let Some((position, byte)) = last_period.filter(|&(p, _)| beyond_threshold(p)) {
        if position > chosen.0 {
            chosen = (position + 1, byte + 1);
        }
    }

    chosen.1
}
