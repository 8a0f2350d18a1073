use std::collections::{HashMap, HashSet};

use crate::model::{BookGroup, Clipping, Highlight};

/// Groups clippings by title and drops repeated highlight texts.
///
/// Books keep the order in which their title first appears, and the first
/// author seen for a title wins. Within a book the first highlight with a
/// given text is kept; later duplicates are discarded along with their notes.
pub fn group_clippings(clippings: Vec<Clipping>) -> Vec<BookGroup> {
    let mut groups: Vec<BookGroup> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for clipping in clippings {
        match index.get(&clipping.title) {
            Some(&position) => groups[position].highlights.push(clipping.highlight),
            None => {
                index.insert(clipping.title.clone(), groups.len());
                groups.push(BookGroup {
                    title: clipping.title,
                    author: clipping.author,
                    highlights: vec![clipping.highlight],
                });
            }
        }
    }

    for group in &mut groups {
        dedupe_highlights(&mut group.highlights);
    }

    groups
}

/// Runs already grouped books back through [`group_clippings`].
pub fn regroup(groups: Vec<BookGroup>) -> Vec<BookGroup> {
    let clippings = groups
        .into_iter()
        .flat_map(|group| {
            let BookGroup {
                title,
                author,
                highlights,
            } = group;
            highlights.into_iter().map(move |highlight| Clipping {
                title: title.clone(),
                author: author.clone(),
                highlight,
            })
        })
        .collect();

    group_clippings(clippings)
}

fn dedupe_highlights(highlights: &mut Vec<Highlight>) {
    let mut seen = HashSet::new();
    highlights.retain(|h| seen.insert(h.text.clone()));
}
