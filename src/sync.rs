use std::time::Duration;

use crate::blocks::{BlockLimits, format_batch};
use crate::cache::SyncCache;
use crate::error::SyncError;
use crate::model::{BookGroup, Highlight};
use crate::notion::{
    BOOKMARK_EMOJI, BookProperties, CreatePageParams, DocumentService, QueryFilter,
};

pub const DEFAULT_PACING: Duration = Duration::from_millis(500);

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub books_created: usize,
    pub books_appended: usize,
    pub books_skipped: usize,
    pub highlights_delivered: usize,
    pub requests: usize,
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub database_id: String,
    /// Pause between two requests that write to the same book.
    pub pacing: Duration,
    pub limits: BlockLimits,
}

impl SyncOptions {
    pub fn new(database_id: &str) -> Self {
        Self {
            database_id: database_id.to_string(),
            pacing: DEFAULT_PACING,
            limits: BlockLimits::default(),
        }
    }
}

/// What a sync would send for one book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookPlan {
    pub title: String,
    pub pending: usize,
    pub requests: usize,
}

/// Computes the pending highlights and request count per book without
/// talking to the remote service. Books with nothing pending are left out.
pub fn plan(
    books: &[BookGroup],
    cache: &SyncCache,
    limits: &BlockLimits,
) -> Result<Vec<BookPlan>, SyncError> {
    let mut plans = Vec::new();

    for book in books {
        let pending = cache.unsynced(book);
        if pending.is_empty() {
            continue;
        }

        let mut cursor = 0;
        let mut requests = 0;
        while cursor < pending.len() {
            let batch = format_batch(&pending[cursor..], limits);
            if batch.processed == 0 {
                return Err(SyncError::OversizedHighlight {
                    title: book.title.clone(),
                    index: book.highlights.len() - pending.len() + cursor,
                });
            }
            cursor += batch.processed;
            requests += 1;
        }

        plans.push(BookPlan {
            title: book.title.clone(),
            pending: pending.len(),
            requests,
        });
    }

    Ok(plans)
}

/// Pushes undelivered highlights to the remote service, one book and one
/// batch at a time.
pub struct Syncer<'a, S: DocumentService> {
    service: &'a S,
    options: SyncOptions,
}

impl<'a, S: DocumentService> Syncer<'a, S> {
    pub fn new(service: &'a S, options: SyncOptions) -> Self {
        Self { service, options }
    }

    /// Syncs every book with pending highlights. The cache is saved after
    /// each completed book; the first error aborts the run and leaves the
    /// cursor of the failing book untouched.
    pub async fn sync_books(
        &self,
        books: &[BookGroup],
        cache: &mut SyncCache,
    ) -> Result<SyncStats, SyncError> {
        let mut stats = SyncStats::default();

        if books.iter().all(|book| cache.unsynced(book).is_empty()) {
            tracing::info!("every book is already synced");
            stats.books_skipped = books.len();
            return Ok(stats);
        }

        tracing::info!("syncing highlights to notion");
        for book in books {
            let pending = cache.unsynced(book);
            if pending.is_empty() {
                stats.books_skipped += 1;
                continue;
            }

            tracing::info!(title = %book.title, pending = pending.len(), "syncing book");
            self.sync_book(book, pending, &mut stats).await?;

            stats.highlights_delivered += pending.len();
            cache.mark_synced(book);
            cache.save()?;
        }

        tracing::info!(
            created = stats.books_created,
            appended = stats.books_appended,
            skipped = stats.books_skipped,
            highlights = stats.highlights_delivered,
            requests = stats.requests,
            "successfully synced highlights"
        );
        Ok(stats)
    }

    async fn sync_book(
        &self,
        book: &BookGroup,
        pending: &[Highlight],
        stats: &mut SyncStats,
    ) -> Result<(), SyncError> {
        if let Some(document_id) = self.find_document(&book.title).await? {
            tracing::info!(title = %book.title, "book already present, appending highlights");
            stats.books_appended += 1;
            return self.append_all(book, &document_id, pending, 0, stats).await;
        }

        tracing::info!(title = %book.title, "book not present, creating page");
        let batch = format_batch(pending, &self.options.limits);
        if batch.processed == 0 {
            return Err(self.oversized(book, pending, 0));
        }

        tracing::info!(
            "initial page will contain {} highlights ({} blocks)",
            batch.processed,
            batch.blocks.len()
        );
        let created = self
            .service
            .create_page(CreatePageParams {
                parent_database_id: self.options.database_id.clone(),
                properties: BookProperties {
                    title: book.title.clone(),
                    author: book.author.clone(),
                    book_name: book.title.clone(),
                },
                children: batch.blocks,
                icon: BOOKMARK_EMOJI.to_string(),
            })
            .await
            .map_err(SyncError::remote(&book.title))?;
        stats.books_created += 1;
        stats.requests += 1;

        if batch.processed >= pending.len() {
            return Ok(());
        }

        tokio::time::sleep(self.options.pacing).await;
        let document_id = match self.find_document(&book.title).await? {
            Some(id) => id,
            None => {
                tracing::warn!(
                    title = %book.title,
                    id = %created.id,
                    "new page not visible to query yet, using id from create response"
                );
                created.id
            }
        };

        self.append_all(book, &document_id, pending, batch.processed, stats).await
    }

    async fn append_all(
        &self,
        book: &BookGroup,
        document_id: &str,
        pending: &[Highlight],
        mut cursor: usize,
        stats: &mut SyncStats,
    ) -> Result<(), SyncError> {
        while cursor < pending.len() {
            let batch = format_batch(&pending[cursor..], &self.options.limits);
            if batch.processed == 0 {
                return Err(self.oversized(book, pending, cursor));
            }

            tracing::info!(
                "syncing batch of {} highlights ({} to {})",
                batch.processed,
                cursor + 1,
                cursor + batch.processed
            );
            self.service
                .append_block_children(document_id, batch.blocks)
                .await
                .map_err(SyncError::remote(&book.title))?;
            stats.requests += 1;
            cursor += batch.processed;

            if cursor < pending.len() {
                tokio::time::sleep(self.options.pacing).await;
            }
        }

        Ok(())
    }

    /// Id of the first page whose book name equals `title`.
    pub async fn find_document(&self, title: &str) -> Result<Option<String>, SyncError> {
        let response = self
            .service
            .query_database(
                &self.options.database_id,
                &QueryFilter::BookNameEquals(title.to_string()),
            )
            .await
            .map_err(SyncError::remote(title))?;

        Ok(response.results.into_iter().next().map(|doc| doc.id))
    }

    fn oversized(&self, book: &BookGroup, pending: &[Highlight], cursor: usize) -> SyncError {
        SyncError::OversizedHighlight {
            title: book.title.clone(),
            index: book.highlights.len() - pending.len() + cursor,
        }
    }
}
