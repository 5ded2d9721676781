//! Document ingestion: chunk, persist pages, embed, index, mark processed.
//!
//! Per-page failures are collected as [`PageOutcome`]s and the document's processed
//! flag is derived from the aggregate once every page has been attempted.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use tracing::{error, info, warn};

use crate::chunker::Chunker;
use crate::embedder::Embedder;
use crate::error::{EmbeddingError, ExtractionError, IngestError, StorageError};
use crate::external::bounded;
use crate::models::{Document, Page};
use crate::storage::Store;
use crate::vector_store::{CollectionName, IndexRecord, RecordMetadata, VectorIndex};

/// Lifecycle of one document through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionState {
    /// Bytes received.
    Uploaded,
    /// Pages extracted and persisted.
    Chunked,
    /// Pages are being embedded and indexed.
    Embedding,
    /// Every page attempted.
    Indexed,
    /// Every page indexed and the document flagged processed.
    Processed,
    /// The run stopped early or left pages unindexed.
    Failed,
}

impl fmt::Display for IngestionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IngestionState::Uploaded => "uploaded",
            IngestionState::Chunked => "chunked",
            IngestionState::Embedding => "embedding",
            IngestionState::Indexed => "indexed",
            IngestionState::Processed => "processed",
            IngestionState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Result of attempting one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    /// Embedded, indexed and marked processed.
    Indexed {
        /// Page that succeeded.
        page_number: u32,
    },
    /// Embedding failed; the page stays unprocessed.
    Skipped {
        /// Page that was skipped.
        page_number: u32,
        /// Why the embedding failed.
        reason: String,
    },
}

/// A page left unindexed and the embedding error behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageFailure {
    /// Skipped page.
    pub page_number: u32,
    /// Rendered embedding error.
    pub reason: String,
}

/// Summary returned to the caller once ingestion finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    /// Created document row.
    pub document_id: i64,
    /// Document title.
    pub title: String,
    /// Pages extracted from the source.
    pub total_pages: usize,
    /// Pages indexed and marked processed.
    pub indexed_pages: usize,
    /// Page numbers whose embedding failed.
    pub skipped_pages: Vec<u32>,
    /// Why each skipped page failed, in page order.
    pub failures: Vec<PageFailure>,
    /// True when every page was indexed.
    pub processed: bool,
    /// Final lifecycle state.
    pub state: IngestionState,
}

impl IngestionReport {
    fn from_outcomes(document: &Document, outcomes: &[PageOutcome]) -> Self {
        let failures: Vec<PageFailure> = outcomes
            .iter()
            .filter_map(|outcome| match outcome {
                PageOutcome::Skipped {
                    page_number,
                    reason,
                } => Some(PageFailure {
                    page_number: *page_number,
                    reason: reason.clone(),
                }),
                PageOutcome::Indexed { .. } => None,
            })
            .collect();
        let skipped_pages: Vec<u32> = failures.iter().map(|f| f.page_number).collect();
        let processed = skipped_pages.is_empty();
        Self {
            document_id: document.id,
            title: document.title.clone(),
            total_pages: outcomes.len(),
            indexed_pages: outcomes.len() - skipped_pages.len(),
            skipped_pages,
            failures,
            processed,
            state: if processed {
                IngestionState::Processed
            } else {
                IngestionState::Failed
            },
        }
    }
}

/// Write path: source bytes into persisted pages and indexed embeddings.
pub struct IngestionPipeline {
    chunker: Arc<dyn Chunker>,
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    store: Arc<dyn Store>,
    collection: CollectionName,
    call_timeout: Duration,
    concurrency: usize,
}

impl IngestionPipeline {
    /// Builds a sequential pipeline with a 30s per-call timeout.
    pub fn new(
        chunker: Arc<dyn Chunker>,
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        store: Arc<dyn Store>,
        collection: CollectionName,
    ) -> Self {
        Self {
            chunker,
            embedder,
            index,
            store,
            collection,
            call_timeout: Duration::from_secs(30),
            concurrency: 1,
        }
    }

    /// Bounds every embedding call.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Number of pages embedded and indexed at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Ingests one document.
    ///
    /// Extraction failures persist nothing. Index and storage failures abort the run and
    /// leave the document unprocessed. Embedding failures skip the page and yield a
    /// report with `processed == false`.
    pub async fn ingest(
        &self,
        title: &str,
        file_path: &str,
        bytes: Vec<u8>,
    ) -> Result<IngestionReport, IngestError> {
        info!(title, state = %IngestionState::Uploaded, "ingestion started");
        let chunker = Arc::clone(&self.chunker);
        let pages = tokio::task::spawn_blocking(move || chunker.split(&bytes))
            .await
            .map_err(|err| ExtractionError::Parse(format!("extraction task failed: {err}")))
            .and_then(|result| result)
            .map_err(|err| {
                error!(title, state = %IngestionState::Failed, error = %err, "extraction failed");
                IngestError::Extraction(err)
            })?;
        if pages.is_empty() {
            return Err(IngestError::Extraction(ExtractionError::NoPages));
        }

        let document = self
            .store
            .create_document(title, file_path)
            .await
            .map_err(|source| IngestError::Storage {
                document_id: None,
                source,
            })?;
        let mut stored = Vec::with_capacity(pages.len());
        for page in &pages {
            let row = self
                .store
                .create_page(document.id, page.page_number, &page.text)
                .await
                .map_err(|source| self.abort_storage(&document, source))?;
            stored.push(row);
        }
        info!(
            document_id = document.id,
            pages = stored.len(),
            state = %IngestionState::Chunked,
            "pages persisted"
        );

        info!(document_id = document.id, state = %IngestionState::Embedding, "indexing pages");
        let outcomes: Vec<PageOutcome> = stream::iter(stored)
            .map(|page| self.index_page(&document, page))
            .buffered(self.concurrency)
            .try_collect()
            .await?;
        info!(document_id = document.id, state = %IngestionState::Indexed, "all pages attempted");

        let report = IngestionReport::from_outcomes(&document, &outcomes);
        if report.processed {
            self.store
                .mark_document_processed(document.id)
                .await
                .map_err(|source| self.abort_storage(&document, source))?;
            info!(
                document_id = document.id,
                pages = report.total_pages,
                state = %IngestionState::Processed,
                "document processed"
            );
        } else {
            warn!(
                document_id = document.id,
                skipped = ?report.skipped_pages,
                failures = ?report.failures,
                state = %IngestionState::Failed,
                "document partially indexed; left unprocessed"
            );
        }
        Ok(report)
    }

    async fn index_page(
        &self,
        document: &Document,
        page: Page,
    ) -> Result<PageOutcome, IngestError> {
        let embedding = match self.embed(&page.content).await {
            Ok(embedding) => embedding,
            Err(err) => {
                warn!(
                    document_id = document.id,
                    page_number = page.page_number,
                    error = %err,
                    "embedding failed; skipping page"
                );
                return Ok(PageOutcome::Skipped {
                    page_number: page.page_number,
                    reason: err.to_string(),
                });
            }
        };
        let record = IndexRecord::new(
            embedding,
            page.content,
            RecordMetadata {
                document_id: document.id,
                page_number: page.page_number,
            },
        );
        self.index
            .upsert(&self.collection, record)
            .await
            .map_err(|source| {
                error!(
                    document_id = document.id,
                    page_number = page.page_number,
                    state = %IngestionState::Failed,
                    error = %source,
                    "index write failed; aborting ingestion"
                );
                IngestError::Index {
                    document_id: document.id,
                    source,
                }
            })?;
        self.store
            .mark_page_processed(page.id)
            .await
            .map_err(|source| self.abort_storage(document, source))?;
        Ok(PageOutcome::Indexed {
            page_number: page.page_number,
        })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        bounded(
            self.call_timeout,
            self.embedder.embed(text),
            EmbeddingError::Timeout,
        )
        .await
    }

    fn abort_storage(&self, document: &Document, source: StorageError) -> IngestError {
        error!(
            document_id = document.id,
            state = %IngestionState::Failed,
            error = %source,
            "storage failure; aborting ingestion"
        );
        IngestError::Storage {
            document_id: Some(document.id),
            source,
        }
    }
}
