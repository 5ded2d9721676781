//! Relational persistence for documents, pages and messages.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::models::{Document, Message, Page};

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryStore;
pub use self::postgres::PgStore;

/// CRUD collaborator consumed by the pipelines.
#[async_trait]
pub trait Store: Send + Sync {
    /// Inserts an unprocessed document row.
    async fn create_document(&self, title: &str, file_path: &str)
        -> Result<Document, StorageError>;

    /// Inserts an unprocessed page row.
    async fn create_page(
        &self,
        document_id: i64,
        page_number: u32,
        content: &str,
    ) -> Result<Page, StorageError>;

    /// Flags a page as embedded and indexed.
    async fn mark_page_processed(&self, page_id: i64) -> Result<(), StorageError>;

    /// Flags a document as fully processed.
    async fn mark_document_processed(&self, document_id: i64) -> Result<(), StorageError>;

    /// Looks up a document by id.
    async fn get_document(&self, document_id: i64) -> Result<Option<Document>, StorageError>;

    /// Pages of a document ordered by page number.
    async fn list_pages(&self, document_id: i64) -> Result<Vec<Page>, StorageError>;

    /// Appends a user message and its generated answer together; either both are
    /// stored or neither is. Returns `(user, answer)`.
    async fn create_exchange(
        &self,
        user_content: &str,
        answer: &str,
    ) -> Result<(Message, Message), StorageError>;

    /// All messages in creation order.
    async fn list_messages(&self) -> Result<Vec<Message>, StorageError>;
}
