//! In-process [`Store`] used by tests and `--storage memory` runs.

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use super::Store;
use crate::error::StorageError;
use crate::models::{Document, Message, Page};

#[derive(Debug, Default)]
struct Tables {
    documents: Vec<Document>,
    pages: Vec<Page>,
    messages: Vec<Message>,
}

/// Volatile store with sequential ids starting at 1.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every document, in insertion order.
    pub async fn documents(&self) -> Vec<Document> {
        self.tables.lock().await.documents.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_document(
        &self,
        title: &str,
        file_path: &str,
    ) -> Result<Document, StorageError> {
        let mut tables = self.tables.lock().await;
        let document = Document {
            id: tables.documents.len() as i64 + 1,
            title: title.to_string(),
            file_path: file_path.to_string(),
            is_processed: false,
            created_at: Utc::now(),
        };
        tables.documents.push(document.clone());
        Ok(document)
    }

    async fn create_page(
        &self,
        document_id: i64,
        page_number: u32,
        content: &str,
    ) -> Result<Page, StorageError> {
        let mut tables = self.tables.lock().await;
        if !tables.documents.iter().any(|doc| doc.id == document_id) {
            return Err(StorageError(format!("document {} does not exist", document_id)));
        }
        if tables
            .pages
            .iter()
            .any(|page| page.document_id == document_id && page.page_number == page_number)
        {
            return Err(StorageError(format!(
                "page {} already exists for document {}",
                page_number, document_id
            )));
        }
        let page = Page {
            id: tables.pages.len() as i64 + 1,
            document_id,
            page_number,
            content: content.to_string(),
            is_processed: false,
        };
        tables.pages.push(page.clone());
        Ok(page)
    }

    async fn mark_page_processed(&self, page_id: i64) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().await;
        match tables.pages.iter_mut().find(|page| page.id == page_id) {
            Some(page) => {
                page.is_processed = true;
                Ok(())
            }
            None => Err(StorageError(format!("page {} does not exist", page_id))),
        }
    }

    async fn mark_document_processed(&self, document_id: i64) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().await;
        match tables.documents.iter_mut().find(|doc| doc.id == document_id) {
            Some(doc) => {
                doc.is_processed = true;
                Ok(())
            }
            None => Err(StorageError(format!("document {} does not exist", document_id))),
        }
    }

    async fn get_document(&self, document_id: i64) -> Result<Option<Document>, StorageError> {
        let tables = self.tables.lock().await;
        Ok(tables.documents.iter().find(|doc| doc.id == document_id).cloned())
    }

    async fn list_pages(&self, document_id: i64) -> Result<Vec<Page>, StorageError> {
        let tables = self.tables.lock().await;
        let mut pages: Vec<Page> = tables
            .pages
            .iter()
            .filter(|page| page.document_id == document_id)
            .cloned()
            .collect();
        pages.sort_by_key(|page| page.page_number);
        Ok(pages)
    }

    async fn create_exchange(
        &self,
        user_content: &str,
        answer: &str,
    ) -> Result<(Message, Message), StorageError> {
        let mut tables = self.tables.lock().await;
        let timestamp = Utc::now();
        let next_id = tables.messages.len() as i64 + 1;
        let user = Message {
            id: next_id,
            is_ai: false,
            content: user_content.to_string(),
            timestamp,
        };
        let reply = Message {
            id: next_id + 1,
            is_ai: true,
            content: answer.to_string(),
            timestamp,
        };
        tables.messages.push(user.clone());
        tables.messages.push(reply.clone());
        Ok((user, reply))
    }

    async fn list_messages(&self) -> Result<Vec<Message>, StorageError> {
        Ok(self.tables.lock().await.messages.clone())
    }
}
