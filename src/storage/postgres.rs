//! Postgres-backed [`Store`].

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_postgres::{Client, NoTls, Row};
use tracing::error;

use super::Store;
use crate::error::StorageError;
use crate::models::{Document, Message, Page};

const SCHEMA_DDL: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id BIGSERIAL PRIMARY KEY,
    title TEXT NOT NULL,
    file_path TEXT NOT NULL,
    is_processed BOOLEAN NOT NULL DEFAULT FALSE,
    created_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE TABLE IF NOT EXISTS document_pages (
    id BIGSERIAL PRIMARY KEY,
    document_id BIGINT NOT NULL REFERENCES documents(id),
    page_number INTEGER NOT NULL,
    content TEXT NOT NULL,
    is_processed BOOLEAN NOT NULL DEFAULT FALSE,
    UNIQUE (document_id, page_number)
);
CREATE TABLE IF NOT EXISTS messages (
    id BIGSERIAL PRIMARY KEY,
    is_ai BOOLEAN NOT NULL DEFAULT FALSE,
    content TEXT NOT NULL,
    timestamp TIMESTAMPTZ NOT NULL DEFAULT now()
);
";

/// Opens a Postgres connection and drives it on a background task.
pub async fn connect(database_url: &str) -> Result<Arc<Client>> {
    let (client, connection) = tokio_postgres::connect(database_url, NoTls)
        .await
        .context("failed to connect to Postgres")?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            error!(error = %err, "postgres connection error");
        }
    });
    Ok(Arc::new(client))
}

/// [`Store`] over the `documents`, `document_pages` and `messages` tables.
pub struct PgStore {
    client: Arc<Client>,
}

impl PgStore {
    /// Wraps an open connection. Call [`PgStore::prepare`] before first use.
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// Creates the relational schema if missing.
    pub async fn prepare(&self) -> Result<()> {
        self.client
            .batch_execute(SCHEMA_DDL)
            .await
            .context("failed to create relational schema")?;
        Ok(())
    }
}

#[async_trait]
impl Store for PgStore {
    async fn create_document(
        &self,
        title: &str,
        file_path: &str,
    ) -> Result<Document, StorageError> {
        let row = self
            .client
            .query_one(
                "INSERT INTO documents (title, file_path) VALUES ($1, $2) \
                 RETURNING id, title, file_path, is_processed, created_at",
                &[&title, &file_path],
            )
            .await?;
        Ok(document_from_row(&row))
    }

    async fn create_page(
        &self,
        document_id: i64,
        page_number: u32,
        content: &str,
    ) -> Result<Page, StorageError> {
        let number = page_number_param(page_number)?;
        let row = self
            .client
            .query_one(
                "INSERT INTO document_pages (document_id, page_number, content) \
                 VALUES ($1, $2, $3) \
                 RETURNING id, document_id, page_number, content, is_processed",
                &[&document_id, &number, &content],
            )
            .await?;
        page_from_row(&row)
    }

    async fn mark_page_processed(&self, page_id: i64) -> Result<(), StorageError> {
        let updated = self
            .client
            .execute(
                "UPDATE document_pages SET is_processed = TRUE WHERE id = $1",
                &[&page_id],
            )
            .await?;
        if updated == 0 {
            return Err(StorageError(format!("page {} does not exist", page_id)));
        }
        Ok(())
    }

    async fn mark_document_processed(&self, document_id: i64) -> Result<(), StorageError> {
        let updated = self
            .client
            .execute(
                "UPDATE documents SET is_processed = TRUE WHERE id = $1",
                &[&document_id],
            )
            .await?;
        if updated == 0 {
            return Err(StorageError(format!("document {} does not exist", document_id)));
        }
        Ok(())
    }

    async fn get_document(&self, document_id: i64) -> Result<Option<Document>, StorageError> {
        let row = self
            .client
            .query_opt(
                "SELECT id, title, file_path, is_processed, created_at \
                 FROM documents WHERE id = $1",
                &[&document_id],
            )
            .await?;
        Ok(row.as_ref().map(document_from_row))
    }

    async fn list_pages(&self, document_id: i64) -> Result<Vec<Page>, StorageError> {
        let rows = self
            .client
            .query(
                "SELECT id, document_id, page_number, content, is_processed \
                 FROM document_pages WHERE document_id = $1 ORDER BY page_number",
                &[&document_id],
            )
            .await?;
        rows.iter().map(page_from_row).collect()
    }

    async fn create_exchange(
        &self,
        user_content: &str,
        answer: &str,
    ) -> Result<(Message, Message), StorageError> {
        // a single statement commits both rows or neither
        let rows = self
            .client
            .query(
                "INSERT INTO messages (content, is_ai) VALUES ($1, FALSE), ($2, TRUE) \
                 RETURNING id, is_ai, content, timestamp",
                &[&user_content, &answer],
            )
            .await?;
        let mut messages: Vec<Message> = rows.iter().map(message_from_row).collect();
        messages.sort_by_key(|message| message.id);
        let mut messages = messages.into_iter();
        match (messages.next(), messages.next()) {
            (Some(user), Some(reply)) if !user.is_ai && reply.is_ai => Ok((user, reply)),
            _ => Err(StorageError(
                "message insert did not return the user and answer rows".to_string(),
            )),
        }
    }

    async fn list_messages(&self) -> Result<Vec<Message>, StorageError> {
        let rows = self
            .client
            .query(
                "SELECT id, is_ai, content, timestamp FROM messages ORDER BY id",
                &[],
            )
            .await?;
        Ok(rows.iter().map(message_from_row).collect())
    }
}

fn page_number_param(page_number: u32) -> Result<i32, StorageError> {
    i32::try_from(page_number)
        .map_err(|_| StorageError(format!("page number {} exceeds i32 range", page_number)))
}

fn document_from_row(row: &Row) -> Document {
    let created_at: DateTime<Utc> = row.get("created_at");
    Document {
        id: row.get("id"),
        title: row.get("title"),
        file_path: row.get("file_path"),
        is_processed: row.get("is_processed"),
        created_at,
    }
}

fn page_from_row(row: &Row) -> Result<Page, StorageError> {
    let page_number: i32 = row.get("page_number");
    Ok(Page {
        id: row.get("id"),
        document_id: row.get("document_id"),
        page_number: u32::try_from(page_number)
            .map_err(|_| StorageError(format!("negative page number {}", page_number)))?,
        content: row.get("content"),
        is_processed: row.get("is_processed"),
    })
}

fn message_from_row(row: &Row) -> Message {
    Message {
        id: row.get("id"),
        is_ai: row.get("is_ai"),
        content: row.get("content"),
        timestamp: row.get("timestamp"),
    }
}
