//! pgvector-backed collections: one table per collection, cosine distance.

use std::collections::HashMap;
use std::sync::Arc;

use ::pgvector::Vector;
use anyhow::Context;
use async_trait::async_trait;
use crc32fast::Hasher as Crc32;
use tokio::sync::Mutex;
use tokio_postgres::Client;
use tracing::{debug, info};

use super::{quote_ident, CollectionName, IndexRecord, RecordMetadata, ScoredText, VectorIndex};
use crate::error::IndexError;

/// [`VectorIndex`] stored in Postgres through the pgvector extension.
pub struct PgVectorIndex {
    client: Arc<Client>,
    schema: String,
    table_prefix: String,
    // collection -> vector dimension, for collections known to exist
    known: Mutex<HashMap<String, usize>>,
}

impl PgVectorIndex {
    /// Wraps an open connection. Call [`PgVectorIndex::prepare`] before first use.
    pub fn new<S, P>(client: Arc<Client>, schema: S, table_prefix: P) -> anyhow::Result<Self>
    where
        S: Into<String>,
        P: Into<String>,
    {
        let schema = schema.into();
        anyhow::ensure!(!schema.trim().is_empty(), "schema name is required");
        Ok(Self {
            client,
            schema,
            table_prefix: table_prefix.into(),
            known: Mutex::new(HashMap::new()),
        })
    }

    /// Ensures the pgvector extension is installed.
    pub async fn prepare(&self) -> anyhow::Result<()> {
        self.client
            .execute("CREATE EXTENSION IF NOT EXISTS vector", &[])
            .await
            .context("failed to ensure pgvector extension")?;
        Ok(())
    }

    fn table_name(&self, collection: &CollectionName) -> String {
        format!("{}{}", self.table_prefix, collection.sanitized())
    }

    fn qualified(&self, collection: &CollectionName) -> String {
        format!(
            "{}.{}",
            quote_ident(&self.schema),
            quote_ident(&self.table_name(collection))
        )
    }

    /// Dimension of an existing collection, or `None` when the table is absent.
    async fn collection_dims(
        &self,
        collection: &CollectionName,
    ) -> Result<Option<usize>, IndexError> {
        if let Some(dims) = self.known.lock().await.get(collection.as_str()) {
            return Ok(Some(*dims));
        }
        let qualified = self.qualified(collection);
        let row = self
            .client
            .query_opt(
                "SELECT atttypmod FROM pg_attribute \
                 WHERE attrelid = to_regclass($1::text) AND attname = 'embedding'",
                &[&qualified],
            )
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let typmod: i32 = row.get("atttypmod");
        let dims = usize::try_from(typmod).map_err(|_| {
            IndexError::Unavailable(format!("{} has no fixed vector dimension", qualified))
        })?;
        self.known
            .lock()
            .await
            .insert(collection.as_str().to_string(), dims);
        Ok(Some(dims))
    }

    /// Compare-and-create: the registry mutex serializes creators in this process and
    /// the advisory lock serializes them across processes.
    async fn ensure_collection(
        &self,
        collection: &CollectionName,
        dims: usize,
    ) -> Result<usize, IndexError> {
        let mut known = self.known.lock().await;
        if let Some(existing) = known.get(collection.as_str()) {
            return Ok(*existing);
        }
        if dims == 0 {
            return Err(IndexError::DimensionMismatch {
                collection: collection.to_string(),
                expected: 1,
                actual: 0,
            });
        }
        let qualified = self.qualified(collection);
        let lock_key = advisory_key(&qualified);
        self.client
            .execute("SELECT pg_advisory_lock($1)", &[&lock_key])
            .await?;
        let created = self.create_table(collection, &qualified, dims).await;
        let unlocked = self
            .client
            .execute("SELECT pg_advisory_unlock($1)", &[&lock_key])
            .await;
        created?;
        unlocked?;

        let row = self
            .client
            .query_one(
                "SELECT atttypmod FROM pg_attribute \
                 WHERE attrelid = to_regclass($1::text) AND attname = 'embedding'",
                &[&qualified],
            )
            .await?;
        let typmod: i32 = row.get("atttypmod");
        let actual = usize::try_from(typmod).unwrap_or(dims);
        known.insert(collection.as_str().to_string(), actual);
        info!(collection = %collection, dims = actual, "vector collection ready");
        Ok(actual)
    }

    async fn create_table(
        &self,
        collection: &CollectionName,
        qualified: &str,
        dims: usize,
    ) -> Result<(), IndexError> {
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {qualified} (
                seq BIGSERIAL PRIMARY KEY,
                id TEXT NOT NULL UNIQUE,
                document_id BIGINT NOT NULL,
                page_number INTEGER NOT NULL,
                text TEXT NOT NULL,
                embedding VECTOR({dims}) NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"
        );
        self.client.execute(&ddl, &[]).await?;
        let index_sql = format!(
            "CREATE INDEX IF NOT EXISTS {} ON {} (document_id)",
            quote_ident(&format!("{}_document_idx", self.table_name(collection))),
            qualified
        );
        self.client.execute(&index_sql, &[]).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for PgVectorIndex {
    async fn upsert(
        &self,
        collection: &CollectionName,
        record: IndexRecord,
    ) -> Result<(), IndexError> {
        let dims = self
            .ensure_collection(collection, record.embedding.len())
            .await?;
        if dims != record.embedding.len() {
            return Err(IndexError::DimensionMismatch {
                collection: collection.to_string(),
                expected: dims,
                actual: record.embedding.len(),
            });
        }
        let page_number = i32::try_from(record.metadata.page_number).map_err(|_| {
            IndexError::Unavailable(format!(
                "page number {} exceeds i32 range",
                record.metadata.page_number
            ))
        })?;
        let sql = format!(
            "INSERT INTO {} (id, document_id, page_number, text, embedding) \
             VALUES ($1, $2, $3, $4, $5)",
            self.qualified(collection)
        );
        let vector = Vector::from(record.embedding);
        self.client
            .execute(
                &sql,
                &[
                    &record.id,
                    &record.metadata.document_id,
                    &page_number,
                    &record.text,
                    &vector,
                ],
            )
            .await?;
        debug!(
            collection = %collection,
            document_id = record.metadata.document_id,
            page_number = record.metadata.page_number,
            "embedding stored"
        );
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionName,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredText>, IndexError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let Some(dims) = self.collection_dims(collection).await? else {
            return Ok(Vec::new());
        };
        if dims != vector.len() {
            return Err(IndexError::DimensionMismatch {
                collection: collection.to_string(),
                expected: dims,
                actual: vector.len(),
            });
        }
        let sql = select_sql(&self.qualified(collection));
        let query_vector = Vector::from(vector.to_vec());
        let limit = i64::try_from(k).unwrap_or(i64::MAX);
        let rows = self.client.query(&sql, &[&query_vector, &limit]).await?;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let page_number: i32 = row.get("page_number");
            out.push(ScoredText {
                text: row.get("text"),
                distance: row.get("distance"),
                metadata: RecordMetadata {
                    document_id: row.get("document_id"),
                    page_number: u32::try_from(page_number).unwrap_or(0),
                },
            });
        }
        Ok(out)
    }

    async fn count(
        &self,
        collection: &CollectionName,
        document_id: i64,
    ) -> Result<usize, IndexError> {
        if self.collection_dims(collection).await?.is_none() {
            return Ok(0);
        }
        let sql = format!(
            "SELECT COUNT(*) AS total FROM {} WHERE document_id = $1",
            self.qualified(collection)
        );
        let row = self.client.query_one(&sql, &[&document_id]).await?;
        let total: i64 = row.get("total");
        Ok(total.max(0) as usize)
    }
}

fn select_sql(qualified: &str) -> String {
    format!(
        "SELECT \
            text, \
            document_id, \
            page_number, \
            embedding <=> $1 AS distance \
        FROM {} \
        ORDER BY embedding <=> $1 ASC, seq ASC \
        LIMIT $2",
        qualified
    )
}

fn advisory_key(qualified: &str) -> i64 {
    let mut hasher = Crc32::new();
    hasher.update(b"pagewise:collection:");
    hasher.update(qualified.as_bytes());
    hasher.finalize() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn select_orders_by_distance_then_insertion() {
        let sql = select_sql("\"public\".\"collection_documents\"");
        assert!(sql.contains("ORDER BY embedding <=> $1 ASC, seq ASC"));
        assert!(sql.contains("LIMIT $2"));
    }

    #[test]
    fn advisory_keys_are_stable_per_table() {
        let a = advisory_key("\"public\".\"collection_documents\"");
        let b = advisory_key("\"public\".\"collection_documents\"");
        let c = advisory_key("\"public\".\"collection_other\"");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
