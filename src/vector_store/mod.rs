//! Vector index abstraction plus the pgvector and in-memory backends.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::IndexError;

pub mod memory;
pub mod postgres;

pub use self::memory::MemoryVectorIndex;
pub use self::postgres::PgVectorIndex;

const MAX_COLLECTION_LEN: usize = 48;

/// Validated collection identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionName(String);

impl CollectionName {
    /// Builds a new collection identifier.
    pub fn new<S: Into<String>>(name: S) -> Result<Self> {
        let name = name.into();
        anyhow::ensure!(!name.trim().is_empty(), "collection name is required");
        anyhow::ensure!(
            name.len() <= MAX_COLLECTION_LEN,
            "collection name exceeds {} characters",
            MAX_COLLECTION_LEN
        );
        anyhow::ensure!(
            name.chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_' || ch == '-'),
            "collection name may only contain ASCII letters, digits, '_' or '-'"
        );
        Ok(Self(name))
    }

    /// Returns the raw collection string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Table-safe form of the name.
    pub fn sanitized(&self) -> String {
        sanitize_ident(&self.0)
    }
}

impl std::fmt::Display for CollectionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Metadata stored beside every vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Owning document.
    pub document_id: i64,
    /// 1-based page the text came from.
    pub page_number: u32,
}

/// One embedding record written to a collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Generated unique identifier.
    pub id: String,
    /// Model embedding vector.
    pub embedding: Vec<f32>,
    /// Text the vector was computed from.
    pub text: String,
    /// Back-reference to the owning page.
    pub metadata: RecordMetadata,
}

impl IndexRecord {
    /// Builds a record with a fresh UUID v4 identifier.
    pub fn new(embedding: Vec<f32>, text: String, metadata: RecordMetadata) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            embedding,
            text,
            metadata,
        }
    }
}

/// Query hit, best-first.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredText {
    /// Stored text.
    pub text: String,
    /// Cosine distance to the query (0 = identical direction).
    pub distance: f64,
    /// Metadata of the stored record.
    pub metadata: RecordMetadata,
}

/// Persists (vector, text, metadata) tuples per collection and answers k-NN queries.
///
/// Collections are created lazily on first upsert using cosine distance. Metadata is not
/// unique; callers prevent duplicate writes for the same page.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Adds one record to `collection`, creating the collection if needed.
    async fn upsert(&self, collection: &CollectionName, record: IndexRecord)
        -> Result<(), IndexError>;

    /// Returns the `k` nearest stored texts, best first, ties in insertion order.
    /// An empty or absent collection yields an empty vec.
    async fn query(
        &self,
        collection: &CollectionName,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredText>, IndexError>;

    /// Number of records in `collection` tagged with `document_id`.
    async fn count(&self, collection: &CollectionName, document_id: i64)
        -> Result<usize, IndexError>;
}

/// Quotes Postgres identifiers, escaping embedded quotes.
pub fn quote_ident(input: &str) -> String {
    let escaped = input.replace('"', "\"\"");
    format!("\"{}\"", escaped)
}

fn sanitize_ident(input: &str) -> String {
    input
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() {
                ch.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect()
}
