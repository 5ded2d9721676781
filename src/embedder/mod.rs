//! Embedding clients that turn page and query text into vectors.

use async_trait::async_trait;

use crate::error::EmbeddingError;

pub mod openai;

/// Converts text into a fixed-length vector via an external model.
///
/// Implementations make one live request per call; nothing is cached.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Returns the embedding for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}
