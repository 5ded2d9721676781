//! In-process vector index using brute-force cosine distance.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{CollectionName, IndexRecord, ScoredText, VectorIndex};
use crate::error::IndexError;

#[derive(Debug)]
struct Collection {
    dims: usize,
    records: Vec<IndexRecord>,
}

/// Volatile [`VectorIndex`] for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryVectorIndex {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryVectorIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(
        &self,
        collection: &CollectionName,
        record: IndexRecord,
    ) -> Result<(), IndexError> {
        let mut guard = self.collections.write().await;
        let entry = guard
            .entry(collection.as_str().to_string())
            .or_insert_with(|| Collection {
                dims: record.embedding.len(),
                records: Vec::new(),
            });
        if record.embedding.len() != entry.dims {
            return Err(IndexError::DimensionMismatch {
                collection: collection.to_string(),
                expected: entry.dims,
                actual: record.embedding.len(),
            });
        }
        entry.records.push(record);
        Ok(())
    }

    async fn query(
        &self,
        collection: &CollectionName,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<ScoredText>, IndexError> {
        let guard = self.collections.read().await;
        let Some(entry) = guard.get(collection.as_str()) else {
            return Ok(Vec::new());
        };
        if k == 0 || entry.records.is_empty() {
            return Ok(Vec::new());
        }
        if vector.len() != entry.dims {
            return Err(IndexError::DimensionMismatch {
                collection: collection.to_string(),
                expected: entry.dims,
                actual: vector.len(),
            });
        }
        let mut hits: Vec<ScoredText> = entry
            .records
            .iter()
            .map(|record| ScoredText {
                text: record.text.clone(),
                distance: cosine_distance(vector, &record.embedding),
                metadata: record.metadata,
            })
            .collect();
        // stable sort keeps insertion order among equal distances
        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(
        &self,
        collection: &CollectionName,
        document_id: i64,
    ) -> Result<usize, IndexError> {
        let guard = self.collections.read().await;
        Ok(guard
            .get(collection.as_str())
            .map(|entry| {
                entry
                    .records
                    .iter()
                    .filter(|record| record.metadata.document_id == document_id)
                    .count()
            })
            .unwrap_or(0))
    }
}

/// `1 - cos(a, b)`; zero-length vectors are treated as orthogonal and
/// non-finite components rank as infinitely far.
pub(crate) fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    let distance = 1.0 - dot / (norm_a.sqrt() * norm_b.sqrt());
    if distance.is_nan() {
        f64::INFINITY
    } else {
        distance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector_store::RecordMetadata;

    fn record(doc: i64, page: u32, text: &str, embedding: Vec<f32>) -> IndexRecord {
        IndexRecord::new(
            embedding,
            text.to_string(),
            RecordMetadata {
                document_id: doc,
                page_number: page,
            },
        )
    }

    fn docs() -> CollectionName {
        CollectionName::new("documents").unwrap()
    }

    #[tokio::test]
    async fn absent_collection_returns_nothing() {
        let index = MemoryVectorIndex::new();
        let hits = index.query(&docs(), &[1.0, 0.0], 3).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn nearest_first_with_insertion_order_ties() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(&docs(), record(1, 1, "far", vec![0.0, 1.0]))
            .await
            .unwrap();
        index
            .upsert(&docs(), record(1, 2, "tie-a", vec![1.0, 0.0]))
            .await
            .unwrap();
        index
            .upsert(&docs(), record(1, 3, "tie-b", vec![2.0, 0.0]))
            .await
            .unwrap();

        let hits = index.query(&docs(), &[1.0, 0.0], 3).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["tie-a", "tie-b", "far"]);

        let again = index.query(&docs(), &[1.0, 0.0], 3).await.unwrap();
        assert_eq!(hits, again);
    }

    #[tokio::test]
    async fn identical_vector_round_trips_top_one() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(&docs(), record(1, 1, "soup", vec![0.2, 0.7, 0.1]))
            .await
            .unwrap();
        index
            .upsert(&docs(), record(1, 2, "bread", vec![0.9, 0.1, 0.4]))
            .await
            .unwrap();
        let hits = index.query(&docs(), &[0.2, 0.7, 0.1], 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "soup");
        assert!(hits[0].distance.abs() < 1e-6);
    }

    #[tokio::test]
    async fn dimension_is_fixed_by_first_record() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(&docs(), record(1, 1, "a", vec![1.0, 0.0]))
            .await
            .unwrap();
        let err = index
            .upsert(&docs(), record(1, 2, "b", vec![1.0, 0.0, 0.0]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn counts_records_per_document() {
        let index = MemoryVectorIndex::new();
        for page in 1..=3 {
            index
                .upsert(&docs(), record(4, page, "p", vec![1.0]))
                .await
                .unwrap();
        }
        index
            .upsert(&docs(), record(5, 1, "other", vec![1.0]))
            .await
            .unwrap();
        assert_eq!(index.count(&docs(), 4).await.unwrap(), 3);
        assert_eq!(index.count(&docs(), 5).await.unwrap(), 1);
        assert_eq!(index.count(&docs(), 6).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn nan_distances_sort_last_and_stay_stable() {
        let index = MemoryVectorIndex::new();
        index
            .upsert(&docs(), record(1, 1, "nan", vec![f32::NAN, 1.0]))
            .await
            .unwrap();
        index
            .upsert(&docs(), record(1, 2, "far", vec![0.0, 1.0]))
            .await
            .unwrap();
        index
            .upsert(&docs(), record(1, 3, "near", vec![1.0, 0.1]))
            .await
            .unwrap();

        let first = index.query(&docs(), &[1.0, 0.0], 3).await.unwrap();
        let texts: Vec<&str> = first.iter().map(|h| h.text.as_str()).collect();
        assert_eq!(texts, vec!["near", "far", "nan"]);
        for _ in 0..5 {
            let again = index.query(&docs(), &[1.0, 0.0], 3).await.unwrap();
            let again: Vec<&str> = again.iter().map(|h| h.text.as_str()).collect();
            assert_eq!(again, texts);
        }
    }

    #[test]
    fn zero_vectors_are_orthogonal() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }
}
