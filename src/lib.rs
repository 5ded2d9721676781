#![warn(missing_docs)]
//! Core library entry points for pagewise: PDF ingestion, page-level retrieval and
//! intent-routed answers.

pub mod api;
pub mod chunker;
pub mod classifier;
pub mod config;
pub mod embedder;
pub mod error;
mod external;
pub mod ingest;
pub mod models;
pub mod providers;
pub mod router;
pub mod storage;
pub mod vector_store;
pub mod weather;

pub use chunker::{Chunker, PageText, PdfChunker};
pub use classifier::{Classifier, Intent};
pub use embedder::Embedder;
pub use error::{
    EmbeddingError, ExtractionError, GenerationError, IndexError, IngestError, QueryError,
    StorageError,
};
pub use ingest::{IngestionPipeline, IngestionReport, IngestionState, PageFailure, PageOutcome};
pub use models::{Document, Message, Page};
pub use providers::{LlmProvider, ProviderRequest};
pub use router::{Exchange, ResponseRouter};
pub use storage::{MemoryStore, PgStore, Store};
pub use vector_store::{
    CollectionName, IndexRecord, MemoryVectorIndex, PgVectorIndex, RecordMetadata, ScoredText,
    VectorIndex,
};
pub use weather::{CurrentConditions, WeatherError, WeatherProvider};
