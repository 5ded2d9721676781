//! Error taxonomy for the ingestion and query pipelines.
//!
//! Unit-of-work errors (one page's embedding, one generation call) are absorbed by the
//! pipelines. Request-level errors ([`IngestError`], [`QueryError`]) abort the request.

use thiserror::Error;

/// The source document could not be split into pages.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// The bytes are not a readable PDF.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// The document parsed but contains no pages.
    #[error("document contains no pages")]
    NoPages,
}

/// Failure to turn one text into a vector.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// Empty or whitespace-only text was submitted.
    #[error("embedding input is empty")]
    EmptyInput,

    /// The provider answered with an error or could not be reached.
    #[error("embedding provider error: {0}")]
    Provider(String),

    /// The provider answered but the payload was unusable.
    #[error("invalid embedding response: {0}")]
    InvalidResponse(String),

    /// The call exceeded the call-site timeout.
    #[error("embedding request timed out after {0}s")]
    Timeout(u64),
}

/// Vector index failures. Always fatal to the calling request.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The backing store cannot be opened, read or written.
    #[error("vector index unavailable: {0}")]
    Unavailable(String),

    /// A vector does not match the dimension the collection was created with.
    #[error("collection {collection} expects {expected}D vectors, got {actual}D")]
    DimensionMismatch {
        /// Collection written to.
        collection: String,
        /// Dimension fixed at creation.
        expected: usize,
        /// Dimension of the rejected vector.
        actual: usize,
    },
}

impl From<tokio_postgres::Error> for IndexError {
    fn from(err: tokio_postgres::Error) -> Self {
        IndexError::Unavailable(err.to_string())
    }
}

/// A generation call failed; callers replace the answer with a fixed fallback.
#[derive(Error, Debug)]
pub enum GenerationError {
    /// The provider answered with an error or could not be reached.
    #[error("generation provider error: {0}")]
    Provider(String),

    /// The provider returned no usable text.
    #[error("generation returned empty text")]
    Empty,

    /// The call exceeded the call-site timeout.
    #[error("generation request timed out after {0}s")]
    Timeout(u64),
}

/// Relational store failure.
#[derive(Error, Debug)]
#[error("storage error: {0}")]
pub struct StorageError(pub String);

impl From<tokio_postgres::Error> for StorageError {
    fn from(err: tokio_postgres::Error) -> Self {
        StorageError(err.to_string())
    }
}

/// Request-level ingestion failure.
#[derive(Error, Debug)]
pub enum IngestError {
    /// Nothing was persisted.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// The index failed mid-run; the document row exists but stays unprocessed.
    #[error("indexing aborted for document {document_id}: {source}")]
    Index {
        /// Document whose page failed to index.
        document_id: i64,
        /// Underlying index failure.
        #[source]
        source: IndexError,
    },

    /// The relational store failed. `document_id` is set once the row exists.
    #[error("storage failure during ingestion: {source}")]
    Storage {
        /// Document row, when it was created before the failure.
        document_id: Option<i64>,
        /// Underlying store failure.
        #[source]
        source: StorageError,
    },
}

impl IngestError {
    /// Document row created before the failure, if any.
    pub fn document_id(&self) -> Option<i64> {
        match self {
            IngestError::Extraction(_) => None,
            IngestError::Index { document_id, .. } => Some(*document_id),
            IngestError::Storage { document_id, .. } => *document_id,
        }
    }

    /// Stable code for logs and API bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            IngestError::Extraction(ExtractionError::Parse(_)) => "EXTRACTION_FAILED",
            IngestError::Extraction(ExtractionError::NoPages) => "NO_PAGES",
            IngestError::Index { .. } => "INDEX_UNAVAILABLE",
            IngestError::Storage { .. } => "STORAGE_ERROR",
        }
    }

    /// Message safe to show an end user.
    pub fn user_message(&self) -> String {
        match self {
            IngestError::Extraction(ExtractionError::NoPages) => {
                "Failed to extract pages from the PDF.".to_string()
            }
            IngestError::Extraction(ExtractionError::Parse(_)) => {
                "The uploaded file could not be read as a PDF.".to_string()
            }
            IngestError::Index { .. } => {
                "The document index is unavailable; the upload was not fully processed."
                    .to_string()
            }
            IngestError::Storage { .. } => {
                "An unexpected error occurred while processing the document.".to_string()
            }
        }
    }
}

/// Request-level query failure. Everything else degrades to a fallback answer.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The vector index could not be searched.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// Messages could not be persisted or listed.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl QueryError {
    /// Stable code for logs and API bodies.
    pub fn error_code(&self) -> &'static str {
        match self {
            QueryError::Index(_) => "INDEX_UNAVAILABLE",
            QueryError::Storage(_) => "STORAGE_ERROR",
        }
    }
}
