//! Persisted records shared by the store, the pipelines and the HTTP layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Uploaded source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned identifier.
    pub id: i64,
    /// Display title (the uploaded file name).
    pub title: String,
    /// Location of the saved upload.
    pub file_path: String,
    /// True once every page is embedded and indexed.
    pub is_processed: bool,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// One physical page of a [`Document`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// Store-assigned identifier.
    pub id: i64,
    /// Owning document.
    pub document_id: i64,
    /// 1-based page number, unique per document.
    pub page_number: u32,
    /// Extracted text; may be empty.
    pub content: String,
    /// True once the page embedding is durably indexed.
    pub is_processed: bool,
}

/// Entry in the append-only conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identifier.
    pub id: i64,
    /// False for user messages, true for generated answers.
    pub is_ai: bool,
    /// Message text.
    pub content: String,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
}
