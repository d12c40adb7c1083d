use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata carried by one retrieved chunk. Keys mirror what the ingestion
/// side stamps onto documents; anything the store returns beyond these is
/// ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_bucket: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
    /// 0-indexed page within the source document.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    /// First line of the chunk within its page. Only meaningful for
    /// citation-grade collections.
    #[serde(alias = "line_number", skip_serializing_if = "Option::is_none")]
    pub start_line: Option<i64>,
}

/// One unit returned by the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievedChunk {
    pub text: String,
    #[serde(default)]
    pub metadata: ChunkMetadata,
}

/// Display-only reference for one retrieved chunk. `page` is already
/// 1-indexed here; the conversion from the store's 0-indexed metadata
/// happens when the citation is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Citation {
    pub ref_index: usize,
    pub collection_label: String,
    pub document_name: Option<String>,
    pub date: Option<String>,
    pub page: Option<i64>,
    pub line: Option<i64>,
}

/// Per-collection tally of chunks retrieved in one invocation.
pub type SourceCounts = HashMap<String, usize>;

/// Output of one orchestrated retrieval pass, ready for prompt assembly.
#[derive(Debug, Clone)]
pub struct RetrievalContext {
    pub context: String,
    pub question: String,
    pub source_counts: SourceCounts,
}

#[derive(Debug, Clone)]
pub struct ConversationTurn {
    pub question: String,
    pub answer: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PendingClarification {
    pub session_id: String,
    pub original_question: String,
    pub clarification_question: String,
    pub context: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    pub session_id: Option<String>,
    pub collection_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub answer: String,
    pub question: String,
    pub session_id: String,
    pub status: String,
    pub sources: SourceCounts,
    pub requires_clarification: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending_question: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClearSessionResponse {
    pub session_id: String,
    pub status: String,
}
