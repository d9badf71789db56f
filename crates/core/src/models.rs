use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Reserved document id for the entry that keeps the vector index non-empty.
/// Entries carrying it never leave the index through a search.
pub const PLACEHOLDER_DOC_ID: &str = "placeholder";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub chunk_count: usize,
    pub file_path: String,
}

/// One populated row of the vector index: the embedded chunk plus the
/// metadata needed to cite it back to its source document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub chunk_id: String,
    pub doc_id: String,
    pub source: String,
    pub text: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub text: String,
    pub source: String,
    pub doc_id: String,
    pub score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub source: String,
    pub score: f32,
    pub doc_id: String,
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub answer: String,
    pub sources: Vec<SourceRef>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}
