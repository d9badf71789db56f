pub mod chat;
pub mod chunking;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod index;
pub mod llm;
pub mod metadata;
pub mod models;
pub mod processor;

#[cfg(test)]
pub(crate) mod test_util;

pub use chat::{ChatEngine, DEFAULT_TOP_K, MODEL_FAILURE_REPLY, NO_CONTEXT_REPLY};
pub use chunking::{split_text, ChunkingConfig};
pub use embedding::{Embedder, GeminiEmbedder, EMBEDDING_DIMENSIONS};
pub use error::{IngestError, LlmError};
pub use extractor::{LopdfExtractor, PdfExtractor};
pub use index::VectorIndex;
pub use llm::{GeminiGenerator, LlmClient};
pub use metadata::MetadataStore;
pub use models::{
    ChatReply, ChatTurn, DocumentRecord, IndexEntry, Role, SearchHit, SourceRef,
    PLACEHOLDER_DOC_ID,
};
pub use processor::DocumentProcessor;
