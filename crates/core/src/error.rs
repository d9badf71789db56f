use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("no extractable text in {0}")]
    EmptyText(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("unknown document id: {0}")]
    UnknownDocument(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gemini api error: {details}")]
    Backend { details: String },

    #[error("model response had no candidates")]
    EmptyResponse,
}

pub type Result<T, E = IngestError> = std::result::Result<T, E>;
