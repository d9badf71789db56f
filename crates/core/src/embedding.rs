use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::LlmError;

/// Vector length produced by the Gemini `embedding-001` model. Zero vectors
/// of this length stand in for failed remote calls.
pub const EMBEDDING_DIMENSIONS: usize = 768;

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const TASK_RETRIEVAL_QUERY: &str = "RETRIEVAL_QUERY";
const TASK_RETRIEVAL_DOCUMENT: &str = "RETRIEVAL_DOCUMENT";

/// Seam over the remote embedding service.
///
/// Remote failures never propagate: implementations degrade to all-zero
/// vectors so that ingestion and search keep working with neutral entries.
/// Callers must tolerate zero vectors appearing in the index.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dimensions(&self) -> usize;

    async fn embed_query(&self, text: &str) -> Vec<f32>;

    async fn embed_documents(&self, texts: &[String]) -> Vec<Vec<f32>>;
}

pub struct GeminiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn zero_vector(&self) -> Vec<f32> {
        vec![0.0; EMBEDDING_DIMENSIONS]
    }

    fn embed_request(&self, text: &str, task_type: &str) -> EmbedRequest {
        EmbedRequest {
            model: format!("models/{}", self.model),
            content: Content {
                parts: vec![Part {
                    text: text.to_string(),
                }],
            },
            task_type: task_type.to_string(),
        }
    }

    async fn request_single(&self, text: &str, task_type: &str) -> Result<Vec<f32>, LlmError> {
        let url = format!(
            "{}/{}:embedContent?key={}",
            GEMINI_API_BASE, self.model, self.api_key
        );

        let response = self
            .client
            .post(&url)
            .json(&self.embed_request(text, task_type))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(LlmError::Backend {
                details: format!("embedContent returned {}", response.status()),
            });
        }

        let parsed: EmbedResponse = response.json().await?;
        Ok(parsed.embedding.values)
    }

    async fn request_batch(
        &self,
        texts: &[String],
        task_type: &str,
    ) -> Result<Vec<Vec<f32>>, LlmError> {
        let url = format!(
            "{}/{}:batchEmbedContents?key={}",
            GEMINI_API_BASE, self.model, self.api_key
        );

        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| self.embed_request(text, task_type))
                .collect(),
        };

        let response = self.client.post(&url).json(&request).send().await?;

        if !response.status().is_success() {
            return Err(LlmError::Backend {
                details: format!("batchEmbedContents returned {}", response.status()),
            });
        }

        let parsed: BatchEmbedResponse = response.json().await?;
        Ok(parsed
            .embeddings
            .into_iter()
            .map(|embedding| embedding.values)
            .collect())
    }
}

#[async_trait]
impl Embedder for GeminiEmbedder {
    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    async fn embed_query(&self, text: &str) -> Vec<f32> {
        match self.request_single(text, TASK_RETRIEVAL_QUERY).await {
            Ok(vector) => vector,
            Err(error) => {
                warn!(%error, "query embedding failed, degrading to zero vector");
                self.zero_vector()
            }
        }
    }

    async fn embed_documents(&self, texts: &[String]) -> Vec<Vec<f32>> {
        if texts.is_empty() {
            return Vec::new();
        }

        match self.request_batch(texts, TASK_RETRIEVAL_DOCUMENT).await {
            Ok(vectors) => vectors,
            Err(error) => {
                warn!(%error, count = texts.len(), "batch embedding failed, degrading to zero vectors");
                vec![self.zero_vector(); texts.len()]
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest {
    model: String,
    content: Content,
    task_type: String,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}
