use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::embedding::Embedder;
use crate::error::{IngestError, LlmError};
use crate::extractor::PdfExtractor;
use crate::llm::LlmClient;

/// Deterministic local embedder standing in for the remote gateway:
/// character trigrams hashed into a fixed number of buckets, normalized.
/// Texts sharing wording land close together, which is all retrieval tests
/// need. Counts calls so tests can assert the gateway was skipped.
pub(crate) struct CountingEmbedder {
    dimensions: usize,
    query_count: AtomicUsize,
    batch_count: AtomicUsize,
}

impl CountingEmbedder {
    pub(crate) fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            query_count: AtomicUsize::new(0),
            batch_count: AtomicUsize::new(0),
        }
    }

    pub(crate) fn query_calls(&self) -> usize {
        self.query_count.load(Ordering::SeqCst)
    }

    pub(crate) fn batch_calls(&self) -> usize {
        self.batch_count.load(Ordering::SeqCst)
    }

    fn hash_embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CountingEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed_query(&self, text: &str) -> Vec<f32> {
        self.query_count.fetch_add(1, Ordering::SeqCst);
        self.hash_embed(text)
    }

    async fn embed_documents(&self, texts: &[String]) -> Vec<Vec<f32>> {
        self.batch_count.fetch_add(1, Ordering::SeqCst);
        texts.iter().map(|text| self.hash_embed(text)).collect()
    }
}

/// Reads the "PDF" as plain UTF-8, so tests control extracted text by
/// writing it as the file body.
pub(crate) struct PlainTextExtractor;

impl PdfExtractor for PlainTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, IngestError> {
        fs::read_to_string(path)
            .map_err(|error| IngestError::PdfParse(format!("{}: {error}", path.display())))
    }
}

/// LLM fake with a canned reply or a scripted failure; records the prompts
/// it receives.
pub(crate) struct ScriptedLlm {
    reply: Option<String>,
    call_count: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedLlm {
    pub(crate) fn replying(reply: &str) -> Self {
        Self {
            reply: Some(reply.to_string()),
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            reply: None,
            call_count: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    pub(crate) fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.to_string());

        match &self.reply {
            Some(reply) => Ok(reply.clone()),
            None => Err(LlmError::Backend {
                details: "scripted failure".to_string(),
            }),
        }
    }
}
