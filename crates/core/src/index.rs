use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::error::IngestError;
use crate::models::{IndexEntry, SearchHit, PLACEHOLDER_DOC_ID};

const INDEX_SCHEMA_VERSION: u32 = 1;

/// Flat nearest-neighbor index over chunk embeddings. Search is brute-force
/// cosine similarity; higher scores are more relevant. The index always
/// holds one reserved placeholder entry so it is never empty, and the
/// placeholder is filtered from every search result.
///
/// Persistence rewrites the whole file on every save.
pub struct VectorIndex {
    dimensions: usize,
    entries: Vec<IndexEntry>,
}

impl VectorIndex {
    pub fn with_placeholder(dimensions: usize) -> Self {
        Self {
            dimensions,
            entries: vec![placeholder_entry(dimensions)],
        }
    }

    /// Load the persisted index, falling back to a fresh placeholder-only
    /// index when the file is absent, unreadable, or from another schema
    /// version. The caller reconciles against metadata afterwards.
    pub fn load_or_placeholder(path: &Path, dimensions: usize) -> Self {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => return Self::with_placeholder(dimensions),
        };

        match serde_json::from_slice::<PersistedIndex>(&bytes) {
            Ok(persisted) if persisted.version == INDEX_SCHEMA_VERSION => Self {
                dimensions: persisted.dimensions,
                entries: persisted.entries,
            },
            Ok(persisted) => {
                warn!(
                    found = persisted.version,
                    expected = INDEX_SCHEMA_VERSION,
                    "index schema version mismatch, starting fresh"
                );
                Self::with_placeholder(dimensions)
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "corrupt index file, starting fresh");
                Self::with_placeholder(dimensions)
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), IngestError> {
        let persisted = PersistedIndex {
            version: INDEX_SCHEMA_VERSION,
            dimensions: self.dimensions,
            entries: self.entries.clone(),
        };
        fs::write(path, serde_json::to_vec(&persisted)?)?;
        Ok(())
    }

    pub fn insert(&mut self, entries: Vec<IndexEntry>) {
        self.entries.extend(entries);
    }

    /// Drop every entry and restore the placeholder.
    pub fn reset(&mut self) {
        self.entries = vec![placeholder_entry(self.dimensions)];
    }

    /// Number of entries excluding the placeholder.
    pub fn populated_len(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.doc_id != PLACEHOLDER_DOC_ID)
            .count()
    }

    /// Top-k nearest entries to `query` by cosine similarity, most relevant
    /// first. Placeholder hits are removed after the top-k cut, mirroring
    /// the search-then-filter order of the persisted store this replaces.
    pub fn search(&self, query: &[f32], k: usize) -> Vec<SearchHit> {
        let mut scored: Vec<(&IndexEntry, f32)> = self
            .entries
            .iter()
            .map(|entry| (entry, cosine_similarity(query, &entry.vector)))
            .collect();

        scored.sort_by(|left, right| right.1.total_cmp(&left.1));

        scored
            .into_iter()
            .take(k)
            .filter(|(entry, _)| entry.doc_id != PLACEHOLDER_DOC_ID)
            .map(|(entry, score)| SearchHit {
                text: entry.text.clone(),
                source: entry.source.clone(),
                doc_id: entry.doc_id.clone(),
                score,
            })
            .collect()
    }
}

fn placeholder_entry(dimensions: usize) -> IndexEntry {
    IndexEntry {
        chunk_id: PLACEHOLDER_DOC_ID.to_string(),
        doc_id: PLACEHOLDER_DOC_ID.to_string(),
        source: PLACEHOLDER_DOC_ID.to_string(),
        text: "placeholder content".to_string(),
        vector: vec![0.0; dimensions],
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedIndex {
    version: u32,
    dimensions: usize,
    entries: Vec<IndexEntry>,
}
