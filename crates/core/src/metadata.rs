use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

use crate::error::IngestError;
use crate::models::DocumentRecord;

const METADATA_SCHEMA_VERSION: u32 = 1;

/// Durable mapping from document id to its descriptive record, kept ordered
/// so listings are stable. Rewritten wholesale on every save.
#[derive(Debug, Default)]
pub struct MetadataStore {
    documents: BTreeMap<String, DocumentRecord>,
}

impl MetadataStore {
    /// Load the persisted store, falling back to an empty one when the file
    /// is absent, unreadable, or from another schema version.
    pub fn load_or_default(path: &Path) -> Self {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => return Self::default(),
        };

        match serde_json::from_slice::<PersistedMetadata>(&bytes) {
            Ok(persisted) if persisted.version == METADATA_SCHEMA_VERSION => Self {
                documents: persisted.documents,
            },
            Ok(persisted) => {
                warn!(
                    found = persisted.version,
                    expected = METADATA_SCHEMA_VERSION,
                    "metadata schema version mismatch, starting empty"
                );
                Self::default()
            }
            Err(error) => {
                warn!(path = %path.display(), %error, "corrupt metadata file, starting empty");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), IngestError> {
        let persisted = PersistedMetadata {
            version: METADATA_SCHEMA_VERSION,
            documents: self.documents.clone(),
        };
        fs::write(path, serde_json::to_vec(&persisted)?)?;
        Ok(())
    }

    pub fn insert(&mut self, record: DocumentRecord) {
        self.documents.insert(record.doc_id.clone(), record);
    }

    pub fn remove(&mut self, doc_id: &str) -> Option<DocumentRecord> {
        self.documents.remove(doc_id)
    }

    pub fn get(&self, doc_id: &str) -> Option<&DocumentRecord> {
        self.documents.get(doc_id)
    }

    pub fn set_chunk_count(&mut self, doc_id: &str, chunk_count: usize) {
        if let Some(record) = self.documents.get_mut(doc_id) {
            record.chunk_count = chunk_count;
        }
    }

    pub fn documents(&self) -> &BTreeMap<String, DocumentRecord> {
        &self.documents
    }

    pub fn doc_ids(&self) -> Vec<String> {
        self.documents.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Sum of chunk counts across all records. Must match the index's
    /// populated entry count; a disagreement forces a rebuild.
    pub fn total_chunks(&self) -> usize {
        self.documents
            .values()
            .map(|record| record.chunk_count)
            .sum()
    }
}

#[derive(Serialize, Deserialize)]
struct PersistedMetadata {
    version: u32,
    documents: BTreeMap<String, DocumentRecord>,
}
