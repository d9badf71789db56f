use chrono::Utc;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunking::{split_text, ChunkingConfig};
use crate::embedding::Embedder;
use crate::error::IngestError;
use crate::extractor::PdfExtractor;
use crate::index::VectorIndex;
use crate::metadata::MetadataStore;
use crate::models::{DocumentRecord, IndexEntry, SearchHit};

const PDF_DIR: &str = "pdfs";
const METADATA_FILE: &str = "metadata.json";
const INDEX_FILE: &str = "index.json";

/// Orchestrates the lifecycle of compliance documents: PDF files on disk,
/// their chunk vectors in the index, and their records in the metadata
/// store stay consistent through ingestion, deletion, and rebuild.
///
/// Owns both stores; every mutating operation takes `&mut self`, so a
/// shared processor must sit behind a lock.
pub struct DocumentProcessor<E, X> {
    pdf_dir: PathBuf,
    metadata_path: PathBuf,
    index_path: PathBuf,
    embedder: E,
    extractor: X,
    chunking: ChunkingConfig,
    index: VectorIndex,
    metadata: MetadataStore,
}

impl<E, X> DocumentProcessor<E, X>
where
    E: Embedder,
    X: PdfExtractor,
{
    /// Open the stores under `data_dir`, creating the layout when absent,
    /// and reconcile the index against the metadata. A populated-entry
    /// count that disagrees with the aggregate chunk count forces a full
    /// rebuild, as do PDFs on disk with no metadata at all.
    pub async fn open(
        data_dir: impl Into<PathBuf>,
        embedder: E,
        extractor: X,
    ) -> Result<Self, IngestError> {
        let data_dir = data_dir.into();
        let pdf_dir = data_dir.join(PDF_DIR);
        fs::create_dir_all(&pdf_dir)?;

        let metadata_path = data_dir.join(METADATA_FILE);
        let index_path = data_dir.join(INDEX_FILE);

        let metadata = MetadataStore::load_or_default(&metadata_path);
        let index = VectorIndex::load_or_placeholder(&index_path, embedder.dimensions());

        let mut processor = Self {
            pdf_dir,
            metadata_path,
            index_path,
            embedder,
            extractor,
            chunking: ChunkingConfig::default(),
            index,
            metadata,
        };

        let out_of_sync = processor.index.populated_len() != processor.metadata.total_chunks();
        let orphan_pdfs = processor.metadata.is_empty() && !processor.stored_pdfs().is_empty();

        if out_of_sync || orphan_pdfs {
            warn!(
                indexed = processor.index.populated_len(),
                expected = processor.metadata.total_chunks(),
                "index out of sync with metadata, rebuilding"
            );
            processor.rebuild_index().await?;
        }

        Ok(processor)
    }

    /// Ingest a PDF: persist the raw bytes, extract text, chunk, embed, and
    /// record the document. A file whose text is empty or whitespace-only
    /// fails with [`IngestError::EmptyText`]; the saved file stays on disk
    /// and no other state changes.
    pub async fn ingest(
        &mut self,
        bytes: &[u8],
        filename: Option<&str>,
    ) -> Result<DocumentRecord, IngestError> {
        let doc_id = Uuid::new_v4().to_string();
        let filename = normalize_filename(filename, &doc_id)?;

        let pdf_path = self.pdf_dir.join(&filename);
        fs::write(&pdf_path, bytes)?;

        let text = self.extractor.extract_text(&pdf_path)?;
        if text.trim().is_empty() {
            warn!(filename = %filename, "no text could be extracted");
            return Err(IngestError::EmptyText(filename));
        }

        let chunks = split_text(&text, self.chunking)?;
        let entries = self.embed_chunks(&doc_id, &filename, chunks).await;
        let chunk_count = entries.len();

        self.index.insert(entries);
        self.index.save(&self.index_path)?;

        let record = DocumentRecord {
            doc_id: doc_id.clone(),
            filename: filename.clone(),
            uploaded_at: Utc::now(),
            chunk_count,
            file_path: pdf_path.to_string_lossy().to_string(),
        };
        self.metadata.insert(record.clone());
        self.metadata.save(&self.metadata_path)?;

        info!(doc_id = %doc_id, filename = %filename, chunk_count, "document ingested");
        Ok(record)
    }

    /// Top-k chunks relevant to `query`, most relevant first. When no
    /// documents exist, returns nothing without touching the embedding
    /// gateway.
    pub async fn search(&self, query: &str, k: usize) -> Vec<SearchHit> {
        if self.metadata.is_empty() {
            return Vec::new();
        }

        let query_vector = self.embedder.embed_query(query).await;
        self.index.search(&query_vector, k)
    }

    /// Remove a document: its PDF file (best-effort), its metadata record,
    /// and, via a full rebuild, its index entries.
    pub async fn delete(&mut self, doc_id: &str) -> Result<(), IngestError> {
        let record = self
            .metadata
            .remove(doc_id)
            .ok_or_else(|| IngestError::UnknownDocument(doc_id.to_string()))?;

        if let Err(error) = fs::remove_file(&record.file_path) {
            warn!(path = %record.file_path, %error, "could not remove pdf file");
        }

        self.metadata.save(&self.metadata_path)?;
        self.rebuild_index().await?;

        info!(doc_id = %doc_id, filename = %record.filename, "document deleted");
        Ok(())
    }

    /// Rebuild the index from scratch: reset to the placeholder, then
    /// re-read, re-chunk, and re-embed every document still in the
    /// metadata store, refreshing each record's chunk count. A document
    /// whose file is missing or unreadable is skipped with a warning and
    /// its chunk count left stale.
    pub async fn rebuild_index(&mut self) -> Result<(), IngestError> {
        self.index.reset();

        for doc_id in self.metadata.doc_ids() {
            let Some(record) = self.metadata.get(&doc_id).cloned() else {
                continue;
            };

            let path = Path::new(&record.file_path);
            if !path.exists() {
                warn!(filename = %record.filename, "pdf file missing, skipping during rebuild");
                continue;
            }

            let text = match self.extractor.extract_text(path) {
                Ok(text) => text,
                Err(error) => {
                    warn!(filename = %record.filename, %error, "extraction failed during rebuild");
                    continue;
                }
            };
            if text.trim().is_empty() {
                warn!(filename = %record.filename, "no text could be extracted during rebuild");
                continue;
            }

            let chunks = split_text(&text, self.chunking)?;
            let entries = self.embed_chunks(&doc_id, &record.filename, chunks).await;
            let chunk_count = entries.len();

            self.index.insert(entries);
            self.metadata.set_chunk_count(&doc_id, chunk_count);
            info!(filename = %record.filename, chunk_count, "reindexed document");
        }

        self.index.save(&self.index_path)?;
        self.metadata.save(&self.metadata_path)?;

        info!(
            indexed = self.index.populated_len(),
            documents = self.metadata.documents().len(),
            "index rebuilt"
        );
        Ok(())
    }

    pub fn documents(&self) -> &std::collections::BTreeMap<String, DocumentRecord> {
        self.metadata.documents()
    }

    async fn embed_chunks(
        &self,
        doc_id: &str,
        source: &str,
        chunks: Vec<String>,
    ) -> Vec<IndexEntry> {
        let vectors = self.embedder.embed_documents(&chunks).await;

        chunks
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(ordinal, (text, vector))| IndexEntry {
                chunk_id: make_chunk_id(doc_id, ordinal, &text),
                doc_id: doc_id.to_string(),
                source: source.to_string(),
                text,
                vector,
            })
            .collect()
    }

    fn stored_pdfs(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for entry in WalkDir::new(&self.pdf_dir)
            .into_iter()
            .filter_map(|item| item.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }

            let is_pdf = entry
                .path()
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

            if is_pdf {
                files.push(entry.path().to_path_buf());
            }
        }
        files.sort_unstable();
        files
    }
}

fn normalize_filename(filename: Option<&str>, doc_id: &str) -> Result<String, IngestError> {
    match filename {
        None => Ok(format!("{doc_id}.pdf")),
        Some(name) => {
            let trimmed = name.trim();
            if trimmed.is_empty() {
                return Err(IngestError::MissingFileName(name.to_string()));
            }
            if trimmed.to_lowercase().ends_with(".pdf") {
                Ok(trimmed.to_string())
            } else {
                Ok(format!("{trimmed}.pdf"))
            }
        }
    }
}

fn make_chunk_id(doc_id: &str, ordinal: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(doc_id.as_bytes());
    hasher.update((ordinal as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{CountingEmbedder, PlainTextExtractor};
    use tempfile::tempdir;

    async fn open_processor(
        data_dir: &Path,
    ) -> DocumentProcessor<CountingEmbedder, PlainTextExtractor> {
        DocumentProcessor::open(data_dir, CountingEmbedder::new(64), PlainTextExtractor)
            .await
            .expect("processor should open")
    }

    #[test]
    fn filenames_are_normalized_to_pdf() {
        assert_eq!(
            normalize_filename(Some("policy"), "id").unwrap(),
            "policy.pdf"
        );
        assert_eq!(
            normalize_filename(Some("policy.PDF"), "id").unwrap(),
            "policy.PDF"
        );
        assert_eq!(normalize_filename(None, "id").unwrap(), "id.pdf");
        assert!(normalize_filename(Some("  "), "id").is_err());
    }

    #[tokio::test]
    async fn ingesting_2500_chars_yields_three_chunks() {
        let dir = tempdir().unwrap();
        let mut processor = open_processor(dir.path()).await;

        let text = "compliance policy text ".repeat(109);
        let text = &text[..2_500];
        let record = processor
            .ingest(text.as_bytes(), Some("policy.pdf"))
            .await
            .unwrap();

        assert_eq!(record.chunk_count, 3);
        assert_eq!(record.filename, "policy.pdf");
        assert_eq!(processor.documents().len(), 1);
    }

    #[tokio::test]
    async fn empty_text_fails_but_keeps_the_saved_file() {
        let dir = tempdir().unwrap();
        let mut processor = open_processor(dir.path()).await;

        let result = processor.ingest(b"   \n  ", Some("scanned.pdf")).await;
        assert!(matches!(result, Err(IngestError::EmptyText(_))));

        assert!(dir.path().join("pdfs/scanned.pdf").exists());
        assert!(processor.documents().is_empty());
    }

    #[tokio::test]
    async fn search_on_empty_store_skips_the_embedding_gateway() {
        let dir = tempdir().unwrap();
        let processor = open_processor(dir.path()).await;

        let hits = processor.search("anything", 5).await;
        assert!(hits.is_empty());
        assert_eq!(processor.embedder.query_calls(), 0);
        assert_eq!(processor.embedder.batch_calls(), 0);
    }

    #[tokio::test]
    async fn search_finds_the_relevant_document() {
        let dir = tempdir().unwrap();
        let mut processor = open_processor(dir.path()).await;

        processor
            .ingest(
                b"data retention rules require archival for seven years",
                Some("retention.pdf"),
            )
            .await
            .unwrap();
        processor
            .ingest(
                b"travel expense reimbursement needs itemized receipts",
                Some("expenses.pdf"),
            )
            .await
            .unwrap();

        let hits = processor.search("data retention archival", 1).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "retention.pdf");
        assert_eq!(processor.embedder.query_calls(), 1);
    }

    #[tokio::test]
    async fn delete_removes_document_everywhere() {
        let dir = tempdir().unwrap();
        let mut processor = open_processor(dir.path()).await;

        let keep = processor
            .ingest(b"anti money laundering controls", Some("aml.pdf"))
            .await
            .unwrap();
        let removed = processor
            .ingest(b"gift and entertainment policy", Some("gifts.pdf"))
            .await
            .unwrap();

        processor.delete(&removed.doc_id).await.unwrap();

        assert!(!processor.documents().contains_key(&removed.doc_id));
        assert!(processor.documents().contains_key(&keep.doc_id));
        assert!(!dir.path().join("pdfs/gifts.pdf").exists());

        let hits = processor.search("gift and entertainment policy", 10).await;
        assert!(hits.iter().all(|hit| hit.source != "gifts.pdf"));
    }

    #[tokio::test]
    async fn deleting_unknown_document_fails() {
        let dir = tempdir().unwrap();
        let mut processor = open_processor(dir.path()).await;

        let result = processor.delete("no-such-id").await;
        assert!(matches!(result, Err(IngestError::UnknownDocument(_))));
    }

    #[tokio::test]
    async fn rebuild_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut processor = open_processor(dir.path()).await;

        let text = "records management procedure ".repeat(80);
        processor
            .ingest(text.as_bytes(), Some("records.pdf"))
            .await
            .unwrap();

        processor.rebuild_index().await.unwrap();
        let counts_first: Vec<usize> = processor
            .documents()
            .values()
            .map(|record| record.chunk_count)
            .collect();

        processor.rebuild_index().await.unwrap();
        let counts_second: Vec<usize> = processor
            .documents()
            .values()
            .map(|record| record.chunk_count)
            .collect();

        assert_eq!(counts_first, counts_second);
    }

    #[tokio::test]
    async fn rebuild_skips_documents_whose_file_is_missing() {
        let dir = tempdir().unwrap();
        let mut processor = open_processor(dir.path()).await;

        let kept = processor
            .ingest(b"code of conduct for all employees", Some("conduct.pdf"))
            .await
            .unwrap();
        let lost = processor
            .ingest(b"whistleblower reporting channels", Some("reporting.pdf"))
            .await
            .unwrap();

        fs::remove_file(dir.path().join("pdfs/reporting.pdf")).unwrap();
        processor.rebuild_index().await.unwrap();

        // The stale record remains, chunk count untouched, but its entries
        // are gone from the index.
        assert_eq!(
            processor.documents().get(&lost.doc_id).unwrap().chunk_count,
            lost.chunk_count
        );
        let hits = processor.search("whistleblower reporting channels", 10).await;
        assert!(hits.iter().all(|hit| hit.source != "reporting.pdf"));

        let hits = processor.search("code of conduct", 10).await;
        assert!(hits.iter().any(|hit| hit.doc_id == kept.doc_id));
    }

    #[tokio::test]
    async fn reopening_with_a_corrupt_index_triggers_a_rebuild() {
        let dir = tempdir().unwrap();
        {
            let mut processor = open_processor(dir.path()).await;
            processor
                .ingest(b"sanctions screening obligations", Some("sanctions.pdf"))
                .await
                .unwrap();
        }

        fs::write(dir.path().join("index.json"), b"garbage").unwrap();

        let processor = open_processor(dir.path()).await;
        let hits = processor.search("sanctions screening", 5).await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source, "sanctions.pdf");
    }

    #[tokio::test]
    async fn state_survives_a_clean_restart() {
        let dir = tempdir().unwrap();
        let doc_id;
        {
            let mut processor = open_processor(dir.path()).await;
            doc_id = processor
                .ingest(b"insider trading restrictions", Some("trading.pdf"))
                .await
                .unwrap()
                .doc_id;
        }

        let processor = open_processor(dir.path()).await;
        assert!(processor.documents().contains_key(&doc_id));
        let hits = processor.search("insider trading", 5).await;
        assert_eq!(hits.len(), 1);
    }
}
