//! Indexing pipeline orchestration.
//!
//! Coordinates the flow for one document: extraction → page-aware chunking →
//! batched embedding → collection write. Re-indexing a document replaces
//! the collection's records, so a document indexed twice holds each chunk
//! once. Indexing runs for the same collection are serialized.
//!
//! [`Indexer::index_all`] indexes a batch of files, each into its own
//! collection; a failed file is reported and the batch moves on. With
//! `skip_existing`, documents whose collection already exists are left
//! untouched.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{info, warn};
use walkdir::WalkDir;

use crate::chunk::{chunk_pages, TextSplitter};
use crate::collection::{derive_collection_id, source_name};
use crate::embedding::{check_batch, Embedder};
use crate::error::{DocketError, Result};
use crate::extract::{is_pdf, PageExtractor};
use crate::models::IndexRecord;
use crate::store::IndexStore;

/// Outcome of indexing one document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexReport {
    /// File name of the indexed document.
    pub document: String,
    pub collection: String,
    pub pages: usize,
    pub chunks: usize,
}

/// Per-file result of [`Indexer::index_all`].
#[derive(Debug)]
pub enum BatchOutcome {
    Indexed(IndexReport),
    /// The collection already existed and `skip_existing` was set.
    Skipped { document: String, collection: String },
    Failed { document: String, error: DocketError },
}

impl BatchOutcome {
    pub fn document(&self) -> &str {
        match self {
            BatchOutcome::Indexed(report) => &report.document,
            BatchOutcome::Skipped { document, .. } | BatchOutcome::Failed { document, .. } => {
                document
            }
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, BatchOutcome::Failed { .. })
    }
}

/// Expand `inputs` into the files to index. A directory contributes the
/// PDFs directly inside it, sorted by path; files are kept as given.
pub fn collect_pdfs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if !input.is_dir() {
            files.push(input.clone());
            continue;
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(input).min_depth(1).max_depth(1).follow_links(true) {
            let entry = entry.map_err(std::io::Error::from)?;
            if entry.file_type().is_file() && is_pdf(entry.path()) {
                found.push(entry.into_path());
            }
        }
        found.sort();
        files.extend(found);
    }
    Ok(files)
}

/// Builds and refreshes per-document collections.
pub struct Indexer {
    extractor: Arc<dyn PageExtractor>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn IndexStore>,
    splitter: TextSplitter,
    batch_size: usize,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl Indexer {
    pub fn new(
        extractor: Arc<dyn PageExtractor>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn IndexStore>,
        splitter: TextSplitter,
    ) -> Self {
        Self {
            extractor,
            embedder,
            store,
            splitter,
            batch_size: 64,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Number of chunks sent to the embedder per call.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Extract, chunk, embed and store the document at `path`.
    pub async fn index(&self, path: &Path) -> Result<IndexReport> {
        let document = source_name(path);
        let pages = self.extractor.extract_pages(path).await?;
        self.index_pages(&document, &pages).await
    }

    /// Index every file in `paths`, one collection per document.
    pub async fn index_all(&self, paths: &[PathBuf], skip_existing: bool) -> Vec<BatchOutcome> {
        let mut outcomes = Vec::with_capacity(paths.len());
        for path in paths {
            let document = source_name(path);
            let outcome = match self.index_one(path, &document, skip_existing).await {
                Ok(outcome) => outcome,
                Err(error) => {
                    warn!(document = %document, error = %error, "failed to index document");
                    BatchOutcome::Failed { document, error }
                }
            };
            outcomes.push(outcome);
        }

        info!(
            files = paths.len(),
            failed = outcomes.iter().filter(|o| o.is_failed()).count(),
            "batch indexing finished"
        );
        outcomes
    }

    async fn index_one(
        &self,
        path: &Path,
        document: &str,
        skip_existing: bool,
    ) -> Result<BatchOutcome> {
        if skip_existing && self.is_indexed(document).await? {
            let collection = derive_collection_id(document);
            info!(document, collection = %collection, "already indexed, skipping");
            return Ok(BatchOutcome::Skipped {
                document: document.to_string(),
                collection,
            });
        }
        self.index(path).await.map(BatchOutcome::Indexed)
    }

    /// Whether a collection exists for the file name `document`.
    pub async fn is_indexed(&self, document: &str) -> Result<bool> {
        match self.store.open(&derive_collection_id(document)).await {
            Ok(_) => Ok(true),
            Err(DocketError::CollectionNotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Index already-extracted page text under the file name `document`.
    pub async fn index_pages(&self, document: &str, pages: &[String]) -> Result<IndexReport> {
        let collection_id = derive_collection_id(document);
        let lock = self.collection_lock(&collection_id)?;
        let _guard = lock.lock().await;

        let chunks = chunk_pages(document, pages, &self.splitter);
        if chunks.is_empty() {
            warn!(document, collection = %collection_id, "document produced no text");
            return Err(DocketError::Extraction {
                document: document.to_string(),
                message: "no extractable text (scanned or image-only PDF?)".into(),
            });
        }

        let mut records = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_batch(&texts).await?;
            check_batch(self.embedder.as_ref(), texts.len(), &vectors)?;
            records.extend(
                batch
                    .iter()
                    .cloned()
                    .zip(vectors)
                    .map(|(chunk, embedding)| IndexRecord { chunk, embedding }),
            );
        }

        let handle = self.open_for_write(&collection_id, document).await?;
        self.store.replace(&handle, &records).await?;

        info!(
            document,
            collection = %collection_id,
            pages = pages.len(),
            chunks = records.len(),
            model = self.embedder.model_name(),
            "indexed document"
        );

        Ok(IndexReport {
            document: document.to_string(),
            collection: collection_id,
            pages: pages.len(),
            chunks: records.len(),
        })
    }

    /// Open the collection for writing. A collection built with another
    /// embedding model is dropped and rebuilt.
    async fn open_for_write(
        &self,
        collection_id: &str,
        document: &str,
    ) -> Result<crate::store::CollectionHandle> {
        let model = self.embedder.model_name();
        let dims = self.embedder.dims();
        match self
            .store
            .open_or_create(collection_id, document, model, dims)
            .await
        {
            Err(DocketError::ModelMismatch { expected, .. }) => {
                warn!(
                    collection = collection_id,
                    previous_model = %expected,
                    model,
                    "embedding model changed, rebuilding collection"
                );
                self.store.delete_collection(collection_id).await?;
                self.store
                    .open_or_create(collection_id, document, model, dims)
                    .await
            }
            other => other,
        }
    }

    fn collection_lock(&self, collection_id: &str) -> Result<Arc<tokio::sync::Mutex<()>>> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| DocketError::store(self.store.backend(), "indexer lock poisoned"))?;
        Ok(locks
            .entry(collection_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone())
    }
}
