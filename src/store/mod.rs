//! Storage abstraction for per-document vector collections.
//!
//! The [`IndexStore`] trait defines every operation the indexing and
//! retrieval pipeline needs, enabling pluggable backends: [`SqliteStore`]
//! persists all collections under one base directory, [`InMemoryStore`]
//! backs tests.
//!
//! Collections are independent partitions keyed by collection id; there is
//! no cross-collection query. Each collection is pinned to the embedding
//! model (name and dimensionality) that created it.
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::{DocketError, Result};
use crate::models::{CollectionInfo, IndexRecord, RetrievedChunk};

/// An opened collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    pub id: String,
    /// File name recorded for the collection's source document.
    pub source: String,
    /// Embedding model the collection was built with.
    pub model: String,
    pub dims: usize,
}

/// Abstract storage backend for document collections.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`open_or_create`](IndexStore::open_or_create) | Idempotently create or open a collection |
/// | [`open`](IndexStore::open) | Open an existing collection, failing if absent |
/// | [`add`](IndexStore::add) | Upsert records by id |
/// | [`replace`](IndexStore::replace) | Atomically swap a collection's records |
/// | [`query`](IndexStore::query) | Nearest neighbors by cosine distance |
/// | [`record_ids`](IndexStore::record_ids) | Ids currently stored, for dedup policies |
/// | [`delete_collection`](IndexStore::delete_collection) | Drop a collection and its records |
/// | [`list_collections`](IndexStore::list_collections) | Enumerate collections |
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Backend name used in errors and logs.
    fn backend(&self) -> &str;

    /// Open `collection_id`, creating it pinned to `model`/`dims` if absent.
    ///
    /// Fails with [`DocketError::ModelMismatch`] if the collection exists and
    /// was built with a different model.
    async fn open_or_create(
        &self,
        collection_id: &str,
        source: &str,
        model: &str,
        dims: usize,
    ) -> Result<CollectionHandle>;

    /// Open an existing collection.
    ///
    /// Fails with [`DocketError::CollectionNotFound`] if it was never created.
    async fn open(&self, collection_id: &str) -> Result<CollectionHandle>;

    /// Append records, replacing any existing record with the same id.
    async fn add(&self, handle: &CollectionHandle, records: &[IndexRecord]) -> Result<()>;

    /// Remove every record in the collection and write `records`, atomically.
    async fn replace(&self, handle: &CollectionHandle, records: &[IndexRecord]) -> Result<()>;

    /// The `k` records nearest to `embedding`, best match first.
    ///
    /// Ties keep insertion order.
    async fn query(
        &self,
        handle: &CollectionHandle,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>>;

    /// Ids of all records in the collection, in insertion order.
    async fn record_ids(&self, handle: &CollectionHandle) -> Result<Vec<String>>;

    /// Drop a collection. No-op if it does not exist.
    async fn delete_collection(&self, collection_id: &str) -> Result<()>;

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;
}

/// Reject records whose vectors do not match the collection's dimensionality.
pub(crate) fn check_dims(backend: &str, handle: &CollectionHandle, records: &[IndexRecord]) -> Result<()> {
    match records.iter().find(|r| r.embedding.len() != handle.dims) {
        Some(bad) => Err(DocketError::store(
            backend,
            format!(
                "record '{}' has {} dims, collection '{}' expects {}",
                bad.chunk.id,
                bad.embedding.len(),
                handle.id,
                handle.dims
            ),
        )),
        None => Ok(()),
    }
}

pub(crate) fn check_model(handle: &CollectionHandle, model: &str, dims: usize) -> Result<()> {
    if handle.model != model || handle.dims != dims {
        return Err(DocketError::ModelMismatch {
            collection: handle.id.clone(),
            expected: handle.model.clone(),
            expected_dims: handle.dims,
            actual: model.to_string(),
            actual_dims: dims,
        });
    }
    Ok(())
}

/// Sort candidates by ascending distance, keeping insertion order for ties,
/// and keep the first `k`.
pub(crate) fn rank(mut hits: Vec<RetrievedChunk>, k: usize) -> Vec<RetrievedChunk> {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(k);
    hits
}
