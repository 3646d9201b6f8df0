//! In-memory [`IndexStore`] implementation for testing.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Vector search is brute-force cosine distance over the collection's records.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use super::{check_dims, check_model, rank, CollectionHandle, IndexStore};
use crate::embedding::cosine_distance;
use crate::error::{DocketError, Result};
use crate::models::{CollectionInfo, IndexRecord, RetrievedChunk};

const BACKEND: &str = "memory";

struct StoredCollection {
    handle: CollectionHandle,
    created_at: i64,
    /// Insertion order is preserved; upserts replace in place.
    records: Vec<IndexRecord>,
}

/// In-memory store for tests.
#[derive(Default)]
pub struct InMemoryStore {
    collections: RwLock<HashMap<String, StoredCollection>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, StoredCollection>>> {
        self.collections
            .read()
            .map_err(|_| DocketError::store(BACKEND, "lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, StoredCollection>>> {
        self.collections
            .write()
            .map_err(|_| DocketError::store(BACKEND, "lock poisoned"))
    }
}

fn upsert(records: &mut Vec<IndexRecord>, incoming: &[IndexRecord]) {
    for record in incoming {
        match records.iter_mut().find(|r| r.chunk.id == record.chunk.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
    }
}

#[async_trait]
impl IndexStore for InMemoryStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn open_or_create(
        &self,
        collection_id: &str,
        source: &str,
        model: &str,
        dims: usize,
    ) -> Result<CollectionHandle> {
        let mut collections = self.write()?;
        let stored = collections
            .entry(collection_id.to_string())
            .or_insert_with(|| StoredCollection {
                handle: CollectionHandle {
                    id: collection_id.to_string(),
                    source: source.to_string(),
                    model: model.to_string(),
                    dims,
                },
                created_at: chrono::Utc::now().timestamp(),
                records: Vec::new(),
            });
        check_model(&stored.handle, model, dims)?;
        stored.handle.source = source.to_string();
        Ok(stored.handle.clone())
    }

    async fn open(&self, collection_id: &str) -> Result<CollectionHandle> {
        self.read()?
            .get(collection_id)
            .map(|s| s.handle.clone())
            .ok_or_else(|| DocketError::CollectionNotFound(collection_id.to_string()))
    }

    async fn add(&self, handle: &CollectionHandle, records: &[IndexRecord]) -> Result<()> {
        check_dims(BACKEND, handle, records)?;
        let mut collections = self.write()?;
        let stored = collections
            .get_mut(&handle.id)
            .ok_or_else(|| DocketError::CollectionNotFound(handle.id.clone()))?;
        upsert(&mut stored.records, records);
        Ok(())
    }

    async fn replace(&self, handle: &CollectionHandle, records: &[IndexRecord]) -> Result<()> {
        check_dims(BACKEND, handle, records)?;
        let mut collections = self.write()?;
        let stored = collections
            .get_mut(&handle.id)
            .ok_or_else(|| DocketError::CollectionNotFound(handle.id.clone()))?;
        stored.records.clear();
        upsert(&mut stored.records, records);
        Ok(())
    }

    async fn query(
        &self,
        handle: &CollectionHandle,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        let collections = self.read()?;
        let stored = collections
            .get(&handle.id)
            .ok_or_else(|| DocketError::CollectionNotFound(handle.id.clone()))?;

        let hits = stored
            .records
            .iter()
            .map(|r| RetrievedChunk {
                chunk: r.chunk.clone(),
                distance: cosine_distance(embedding, &r.embedding),
            })
            .collect();
        Ok(rank(hits, k))
    }

    async fn record_ids(&self, handle: &CollectionHandle) -> Result<Vec<String>> {
        let collections = self.read()?;
        let stored = collections
            .get(&handle.id)
            .ok_or_else(|| DocketError::CollectionNotFound(handle.id.clone()))?;
        Ok(stored.records.iter().map(|r| r.chunk.id.clone()).collect())
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<()> {
        self.write()?.remove(collection_id);
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let collections = self.read()?;
        let mut infos: Vec<CollectionInfo> = collections
            .values()
            .map(|s| CollectionInfo {
                id: s.handle.id.clone(),
                source: s.handle.source.clone(),
                model: s.handle.model.clone(),
                dims: s.handle.dims,
                records: s.records.len() as i64,
                created_at: s.created_at,
            })
            .collect();
        infos.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(infos)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Chunk;

    fn record(source: &str, position: i64, text: &str, embedding: Vec<f32>) -> IndexRecord {
        IndexRecord {
            chunk: Chunk {
                id: crate::chunk::chunk_id(source, position),
                source: source.to_string(),
                position,
                page: 1,
                text: text.to_string(),
                hash: String::new(),
            },
            embedding,
        }
    }

    #[tokio::test]
    async fn test_open_missing_is_not_found() {
        let store = InMemoryStore::new();
        let err = store.open("ghost").await.unwrap_err();
        assert!(matches!(err, DocketError::CollectionNotFound(ref id) if id == "ghost"));
    }

    #[tokio::test]
    async fn test_open_or_create_is_idempotent() {
        let store = InMemoryStore::new();
        let a = store.open_or_create("lease", "lease.pdf", "m", 2).await.unwrap();
        let b = store.open_or_create("lease", "lease.pdf", "m", 2).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(store.list_collections().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_model_pinned() {
        let store = InMemoryStore::new();
        store.open_or_create("lease", "lease.pdf", "m1", 2).await.unwrap();
        let err = store
            .open_or_create("lease", "lease.pdf", "m2", 2)
            .await
            .unwrap_err();
        assert!(matches!(err, DocketError::ModelMismatch { .. }));
    }

    #[tokio::test]
    async fn test_query_orders_by_distance_then_insertion() {
        let store = InMemoryStore::new();
        let h = store.open_or_create("c", "c.pdf", "m", 2).await.unwrap();
        store
            .add(
                &h,
                &[
                    record("c.pdf", 0, "far", vec![0.0, 1.0]),
                    record("c.pdf", 1, "tie-a", vec![1.0, 0.0]),
                    record("c.pdf", 2, "tie-b", vec![2.0, 0.0]),
                ],
            )
            .await
            .unwrap();

        let hits = store.query(&h, &[1.0, 0.0], 5).await.unwrap();
        let texts: Vec<&str> = hits.iter().map(|h| h.chunk.text.as_str()).collect();
        assert_eq!(texts, vec!["tie-a", "tie-b", "far"]);

        let top1 = store.query(&h, &[1.0, 0.0], 1).await.unwrap();
        assert_eq!(top1.len(), 1);
    }

    #[tokio::test]
    async fn test_add_upserts_by_id() {
        let store = InMemoryStore::new();
        let h = store.open_or_create("c", "c.pdf", "m", 2).await.unwrap();
        store.add(&h, &[record("c.pdf", 0, "v1", vec![1.0, 0.0])]).await.unwrap();
        store.add(&h, &[record("c.pdf", 0, "v2", vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(store.record_ids(&h).await.unwrap(), vec!["c.pdf_0"]);
        let hits = store.query(&h, &[1.0, 0.0], 5).await.unwrap();
        assert_eq!(hits[0].chunk.text, "v2");
    }

    #[tokio::test]
    async fn test_replace_drops_stale_records() {
        let store = InMemoryStore::new();
        let h = store.open_or_create("c", "c.pdf", "m", 2).await.unwrap();
        store
            .add(
                &h,
                &[
                    record("c.pdf", 0, "a", vec![1.0, 0.0]),
                    record("c.pdf", 1, "b", vec![0.0, 1.0]),
                ],
            )
            .await
            .unwrap();
        store.replace(&h, &[record("c.pdf", 0, "a2", vec![1.0, 0.0])]).await.unwrap();
        assert_eq!(store.record_ids(&h).await.unwrap(), vec!["c.pdf_0"]);
    }

    #[tokio::test]
    async fn test_wrong_dims_rejected() {
        let store = InMemoryStore::new();
        let h = store.open_or_create("c", "c.pdf", "m", 3).await.unwrap();
        let err = store
            .add(&h, &[record("c.pdf", 0, "a", vec![1.0, 0.0])])
            .await
            .unwrap_err();
        assert!(matches!(err, DocketError::Store { .. }));
    }
}
