//! Nearest-chunk retrieval scoped to one document's collection.

use std::sync::Arc;

use tracing::debug;

use crate::collection::derive_collection_id;
use crate::embedding::Embedder;
use crate::error::{DocketError, Result};
use crate::models::RetrievedChunk;
use crate::store::{check_model, IndexStore};

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn IndexStore>,
    top_k: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn IndexStore>, top_k: usize) -> Self {
        Self {
            embedder,
            store,
            top_k: top_k.max(1),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Return up to `top_k` chunks of `document` nearest to `query`, best first.
    ///
    /// The collection is looked up before the query is embedded, so asking
    /// about a document that was never indexed fails with
    /// [`DocketError::NotIndexed`] without touching the embedding model.
    pub async fn retrieve(&self, query: &str, document: &str) -> Result<Vec<RetrievedChunk>> {
        let collection_id = derive_collection_id(document);
        let handle = match self.store.open(&collection_id).await {
            Ok(handle) => handle,
            Err(DocketError::CollectionNotFound(_)) => {
                return Err(DocketError::NotIndexed {
                    document: document.to_string(),
                    collection: collection_id,
                })
            }
            Err(e) => return Err(e),
        };
        check_model(&handle, self.embedder.model_name(), self.embedder.dims())?;

        let embedding = self.embedder.embed(query).await?;
        let hits = self.store.query(&handle, &embedding, self.top_k).await?;

        debug!(
            collection = %collection_id,
            hits = hits.len(),
            best = hits.first().map(|h| h.distance),
            "retrieved chunks"
        );
        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, IndexRecord};
    use crate::store::InMemoryStore;
    use async_trait::async_trait;

    /// Embeds by keyword presence: [rent, roof, other].
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn provider(&self) -> &str {
            "test"
        }
        fn model_name(&self) -> &str {
            "keywords"
        }
        fn dims(&self) -> usize {
            3
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        t.contains("rent") as u8 as f32,
                        t.contains("roof") as u8 as f32,
                        0.1,
                    ]
                })
                .collect())
        }
    }

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let h = store.open_or_create("lease", "lease.pdf", "keywords", 3).await.unwrap();
        let records: Vec<IndexRecord> = ["Rent is due monthly.", "The roof is the landlord's duty."]
            .iter()
            .enumerate()
            .map(|(i, text)| IndexRecord {
                chunk: Chunk {
                    id: format!("lease.pdf_{}", i),
                    source: "lease.pdf".into(),
                    position: i as i64,
                    page: 1,
                    text: text.to_string(),
                    hash: String::new(),
                },
                embedding: vec![(i == 0) as u8 as f32, (i == 1) as u8 as f32, 0.1],
            })
            .collect();
        store.add(&h, &records).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_nearest_chunk_first() {
        let retriever = Retriever::new(Arc::new(KeywordEmbedder), seeded_store().await, 5);
        let hits = retriever.retrieve("who fixes the roof?", "lease.pdf").await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].chunk.text.contains("roof"));
    }

    #[tokio::test]
    async fn test_top_k_limits_results() {
        let retriever = Retriever::new(Arc::new(KeywordEmbedder), seeded_store().await, 1);
        let hits = retriever.retrieve("rent", "Lease.PDF").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].chunk.text.contains("Rent"));
    }

    #[tokio::test]
    async fn test_unindexed_document() {
        let retriever = Retriever::new(Arc::new(KeywordEmbedder), seeded_store().await, 5);
        let err = retriever.retrieve("rent", "deed.pdf").await.unwrap_err();
        assert!(
            matches!(err, DocketError::NotIndexed { ref document, ref collection } if document == "deed.pdf" && collection == "deed")
        );
    }

    #[tokio::test]
    async fn test_model_mismatch_rejected() {
        let store = Arc::new(InMemoryStore::new());
        store.open_or_create("lease", "lease.pdf", "other", 3).await.unwrap();
        let retriever = Retriever::new(Arc::new(KeywordEmbedder), store, 5);
        let err = retriever.retrieve("rent", "lease.pdf").await.unwrap_err();
        assert!(matches!(err, DocketError::ModelMismatch { .. }));
    }
}
