//! SQLite-backed [`IndexStore`] implementation.
//!
//! All collections share one database file under the store's base
//! directory; every row is keyed by its collection id, and every query is
//! scoped to exactly one collection. Vectors are stored as little-endian
//! `f32` BLOBs and compared with brute-force cosine distance.

use std::path::Path;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, warn};

use super::{check_dims, check_model, rank, CollectionHandle, IndexStore};
use crate::db;
use crate::embedding::{blob_to_vec, cosine_distance, vec_to_blob};
use crate::error::{DocketError, Result};
use crate::migrate;
use crate::models::{Chunk, CollectionInfo, IndexRecord, RetrievedChunk};

const BACKEND: &str = "sqlite";

/// SQLite implementation of the [`IndexStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
}

fn store_err(e: impl std::fmt::Display) -> DocketError {
    DocketError::store(BACKEND, e)
}

impl SqliteStore {
    /// Open (creating if needed) the store rooted at `base_dir` and run migrations.
    pub async fn connect(base_dir: &Path) -> Result<Self> {
        let pool = db::connect(base_dir).await.map_err(store_err)?;
        migrate::run_migrations(&pool).await.map_err(store_err)?;
        debug!(path = %db::db_path(base_dir).display(), "index store ready");
        Ok(Self { pool })
    }

    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn fetch_handle(&self, collection_id: &str) -> Result<Option<CollectionHandle>> {
        let row = sqlx::query("SELECT id, source, model, dims FROM collections WHERE id = ?")
            .bind(collection_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_err)?;

        Ok(row.map(|r| CollectionHandle {
            id: r.get("id"),
            source: r.get("source"),
            model: r.get("model"),
            dims: r.get::<i64, _>("dims") as usize,
        }))
    }

    async fn ensure_exists(&self, handle: &CollectionHandle) -> Result<()> {
        match self.fetch_handle(&handle.id).await? {
            Some(_) => Ok(()),
            None => Err(DocketError::CollectionNotFound(handle.id.clone())),
        }
    }
}

async fn insert_records(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    collection_id: &str,
    records: &[IndexRecord],
) -> Result<()> {
    for record in records {
        let chunk = &record.chunk;
        sqlx::query(
            r#"
            INSERT INTO records (collection_id, id, source, position, page, text, hash, embedding)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(collection_id, id) DO UPDATE SET
                source = excluded.source,
                position = excluded.position,
                page = excluded.page,
                text = excluded.text,
                hash = excluded.hash,
                embedding = excluded.embedding
            "#,
        )
        .bind(collection_id)
        .bind(&chunk.id)
        .bind(&chunk.source)
        .bind(chunk.position)
        .bind(chunk.page)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .bind(vec_to_blob(&record.embedding))
        .execute(&mut **tx)
        .await
        .map_err(store_err)?;
    }
    Ok(())
}

#[async_trait]
impl IndexStore for SqliteStore {
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
        if let Some(mut handle) = self.fetch_handle(collection_id).await? {
            check_model(&handle, model, dims)?;
            if handle.source != source {
                warn!(
                    collection = collection_id,
                    previous = %handle.source,
                    current = source,
                    "file names share a collection id"
                );
                sqlx::query("UPDATE collections SET source = ? WHERE id = ?")
                    .bind(source)
                    .bind(collection_id)
                    .execute(&self.pool)
                    .await
                    .map_err(store_err)?;
                handle.source = source.to_string();
            }
            return Ok(handle);
        }

        sqlx::query(
            "INSERT INTO collections (id, source, model, dims, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(collection_id)
        .bind(source)
        .bind(model)
        .bind(dims as i64)
        .bind(chrono::Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(store_err)?;

        debug!(collection = collection_id, model, dims, "created collection");

        Ok(CollectionHandle {
            id: collection_id.to_string(),
            source: source.to_string(),
            model: model.to_string(),
            dims,
        })
    }

    async fn open(&self, collection_id: &str) -> Result<CollectionHandle> {
        self.fetch_handle(collection_id)
            .await?
            .ok_or_else(|| DocketError::CollectionNotFound(collection_id.to_string()))
    }

    async fn add(&self, handle: &CollectionHandle, records: &[IndexRecord]) -> Result<()> {
        check_dims(BACKEND, handle, records)?;
        self.ensure_exists(handle).await?;

        let mut tx = self.pool.begin().await.map_err(store_err)?;
        insert_records(&mut tx, &handle.id, records).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn replace(&self, handle: &CollectionHandle, records: &[IndexRecord]) -> Result<()> {
        check_dims(BACKEND, handle, records)?;
        self.ensure_exists(handle).await?;

        let mut tx = self.pool.begin().await.map_err(store_err)?;

        sqlx::query("DELETE FROM records WHERE collection_id = ?")
            .bind(&handle.id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;

        insert_records(&mut tx, &handle.id, records).await?;
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn query(
        &self,
        handle: &CollectionHandle,
        embedding: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>> {
        self.ensure_exists(handle).await?;
        if embedding.len() != handle.dims {
            return Err(store_err(format!(
                "query has {} dims, collection '{}' expects {}",
                embedding.len(),
                handle.id,
                handle.dims
            )));
        }

        let rows = sqlx::query(
            r#"
            SELECT id, source, position, page, text, hash, embedding
            FROM records
            WHERE collection_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(&handle.id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        let hits = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                RetrievedChunk {
                    distance: cosine_distance(embedding, &blob_to_vec(&blob)),
                    chunk: Chunk {
                        id: row.get("id"),
                        source: row.get("source"),
                        position: row.get("position"),
                        page: row.get("page"),
                        text: row.get("text"),
                        hash: row.get("hash"),
                    },
                }
            })
            .collect();

        Ok(rank(hits, k))
    }

    async fn record_ids(&self, handle: &CollectionHandle) -> Result<Vec<String>> {
        self.ensure_exists(handle).await?;
        sqlx::query_scalar("SELECT id FROM records WHERE collection_id = ? ORDER BY seq ASC")
            .bind(&handle.id)
            .fetch_all(&self.pool)
            .await
            .map_err(store_err)
    }

    async fn delete_collection(&self, collection_id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(store_err)?;
        sqlx::query("DELETE FROM records WHERE collection_id = ?")
            .bind(collection_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        sqlx::query("DELETE FROM collections WHERE id = ?")
            .bind(collection_id)
            .execute(&mut *tx)
            .await
            .map_err(store_err)?;
        tx.commit().await.map_err(store_err)?;
        Ok(())
    }

    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.source, c.model, c.dims, c.created_at,
                   (SELECT COUNT(*) FROM records r WHERE r.collection_id = c.id) AS records
            FROM collections c
            ORDER BY c.id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(store_err)?;

        Ok(rows
            .iter()
            .map(|r| CollectionInfo {
                id: r.get("id"),
                source: r.get("source"),
                model: r.get("model"),
                dims: r.get::<i64, _>("dims") as usize,
                records: r.get("records"),
                created_at: r.get("created_at"),
            })
            .collect())
    }
}
