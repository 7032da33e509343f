//! Embedded implementation of the remote store boundary over SQLite.
//!
//! Documents are schemaless: fields live as one JSON text column keyed
//! by (collection, id). Pool-level failures map to connectivity kinds;
//! everything else stays uncategorized.

use std::str::FromStr;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};

use shared::{
    domain::{merge_documents, Document, EntityId, FilterOp, FilterPredicate, RemoteRecord},
    error::StoreError,
};
use sync_core::RemoteStoreAdapter;

#[derive(Clone)]
pub struct DocumentStore {
    pool: Pool<Sqlite>,
}

impl DocumentStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_options)
            .await?;
        let store = Self { pool };
        store.ensure_documents_table().await?;
        Ok(store)
    }

    /// Single-connection pool, otherwise every acquire would see its
    /// own empty in-memory database.
    pub async fn in_memory() -> Result<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await?;
        let store = Self { pool };
        store.ensure_documents_table().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn ensure_documents_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id         TEXT NOT NULL,
                fields     TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure documents table exists")?;
        Ok(())
    }

    pub fn collection(&self, name: impl Into<String>) -> CollectionStore {
        CollectionStore {
            pool: self.pool.clone(),
            collection: name.into(),
        }
    }
}

/// One collection of the document store, usable as a remote store
/// adapter for the synchronization layer.
#[derive(Clone)]
pub struct CollectionStore {
    pool: Pool<Sqlite>,
    collection: String,
}

fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut => StoreError::timeout(),
        sqlx::Error::PoolClosed => StoreError::unreachable(),
        sqlx::Error::Io(_) => StoreError::unreachable(),
        other => StoreError::Unknown(other.into()),
    }
}

fn encode_fields(fields: &Document) -> Result<String, StoreError> {
    serde_json::to_string(fields).map_err(|err| StoreError::Unknown(err.into()))
}

fn decode_fields(raw: &str) -> Result<Document, StoreError> {
    serde_json::from_str(raw).map_err(|err| StoreError::Unknown(err.into()))
}

fn matches_filter(fields: &Document, filter: &[FilterPredicate]) -> bool {
    filter.iter().all(|predicate| match predicate.op {
        FilterOp::Eq => fields.get(&predicate.field) == Some(&predicate.value),
    })
}

#[async_trait]
impl RemoteStoreAdapter for CollectionStore {
    async fn get_all(&self, filter: &[FilterPredicate]) -> Result<Vec<RemoteRecord>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, fields, created_at, updated_at FROM documents
             WHERE collection = ? ORDER BY created_at, id",
        )
        .bind(&self.collection)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let raw: String = row.try_get("fields").map_err(map_sqlx_error)?;
            let fields = decode_fields(&raw)?;
            if !matches_filter(&fields, filter) {
                continue;
            }
            records.push(RemoteRecord {
                id: EntityId(row.try_get("id").map_err(map_sqlx_error)?),
                created_at: row
                    .try_get::<DateTime<Utc>, _>("created_at")
                    .map_err(map_sqlx_error)?,
                updated_at: row
                    .try_get::<DateTime<Utc>, _>("updated_at")
                    .map_err(map_sqlx_error)?,
                fields,
            });
        }
        Ok(records)
    }

    async fn add(&self, fields: &Document) -> Result<RemoteRecord, StoreError> {
        let id = EntityId(uuid::Uuid::new_v4().to_string());
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO documents (collection, id, fields, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&self.collection)
        .bind(&id.0)
        .bind(encode_fields(fields)?)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        Ok(RemoteRecord {
            id,
            created_at: now,
            updated_at: now,
            fields: fields.clone(),
        })
    }

    async fn update(&self, id: &EntityId, partial: &Document) -> Result<(), StoreError> {
        let row = sqlx::query("SELECT fields FROM documents WHERE collection = ? AND id = ?")
            .bind(&self.collection)
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let Some(row) = row else {
            return Err(StoreError::NotFound(id.clone()));
        };

        let raw: String = row.try_get("fields").map_err(map_sqlx_error)?;
        let mut fields = decode_fields(&raw)?;
        merge_documents(&mut fields, partial);

        sqlx::query("UPDATE documents SET fields = ?, updated_at = ? WHERE collection = ? AND id = ?")
            .bind(encode_fields(&fields)?)
            .bind(Utc::now())
            .bind(&self.collection)
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn remove(&self, id: &EntityId) -> Result<(), StoreError> {
        let done = sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
            .bind(&self.collection)
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(id.clone()));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
