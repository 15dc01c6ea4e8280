//! SQLite-backed content store.
//!
//! Documents are owned by the surrounding repository; this store only
//! reads them back by id for hydration. `upsert_document` exists for
//! seeding and tooling.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};

use super::content::{ContentStore, StoredDocument};
use super::types::Metadata;
use crate::core::errors::RagError;

pub struct SqliteContentStore {
    pool: SqlitePool,
}

impl SqliteContentStore {
    pub async fn with_path(db_path: PathBuf) -> Result<Self, RagError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(RagError::internal)?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> Result<(), RagError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS documents (
                id TEXT PRIMARY KEY,
                doc_type TEXT NOT NULL DEFAULT '',
                title TEXT NOT NULL DEFAULT '',
                content TEXT NOT NULL,
                metadata TEXT DEFAULT '{}',
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_documents_type ON documents(doc_type)")
            .execute(&self.pool)
            .await
            .map_err(RagError::internal)?;

        Ok(())
    }

    pub async fn upsert_document(&self, document: &StoredDocument) -> Result<(), RagError> {
        let metadata_str =
            serde_json::to_string(&document.metadata).unwrap_or_else(|_| "{}".to_string());

        sqlx::query(
            "INSERT OR REPLACE INTO documents (id, doc_type, title, content, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&document.id)
        .bind(&document.doc_type)
        .bind(&document.title)
        .bind(&document.content)
        .bind(&metadata_str)
        .execute(&self.pool)
        .await
        .map_err(RagError::internal)?;

        Ok(())
    }

    fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> StoredDocument {
        let metadata_str: Option<String> = row.get("metadata");
        let metadata = metadata_str
            .and_then(|s| serde_json::from_str::<Value>(&s).ok())
            .and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .unwrap_or_else(Metadata::new);

        StoredDocument {
            id: row.get("id"),
            title: row.get("title"),
            content: row.get("content"),
            metadata,
            doc_type: row.get("doc_type"),
        }
    }
}

#[async_trait]
impl ContentStore for SqliteContentStore {
    async fn get_document_by_id(
        &self,
        id: &str,
        doc_type: Option<&str>,
    ) -> Result<Option<StoredDocument>, RagError> {
        let row = if let Some(doc_type) = doc_type {
            sqlx::query(
                "SELECT id, doc_type, title, content, metadata
                 FROM documents
                 WHERE id = ?1 AND doc_type = ?2",
            )
            .bind(id)
            .bind(doc_type)
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::internal)?
        } else {
            sqlx::query(
                "SELECT id, doc_type, title, content, metadata
                 FROM documents
                 WHERE id = ?1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(RagError::internal)?
        };

        Ok(row.as_ref().map(Self::row_to_document))
    }
}
