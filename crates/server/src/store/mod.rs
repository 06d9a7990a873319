// Document persistence.
//
// The reconciler treats this as an external collaborator: load, save,
// delete by id. The Postgres variant runs against a
// `documents(id, content, created_by, updated_at)` table; the memory
// variant backs tests and database-less development.

use anyhow::Context;
use chrono::{DateTime, Utc};
use coedit_common::types::Document;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Clone)]
pub enum DocumentStore {
    Postgres(sqlx::PgPool),
    Memory(Arc<RwLock<HashMap<Uuid, Document>>>),
}

impl DocumentStore {
    pub fn memory() -> Self {
        Self::Memory(Arc::new(RwLock::new(HashMap::new())))
    }

    pub async fn load_by_id(&self, id: Uuid) -> anyhow::Result<Option<Document>> {
        match self {
            Self::Postgres(pool) => {
                let row = sqlx::query_as::<_, (Uuid, String, Uuid, DateTime<Utc>)>(
                    "SELECT id, content, created_by, updated_at FROM documents WHERE id = $1",
                )
                .bind(id)
                .fetch_optional(pool)
                .await
                .context("failed to load document")?;

                Ok(row.map(|(id, content, created_by, updated_at)| Document {
                    id,
                    content,
                    created_by,
                    updated_at,
                }))
            }
            Self::Memory(store) => Ok(store.read().await.get(&id).cloned()),
        }
    }

    /// Persist the document, inserting when absent. Returns the saved
    /// document unchanged.
    pub async fn save(&self, document: &Document) -> anyhow::Result<Document> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query(
                    r#"
                    INSERT INTO documents (id, content, created_by, updated_at)
                    VALUES ($1, $2, $3, $4)
                    ON CONFLICT (id)
                    DO UPDATE SET content = $2, updated_at = $4
                    "#,
                )
                .bind(document.id)
                .bind(&document.content)
                .bind(document.created_by)
                .bind(document.updated_at)
                .execute(pool)
                .await
                .context("failed to save document")?;
            }
            Self::Memory(store) => {
                store.write().await.insert(document.id, document.clone());
            }
        }

        Ok(document.clone())
    }

    pub async fn delete_by_id(&self, id: Uuid) -> anyhow::Result<()> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query("DELETE FROM documents WHERE id = $1")
                    .bind(id)
                    .execute(pool)
                    .await
                    .context("failed to delete document")?;
            }
            Self::Memory(store) => {
                store.write().await.remove(&id);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_document() -> Document {
        Document {
            id: Uuid::new_v4(),
            content: "hello".to_string(),
            created_by: Uuid::new_v4(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn memory_store_saves_and_loads() {
        let store = DocumentStore::memory();
        let document = sample_document();

        store.save(&document).await.expect("save should succeed");
        let loaded = store
            .load_by_id(document.id)
            .await
            .expect("load should succeed")
            .expect("document should exist");
        assert_eq!(loaded, document);
    }

    #[tokio::test]
    async fn save_overwrites_content_and_updated_at() {
        let store = DocumentStore::memory();
        let mut document = sample_document();
        store.save(&document).await.expect("save should succeed");

        document.content = "changed".to_string();
        document.updated_at = Utc::now();
        store.save(&document).await.expect("second save should succeed");

        let loaded = store
            .load_by_id(document.id)
            .await
            .expect("load should succeed")
            .expect("document should exist");
        assert_eq!(loaded.content, "changed");
    }

    #[tokio::test]
    async fn missing_document_loads_none() {
        let store = DocumentStore::memory();
        assert!(store.load_by_id(Uuid::new_v4()).await.expect("load should succeed").is_none());
    }

    #[tokio::test]
    async fn delete_removes_document() {
        let store = DocumentStore::memory();
        let document = sample_document();
        store.save(&document).await.expect("save should succeed");
        store.delete_by_id(document.id).await.expect("delete should succeed");
        assert!(store
            .load_by_id(document.id)
            .await
            .expect("load should succeed")
            .is_none());
    }
}
