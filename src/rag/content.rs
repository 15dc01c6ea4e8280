//! Read-only content repository used to hydrate raw matches.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::types::Metadata;
use crate::core::errors::RagError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    #[serde(rename = "type")]
    pub doc_type: String,
}

#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Look up a document by id, optionally restricted to one type.
    async fn get_document_by_id(
        &self,
        id: &str,
        doc_type: Option<&str>,
    ) -> Result<Option<StoredDocument>, RagError>;
}

/// In-process store, keyed by document id.
#[derive(Default)]
pub struct MemoryContentStore {
    documents: RwLock<HashMap<String, StoredDocument>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: impl IntoIterator<Item = StoredDocument>) -> Self {
        let store = Self::new();
        for doc in documents {
            store.put(doc);
        }
        store
    }

    pub fn put(&self, document: StoredDocument) {
        if let Ok(mut guard) = self.documents.write() {
            guard.insert(document.id.clone(), document);
        }
    }

    pub fn len(&self) -> usize {
        self.documents.read().map(|g| g.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn get_document_by_id(
        &self,
        id: &str,
        doc_type: Option<&str>,
    ) -> Result<Option<StoredDocument>, RagError> {
        let guard = self
            .documents
            .read()
            .map_err(|_| RagError::Internal("content store lock poisoned".into()))?;
        Ok(guard
            .get(id)
            .filter(|doc| doc_type.map_or(true, |t| doc.doc_type == t))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(id: &str, doc_type: &str) -> StoredDocument {
        StoredDocument {
            id: id.to_string(),
            title: format!("Title {}", id),
            content: format!("Content {}", id),
            metadata: Metadata::new(),
            doc_type: doc_type.to_string(),
        }
    }

    #[tokio::test]
    async fn lookup_respects_type_filter() {
        let store = MemoryContentStore::with_documents([doc("a", "faq"), doc("b", "note")]);
        assert_eq!(store.len(), 2);

        let found = store.get_document_by_id("a", Some("faq")).await.unwrap();
        assert_eq!(found.map(|d| d.id), Some("a".to_string()));

        assert!(store.get_document_by_id("a", Some("note")).await.unwrap().is_none());
        assert!(store.get_document_by_id("a", None).await.unwrap().is_some());
        assert!(store.get_document_by_id("zzz", None).await.unwrap().is_none());
    }
}
