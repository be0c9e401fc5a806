//! Vector store backend
//!
//! `VectorStore` is the seam for third-party vector databases (Azure AI
//! Search, LanceDB, pgvector...). `KeywordStore` is an in-process store that
//! scores by term overlap, useful for tests and small corpora.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use super::{query_terms, term_overlap, SearchBackend, SearchRequest};
use crate::state::{Backend, SearchResult};

/// A document chunk as stored in a vector index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub page_content: String,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl StoredDocument {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.metadata.insert("url".to_string(), Value::String(url.into()));
        self
    }

    /// Source URLs from the `url` metadata field (string or array).
    pub fn urls(&self) -> Option<Vec<String>> {
        match self.metadata.get("url")? {
            Value::String(s) => Some(vec![s.clone()]),
            Value::Array(items) => Some(
                items
                    .iter()
                    .map(|v| match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect(),
            ),
            Value::Number(n) => Some(vec![n.to_string()]),
            _ => None,
        }
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Top `k` documents for `query` with their similarity scores, optionally
    /// restricted to documents whose URL is in `urls`.
    async fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
        urls: Option<&[String]>,
    ) -> Result<Vec<(StoredDocument, f32)>>;
}

/// Backend adapter over any `VectorStore`.
pub struct VectorSearch {
    store: Arc<dyn VectorStore>,
}

impl VectorSearch {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SearchBackend for VectorSearch {
    fn backend(&self) -> Backend {
        Backend::Vector
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let hits = self
            .store
            .similarity_search_with_score(&request.query, request.limit, request.urls.as_deref())
            .await?;

        Ok(hits
            .into_iter()
            .map(|(doc, score)| {
                let url = doc.urls();
                SearchResult {
                    content: doc.page_content,
                    url,
                    score,
                    metadata: doc.metadata,
                }
            })
            .collect())
    }
}

/// In-memory store ranking documents by query-term overlap.
#[derive(Default)]
pub struct KeywordStore {
    documents: RwLock<Vec<StoredDocument>>,
}

impl KeywordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: Vec<StoredDocument>) -> Self {
        Self {
            documents: RwLock::new(documents),
        }
    }

    pub fn add(&self, document: StoredDocument) {
        self.documents.write().push(document);
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

#[async_trait]
impl VectorStore for KeywordStore {
    async fn similarity_search_with_score(
        &self,
        query: &str,
        k: usize,
        urls: Option<&[String]>,
    ) -> Result<Vec<(StoredDocument, f32)>> {
        let terms = query_terms(query);
        let documents = self.documents.read();

        let mut scored: Vec<(StoredDocument, f32)> = documents
            .iter()
            .filter(|doc| match urls {
                Some(allowed) if !allowed.is_empty() => doc
                    .urls()
                    .map(|own| own.iter().any(|u| allowed.contains(u)))
                    .unwrap_or(false),
                _ => true,
            })
            .map(|doc| (doc.clone(), term_overlap(&terms, &doc.page_content)))
            .filter(|(_, score)| *score > 0.0)
            .collect();

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}
