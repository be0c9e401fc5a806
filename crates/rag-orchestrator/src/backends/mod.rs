//! Retrieval backends
//!
//! Each backend answers a `SearchRequest` with scored `SearchResult`s. The
//! search nodes own the fan-out over sub-queries and the conversion of
//! failures into error entries; adapters only report what happened.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::state::{Backend, SearchResult};

pub mod dataverse;
pub mod excel;
pub mod sql;
pub mod vector;

pub use dataverse::{DataverseConfig, DataverseSearch};
pub use excel::{ExcelSearch, Sheet};
pub use sql::{SqlExecutor, SqlSearch};
pub use vector::{KeywordStore, StoredDocument, VectorSearch, VectorStore};

/// Default number of results per request.
pub const DEFAULT_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Restrict results to these source URLs when the backend supports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            limit: DEFAULT_LIMIT,
            urls: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_urls(mut self, urls: Vec<String>) -> Self {
        self.urls = Some(urls);
        self
    }
}

/// A request the backend could not turn into a query (e.g. generated SQL that
/// is not read-only). Search nodes record it as a malformed-query failure.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct MalformedQuery(pub String);

#[async_trait]
pub trait SearchBackend: Send + Sync {
    fn backend(&self) -> Backend;

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>>;
}

/// Interleave per-sub-query result sets round-robin so each sub-query
/// contributes, dropping repeated content. Repeats keep the higher score.
pub fn merge_results(result_sets: Vec<Vec<SearchResult>>, limit: usize) -> Vec<SearchResult> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<SearchResult> = Vec::new();
    let mut iterators: Vec<std::vec::IntoIter<SearchResult>> =
        result_sets.into_iter().map(|v| v.into_iter()).collect();

    loop {
        let mut any_left = false;
        for iter in iterators.iter_mut() {
            let Some(item) = iter.next() else { continue };
            any_left = true;

            let key = content_key(&item.content);
            match positions.get(&key) {
                Some(&idx) => {
                    if item.score > merged[idx].score {
                        merged[idx].score = item.score;
                    }
                }
                None => {
                    positions.insert(key, merged.len());
                    merged.push(item);
                }
            }
        }
        if !any_left {
            break;
        }
    }

    merged.truncate(limit);
    merged
}

fn content_key(content: &str) -> String {
    crate::understanding::decomposer::normalize(content)
}

const SHORT_STOPWORDS: &[&str] = &[
    "and", "are", "the", "for", "how", "who", "why", "was", "its", "our", "can", "all", "any",
    "get", "did", "not", "but", "into", "list", "give", "find",
];

/// Lowercased content words of a query, in order, without duplicates.
pub fn query_terms(text: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        let word = raw.to_lowercase();
        if word.chars().count() < 3
            || SHORT_STOPWORDS.contains(&word.as_str())
            || crate::memory::STOPWORDS.contains(&word.as_str())
        {
            continue;
        }
        if !terms.contains(&word) {
            terms.push(word);
        }
    }
    terms
}

/// Fraction of `terms` that occur in `text` (case-insensitive).
pub fn term_overlap(terms: &[String], text: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    let hits = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    hits as f32 / terms.len() as f32
}
