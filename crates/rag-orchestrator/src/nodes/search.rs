use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;

use crate::backends::{merge_results, MalformedQuery, SearchBackend, SearchRequest, DEFAULT_LIMIT};
use crate::error::NodeError;
use crate::graph::{Node, NodeId};
use crate::state::{Backend, FailureKind, QueryState, SearchEntry};

/// Search step for one backend. Every run leaves an entry under the
/// backend's key, either results or an error record.
pub struct SearchNode {
    backend: Backend,
    adapter: Option<Arc<dyn SearchBackend>>,
    limit: usize,
    urls: Option<Vec<String>>,
}

impl SearchNode {
    pub fn new(backend: Backend, adapter: Option<Arc<dyn SearchBackend>>) -> Self {
        if let Some(adapter) = &adapter {
            if adapter.backend() != backend {
                tracing::warn!(
                    node = %backend,
                    adapter = %adapter.backend(),
                    "Adapter registered for a different backend"
                );
            }
        }
        Self {
            backend,
            adapter,
            limit: DEFAULT_LIMIT,
            urls: None,
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.max(1);
        self
    }

    pub fn with_urls(mut self, urls: Option<Vec<String>>) -> Self {
        self.urls = urls.filter(|u| !u.is_empty());
        self
    }

    /// Sub-queries aimed at this backend, else every sub-query, else the
    /// user query. Blank texts are dropped.
    fn queries(&self, state: &QueryState) -> Vec<String> {
        let targeted: Vec<&str> = state
            .sub_queries
            .iter()
            .filter(|sq| sq.targets(self.backend))
            .map(|sq| sq.text.as_str())
            .collect();

        let chosen: Vec<&str> = if !targeted.is_empty() {
            targeted
        } else if !state.sub_queries.is_empty() {
            state.sub_queries.iter().map(|sq| sq.text.as_str()).collect()
        } else {
            vec![state.user_query.as_str()]
        };

        chosen
            .into_iter()
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .map(String::from)
            .collect()
    }

    fn request(&self, query: String) -> SearchRequest {
        let request = SearchRequest::new(query).with_limit(self.limit);
        match &self.urls {
            Some(urls) => request.with_urls(urls.clone()),
            None => request,
        }
    }

    fn classify_error(&self, error: anyhow::Error) -> NodeError {
        match error.downcast_ref::<MalformedQuery>() {
            Some(malformed) => NodeError::MalformedQuery(malformed.0.clone()),
            None => NodeError::Backend {
                backend: self.backend,
                source: error,
            },
        }
    }
}

fn failure_kind(error: &NodeError) -> FailureKind {
    match error {
        NodeError::Timeout { .. } => FailureKind::Timeout,
        NodeError::MalformedQuery(_) => FailureKind::MalformedQuery,
        _ => FailureKind::Unavailable,
    }
}

#[async_trait]
impl Node for SearchNode {
    fn id(&self) -> NodeId {
        NodeId::search(self.backend)
    }

    async fn run(&self, state: &mut QueryState) -> Result<(), NodeError> {
        let adapter = self
            .adapter
            .as_ref()
            .ok_or(NodeError::BackendUnavailable { backend: self.backend })?;

        let queries = self.queries(state);
        if queries.is_empty() {
            return Err(NodeError::MalformedQuery("no non-empty query to search".to_string()));
        }

        let requests: Vec<SearchRequest> = queries.into_iter().map(|q| self.request(q)).collect();
        let outcomes = join_all(requests.iter().map(|r| adapter.search(r))).await;

        let mut result_sets = Vec::new();
        let mut errors = Vec::new();
        for (request, outcome) in requests.iter().zip(outcomes) {
            match outcome {
                Ok(results) => result_sets.push(results),
                Err(e) => {
                    tracing::warn!(backend = %self.backend, query = %request.query, error = %e, "Sub-query failed");
                    errors.push(self.classify_error(e));
                }
            }
        }

        // Every request failed: report the first, the hook records it
        if result_sets.is_empty() && !errors.is_empty() {
            return Err(errors.remove(0));
        }

        let cap = self.limit * result_sets.len().max(1);
        let merged = merge_results(result_sets, cap);
        tracing::debug!(
            backend = %self.backend,
            results = merged.len(),
            failed_sub_queries = errors.len(),
            "Search finished"
        );

        let mut entries: Vec<SearchEntry> = merged.into_iter().map(SearchEntry::Result).collect();
        entries.extend(
            errors
                .iter()
                .map(|e| SearchEntry::error(failure_kind(e), e.to_string())),
        );
        state.record_results(self.backend, entries);
        Ok(())
    }

    fn on_failure(&self, state: &mut QueryState, error: &NodeError) {
        tracing::warn!(backend = %self.backend, error = %error, "Search failed");
        state.record_failure(self.backend, failure_kind(error), error.to_string());
    }
}
