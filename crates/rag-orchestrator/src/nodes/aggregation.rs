use async_trait::async_trait;

use crate::context::render_context;
use crate::error::NodeError;
use crate::graph::{Node, NodeId};
use crate::state::QueryState;

/// Merges every backend's results into `aggregated_context`.
pub struct AggregationNode {
    max_chars: usize,
}

impl AggregationNode {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }
}

#[async_trait]
impl Node for AggregationNode {
    fn id(&self) -> NodeId {
        NodeId::Aggregation
    }

    async fn run(&self, state: &mut QueryState) -> Result<(), NodeError> {
        state.aggregated_context = render_context(state, self.max_chars);

        let failed: Vec<String> = state
            .search_results
            .iter()
            .filter(|(_, entries)| entries.iter().any(|e| e.is_error()))
            .map(|(backend, _)| backend.to_string())
            .collect();
        tracing::debug!(
            backends = state.search_results.len(),
            results = state.results().count(),
            failed = ?failed,
            context_chars = state.aggregated_context.len(),
            "Aggregated search results"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{Backend, FailureKind, SearchEntry, SearchResult};

    #[tokio::test]
    async fn test_context_follows_backend_order_and_skips_errors() {
        let mut state = QueryState::new("q", "u", "s");
        state.record_results(
            Backend::Vector,
            vec![SearchEntry::Result(SearchResult::new("doc passage", 0.7))],
        );
        state.record_failure(Backend::Excel, FailureKind::Unavailable, "no workbook");
        state.record_results(
            Backend::Dataverse,
            vec![SearchEntry::Result(SearchResult::new("name: Contoso", 1.0))],
        );

        AggregationNode::new(1000).run(&mut state).await.unwrap();

        assert_eq!(
            state.aggregated_context,
            "[dataverse score=1.00] name: Contoso\n[vector score=0.70] doc passage"
        );
    }

    #[tokio::test]
    async fn test_no_results_gives_empty_context() {
        let mut state = QueryState::new("q", "u", "s");
        state.record_results(Backend::Vector, vec![]);
        AggregationNode::new(1000).run(&mut state).await.unwrap();
        assert!(state.aggregated_context.is_empty());
    }
}
