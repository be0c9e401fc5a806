use async_trait::async_trait;
use std::sync::Arc;

use crate::error::NodeError;
use crate::graph::{Node, NodeId};
use crate::state::QueryState;
use crate::understanding::{dedupe_intents, dedupe_sub_queries, IntentClassifier};

/// Classifies the query once. Search nodes loop back here, so a state whose
/// `user_query` was already classified passes through unchanged.
pub struct QueryUnderstandingNode {
    classifier: Arc<dyn IntentClassifier>,
}

impl QueryUnderstandingNode {
    pub fn new(classifier: Arc<dyn IntentClassifier>) -> Self {
        Self { classifier }
    }
}

#[async_trait]
impl Node for QueryUnderstandingNode {
    fn id(&self) -> NodeId {
        NodeId::QueryUnderstanding
    }

    async fn run(&self, state: &mut QueryState) -> Result<(), NodeError> {
        if state.classified_query.as_deref() == Some(state.user_query.as_str()) {
            tracing::debug!(
                pending = state.search_results.len(),
                "Query already classified, routing on"
            );
            return Ok(());
        }

        let result = self.classifier.classify(&state.user_query).await;
        state.classified_query = Some(state.user_query.clone());

        match result {
            Ok(classification) => {
                state.intent = dedupe_intents(classification.intents);
                state.sub_queries = dedupe_sub_queries(classification.sub_queries);
                tracing::info!(
                    classifier = self.classifier.name(),
                    intents = ?state.intent,
                    sub_queries = state.sub_queries.len(),
                    "Query classified"
                );
                Ok(())
            }
            Err(e) => {
                state.intent.clear();
                state.sub_queries.clear();
                Err(NodeError::Classification(e))
            }
        }
    }

    /// Failed or timed-out classification leaves no intent, so the router
    /// takes its default route, and is not retried on re-entry.
    fn on_failure(&self, state: &mut QueryState, error: &NodeError) {
        tracing::warn!(query = %state.user_query, error = %error, "Classification failed, using default route");
        state.intent.clear();
        state.sub_queries.clear();
        state.classified_query = Some(state.user_query.clone());
    }
}
