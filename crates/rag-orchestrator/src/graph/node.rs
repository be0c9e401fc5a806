//! Graph node trait: one step in the orchestration graph.

use async_trait::async_trait;

use crate::error::NodeError;
use crate::state::QueryState;

use super::NodeId;

/// One step: mutates the state in place.
///
/// Returning `Err` (or exceeding the node's time budget) does not stop the
/// graph. The executor hands the error to `on_failure`, records it in the
/// step trace and follows the node's outgoing edge as usual.
#[async_trait]
pub trait Node: Send + Sync {
    fn id(&self) -> NodeId;

    async fn run(&self, state: &mut QueryState) -> Result<(), NodeError>;

    /// Record a failure in the state. The default only logs.
    fn on_failure(&self, state: &mut QueryState, error: &NodeError) {
        tracing::warn!(node = %self.id(), query = %state.user_query, error = %error, "Node failed");
    }
}
