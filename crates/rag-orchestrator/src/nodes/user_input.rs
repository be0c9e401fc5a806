use async_trait::async_trait;

use crate::error::NodeError;
use crate::graph::{Node, NodeId};
use crate::state::QueryState;

/// Entry point. Leaves the state untouched.
#[derive(Debug, Default)]
pub struct UserInputNode;

#[async_trait]
impl Node for UserInputNode {
    fn id(&self) -> NodeId {
        NodeId::UserInput
    }

    async fn run(&self, state: &mut QueryState) -> Result<(), NodeError> {
        tracing::info!(
            user_id = %state.user_id,
            session_id = %state.session_id,
            query = %state.user_query,
            "Received query"
        );
        Ok(())
    }
}
