use async_trait::async_trait;
use std::sync::Arc;

use crate::error::NodeError;
use crate::graph::{Node, NodeId};
use crate::memory::MemoryManager;
use crate::state::QueryState;

/// Terminal step: stores the exchange. Failures are only logged.
pub struct MemoryUpdateNode {
    memory: Option<Arc<dyn MemoryManager>>,
}

impl MemoryUpdateNode {
    pub fn new(memory: Option<Arc<dyn MemoryManager>>) -> Self {
        Self { memory }
    }
}

#[async_trait]
impl Node for MemoryUpdateNode {
    fn id(&self) -> NodeId {
        NodeId::MemoryUpdate
    }

    async fn run(&self, state: &mut QueryState) -> Result<(), NodeError> {
        let Some(memory) = &self.memory else {
            tracing::debug!("No memory manager configured, skipping update");
            return Ok(());
        };

        memory
            .update_memory(
                &state.user_id,
                &state.session_id,
                &state.user_query,
                &state.final_answer,
            )
            .await
            .map_err(NodeError::Memory)
    }
}
