use async_trait::async_trait;
use std::sync::Arc;

use crate::context::render_context;
use crate::error::NodeError;
use crate::graph::{Node, NodeId};
use crate::memory::MemoryManager;
use crate::state::QueryState;
use crate::synthesis::{
    clamp_confidence, Synthesizer, FALLBACK_ANSWER, INSUFFICIENT_INFORMATION_ANSWER,
};

pub struct LlmSynthesisNode {
    synthesizer: Arc<dyn Synthesizer>,
    memory: Option<Arc<dyn MemoryManager>>,
    max_context_chars: usize,
}

impl LlmSynthesisNode {
    pub fn new(
        synthesizer: Arc<dyn Synthesizer>,
        memory: Option<Arc<dyn MemoryManager>>,
        max_context_chars: usize,
    ) -> Self {
        Self {
            synthesizer,
            memory,
            max_context_chars,
        }
    }

    async fn load_memory(&self, state: &mut QueryState) {
        if !state.memory_context.is_empty() {
            return;
        }
        let Some(memory) = &self.memory else { return };

        match memory.get_context(&state.user_id, &state.session_id).await {
            Ok(context) => state.memory_context = context,
            Err(e) => tracing::warn!(user_id = %state.user_id, error = %e, "Memory lookup failed, answering without history"),
        }
    }
}

#[async_trait]
impl Node for LlmSynthesisNode {
    fn id(&self) -> NodeId {
        NodeId::LlmSynthesis
    }

    async fn run(&self, state: &mut QueryState) -> Result<(), NodeError> {
        self.load_memory(state).await;

        // Aggregation disabled: render the raw results with the same ordering
        let context = if state.aggregated_context.trim().is_empty() {
            render_context(state, self.max_context_chars)
        } else {
            state.aggregated_context.clone()
        };

        if context.trim().is_empty() {
            tracing::info!(query = %state.user_query, "No usable search results");
            state.final_answer = INSUFFICIENT_INFORMATION_ANSWER.to_string();
            state.confidence_score = 0.0;
            return Ok(());
        }

        let synthesis = self
            .synthesizer
            .complete(&context, &state.user_query, &state.memory_context)
            .await
            .map_err(NodeError::Synthesis)?;

        state.final_answer = synthesis.answer;
        state.confidence_score = clamp_confidence(synthesis.confidence);
        tracing::info!(confidence = state.confidence_score, "Answer synthesized");
        Ok(())
    }

    fn on_failure(&self, state: &mut QueryState, error: &NodeError) {
        tracing::warn!(error = %error, "Synthesis failed, returning fallback answer");
        state.final_answer = FALLBACK_ANSWER.to_string();
        state.confidence_score = 0.0;
    }
}
