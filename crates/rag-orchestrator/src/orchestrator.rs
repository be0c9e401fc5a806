//! Query orchestrator: wires the standard query graph from injected
//! collaborators and runs one graph execution per query.
//!
//! ```text
//! user_input -> query_understanding -?-> {sql,vector,excel,dataverse}_search -> query_understanding
//!                                   \--> aggregation -> llm_synthesis -> memory_update -> END
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::backends::SearchBackend;
use crate::config::OrchestratorConfig;
use crate::error::GraphError;
use crate::graph::{CancellationFlag, CompiledGraph, ExecutionReport, GraphBuilder, NodeId, Target};
use crate::llm::{GenerationConfig, LLMProvider};
use crate::memory::{ConversationMemory, MemoryManager};
use crate::nodes::{
    AggregationNode, LlmSynthesisNode, MemoryUpdateNode, QueryUnderstandingNode, SearchNode,
    UserInputNode,
};
use crate::router::{next_after_understanding, understanding_targets};
use crate::state::{Backend, QueryState};
use crate::synthesis::{ExtractiveSynthesizer, LlmSynthesizer, Synthesizer};
use crate::understanding::{IntentClassifier, LlmIntentClassifier, RuleBasedClassifier};

pub struct QueryOrchestrator {
    graph: CompiledGraph,
    config: OrchestratorConfig,
}

impl QueryOrchestrator {
    pub fn builder() -> QueryOrchestratorBuilder {
        QueryOrchestratorBuilder::default()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn graph(&self) -> &CompiledGraph {
        &self.graph
    }

    /// Answer one query end to end.
    pub async fn answer(
        &self,
        query: &str,
        user_id: &str,
        session_id: &str,
    ) -> Result<ExecutionReport, GraphError> {
        self.run(QueryState::new(query, user_id, session_id), &CancellationFlag::new())
            .await
    }

    pub async fn run(
        &self,
        state: QueryState,
        cancel: &CancellationFlag,
    ) -> Result<ExecutionReport, GraphError> {
        self.graph.run(state, cancel).await
    }
}

/// Collects collaborators; anything not supplied gets a default:
/// keyword rules for classification (or the LLM when enabled and an LLM is
/// set), LLM synthesis when an LLM is set and extractive answers otherwise,
/// and in-process conversation memory.
#[derive(Default)]
pub struct QueryOrchestratorBuilder {
    config: OrchestratorConfig,
    classifier: Option<Arc<dyn IntentClassifier>>,
    backends: BTreeMap<Backend, Arc<dyn SearchBackend>>,
    llm: Option<Arc<dyn LLMProvider>>,
    synthesizer: Option<Arc<dyn Synthesizer>>,
    memory: Option<Arc<dyn MemoryManager>>,
}

impl QueryOrchestratorBuilder {
    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn classifier(mut self, classifier: Arc<dyn IntentClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Register the adapter for its backend. A later adapter for the same
    /// backend replaces the earlier one.
    pub fn backend(mut self, backend: Arc<dyn SearchBackend>) -> Self {
        if let Some(previous) = self.backends.insert(backend.backend(), backend) {
            tracing::warn!(backend = %previous.backend(), "Replacing search backend");
        }
        self
    }

    pub fn llm(mut self, llm: Arc<dyn LLMProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    pub fn memory(mut self, memory: Arc<dyn MemoryManager>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn build(self) -> Result<QueryOrchestrator, GraphError> {
        let config = self.config;
        config.validate().map_err(GraphError::InvalidConfig)?;

        let rules = RuleBasedClassifier::new(config.search.max_sub_queries);
        let classifier: Arc<dyn IntentClassifier> = match (self.classifier, &self.llm) {
            (Some(classifier), _) => classifier,
            (None, Some(llm)) if config.features.enable_llm_classifier => {
                Arc::new(LlmIntentClassifier::new(llm.clone(), rules))
            }
            (None, _) => Arc::new(rules),
        };

        let synthesizer: Arc<dyn Synthesizer> = match (self.synthesizer, &self.llm) {
            (Some(synthesizer), _) => synthesizer,
            (None, Some(llm)) => Arc::new(LlmSynthesizer::new(
                llm.clone(),
                GenerationConfig::from(&config.llm),
            )),
            (None, None) => Arc::new(ExtractiveSynthesizer::new()),
        };

        let memory: Arc<dyn MemoryManager> = match self.memory {
            Some(memory) => memory,
            None => {
                let memory_config = config.memory_config();
                match ConversationMemory::new(memory_config.clone()) {
                    Ok(memory) => Arc::new(memory),
                    Err(e) => {
                        tracing::warn!(error = %e, "Memory storage unavailable, keeping memory in process");
                        Arc::new(ConversationMemory::ephemeral(memory_config))
                    }
                }
            }
        };

        for backend in Backend::ALL {
            if !self.backends.contains_key(&backend) {
                tracing::debug!(backend = %backend, "No adapter registered, searches will record unavailable");
            }
        }

        let aggregation_enabled = config.aggregation.enabled;
        let mut builder = GraphBuilder::new();

        builder
            .add_node(Arc::new(UserInputNode))
            .add_node(Arc::new(QueryUnderstandingNode::new(classifier)))
            .add_node(Arc::new(LlmSynthesisNode::new(
                synthesizer,
                Some(memory.clone()),
                config.aggregation.max_context_chars,
            )))
            .add_node(Arc::new(MemoryUpdateNode::new(Some(memory))));

        for backend in Backend::ALL {
            let mut node = SearchNode::new(backend, self.backends.get(&backend).cloned())
                .with_limit(config.search.limit);
            if backend == Backend::Vector {
                node = node.with_urls(config.search.urls.clone());
            }
            builder
                .add_node(Arc::new(node))
                .add_edge(NodeId::search(backend), NodeId::QueryUnderstanding);
        }

        builder
            .set_entry_point(NodeId::UserInput)
            .add_edge(NodeId::UserInput, NodeId::QueryUnderstanding)
            .add_conditional_edges(
                NodeId::QueryUnderstanding,
                move |state: &QueryState| next_after_understanding(state, aggregation_enabled),
                understanding_targets(aggregation_enabled),
            )
            .add_edge(NodeId::LlmSynthesis, NodeId::MemoryUpdate)
            .add_edge(NodeId::MemoryUpdate, Target::End);

        if aggregation_enabled {
            builder
                .add_node(Arc::new(AggregationNode::new(config.aggregation.max_context_chars)))
                .add_edge(NodeId::Aggregation, NodeId::LlmSynthesis);
        }

        let graph = builder.compile()?.with_limits(config.limits());
        tracing::info!(
            backends = ?self.backends.keys().collect::<Vec<_>>(),
            aggregation = aggregation_enabled,
            max_steps = config.graph.max_steps,
            "Query orchestrator ready"
        );

        Ok(QueryOrchestrator { graph, config })
    }
}
