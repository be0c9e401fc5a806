//! Query-routing workflow graph for multi-source retrieval-augmented
//! generation: classify a question, search the backends its intents imply,
//! synthesise one answer and remember the exchange.

pub mod backends;
pub mod config;
pub mod context;
pub mod error;
pub mod graph;
pub mod llm;
pub mod memory;
pub mod nodes;
pub mod orchestrator;
pub mod router;
pub mod state;
pub mod synthesis;
pub mod understanding;

#[cfg(test)]
mod testing;

pub use backends::{SearchBackend, SearchRequest};
pub use config::OrchestratorConfig;
pub use error::{GraphError, NodeError};
pub use graph::{CancellationFlag, ExecutionReport, ExecutionStatus, GraphBuilder, NodeId, Target};
pub use llm::{GenerationConfig, LLMConfig, LLMProvider};
pub use memory::{ConversationMemory, MemoryContext, MemoryManager};
pub use orchestrator::{QueryOrchestrator, QueryOrchestratorBuilder};
pub use state::{Backend, Intent, QueryState, SearchEntry, SearchResult, SubQuery};
pub use synthesis::{Synthesis, Synthesizer};
pub use understanding::{Classification, IntentClassifier};

pub use anyhow::{Error, Result};
pub use uuid::Uuid;
