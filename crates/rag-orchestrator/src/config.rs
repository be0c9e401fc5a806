use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backends::DEFAULT_LIMIT;
use crate::context::DEFAULT_MAX_CONTEXT_CHARS;
use crate::graph::{ExecutionLimits, NodeId};
use crate::llm::LLMConfig;
use crate::memory::{MemoryConfig, MAX_TTL_SECS};
use crate::state::Backend;
use crate::understanding::rules::DEFAULT_MAX_SUB_QUERIES;

pub const ENV_LLM_ENDPOINT: &str = "RAG_ORCHESTRATOR_LLM_ENDPOINT";
pub const ENV_LLM_MODEL: &str = "RAG_ORCHESTRATOR_LLM_MODEL";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub data_dir: PathBuf,
    pub graph: GraphConfig,
    pub search: SearchConfig,
    pub aggregation: AggregationConfig,
    pub memory: MemoryConfig,
    pub llm: LLMConfig,
    pub features: FeatureFlags,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub max_steps: usize,
    pub default_timeout_ms: u64,
    /// Per-node overrides, keyed by node name (`sql_search`, `llm_synthesis`...).
    pub node_timeouts_ms: HashMap<NodeId, u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results requested per sub-query.
    pub limit: usize,
    /// Restrict vector search to these source URLs.
    pub urls: Option<Vec<String>>,
    pub max_sub_queries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    /// When off, search results go straight to synthesis.
    pub enabled: bool,
    pub max_context_chars: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureFlags {
    /// Classify with the LLM (rules remain the fallback).
    pub enable_llm_classifier: bool,
    /// Persist conversation memory under `data_dir/memory` unless
    /// `memory.storage_path` is set.
    pub persist_memory: bool,
}

impl OrchestratorConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        let min_steps = self.min_steps();
        if self.graph.max_steps < min_steps {
            return Err(format!("graph.max_steps must be >= {}", min_steps));
        }
        if self.graph.default_timeout_ms == 0 {
            return Err("graph.default_timeout_ms must be > 0".into());
        }
        if let Some((node, _)) = self.graph.node_timeouts_ms.iter().find(|(_, ms)| **ms == 0) {
            return Err(format!("graph.node_timeouts_ms.{} must be > 0", node));
        }
        if self.search.limit == 0 {
            return Err("search.limit must be > 0".into());
        }
        if self.search.max_sub_queries == 0 {
            return Err("search.max_sub_queries must be > 0".into());
        }
        if self.aggregation.max_context_chars < 100 {
            return Err("aggregation.max_context_chars must be >= 100".into());
        }
        if self.memory.short_term_window == 0 {
            return Err("memory.short_term_window must be > 0".into());
        }
        let ttls = [self.memory.ttl_short_term_secs, self.memory.ttl_long_term_secs];
        if ttls.iter().any(|ttl| *ttl > MAX_TTL_SECS) {
            return Err(format!("memory TTLs must be <= {} seconds", MAX_TTL_SECS));
        }
        if self.memory.summary_every == 0 {
            return Err("memory.summary_every must be > 0".into());
        }
        if self.llm.endpoint.trim().is_empty() {
            return Err("llm.endpoint must not be empty".into());
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err("llm.temperature must be in [0.0, 2.0]".into());
        }
        Ok(())
    }

    /// Steps taken by a query that searches every backend: user_input and
    /// understanding, a search plus understanding per backend, then
    /// [aggregation], synthesis and memory_update.
    pub fn min_steps(&self) -> usize {
        let tail = if self.aggregation.enabled { 3 } else { 2 };
        2 + 2 * Backend::ALL.len() + tail
    }

    /// Load config from a JSON file, falling back to defaults for missing fields.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Override LLM endpoint and model from the environment.
    /// The API key itself is read by the provider from `llm.api_key_env`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var(ENV_LLM_ENDPOINT) {
            if !endpoint.trim().is_empty() {
                tracing::info!(endpoint = %endpoint, "LLM endpoint overridden from environment");
                self.llm.endpoint = endpoint;
            }
        }
        if let Ok(model) = std::env::var(ENV_LLM_MODEL) {
            if !model.trim().is_empty() {
                tracing::info!(model = %model, "LLM model overridden from environment");
                self.llm.model = model;
            }
        }
    }

    pub fn limits(&self) -> ExecutionLimits {
        ExecutionLimits {
            max_steps: self.graph.max_steps,
            default_timeout: Duration::from_millis(self.graph.default_timeout_ms),
            node_timeouts: self
                .graph
                .node_timeouts_ms
                .iter()
                .map(|(node, ms)| (*node, Duration::from_millis(*ms)))
                .collect(),
        }
    }

    /// Memory settings with the storage location resolved.
    pub fn memory_config(&self) -> MemoryConfig {
        let mut memory = self.memory.clone();
        if self.features.persist_memory && memory.storage_path.is_none() {
            memory.storage_path = Some(self.data_dir.join("memory"));
        }
        memory
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rag-orchestrator");

        Self {
            data_dir,
            graph: GraphConfig::default(),
            search: SearchConfig::default(),
            aggregation: AggregationConfig::default(),
            memory: MemoryConfig::default(),
            llm: LLMConfig::default(),
            features: FeatureFlags::default(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        let limits = ExecutionLimits::default();
        Self {
            max_steps: limits.max_steps,
            default_timeout_ms: limits.default_timeout.as_millis() as u64,
            node_timeouts_ms: HashMap::new(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            urls: None,
            max_sub_queries: DEFAULT_MAX_SUB_QUERIES,
        }
    }
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_context_chars: DEFAULT_MAX_CONTEXT_CHARS,
        }
    }
}
