//! Query understanding: intent classification and sub-query decomposition.
//!
//! `RuleBasedClassifier` is deterministic and needs no collaborators;
//! `LlmIntentClassifier` asks an LLM and falls back to the rules on any error.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::state::{Intent, SubQuery};

pub mod decomposer;
pub mod llm;
pub mod rules;

pub use decomposer::{decompose, Decomposition, DecompositionStrategy};
pub use llm::LlmIntentClassifier;
pub use rules::RuleBasedClassifier;

/// Output of an intent classifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub intents: Vec<Intent>,
    #[serde(default)]
    pub sub_queries: Vec<SubQuery>,
}

#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, query: &str) -> Result<Classification>;

    fn name(&self) -> &str;
}

/// Drop sub-queries whose normalised text was already seen, and blank ones.
pub fn dedupe_sub_queries(sub_queries: Vec<SubQuery>) -> Vec<SubQuery> {
    let mut seen = HashSet::new();
    sub_queries
        .into_iter()
        .filter(|sq| {
            let key = decomposer::normalize(&sq.text);
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

/// Drop repeated intents, keeping first occurrence order.
pub fn dedupe_intents(intents: Vec<Intent>) -> Vec<Intent> {
    let mut unique: Vec<Intent> = Vec::with_capacity(intents.len());
    for intent in intents {
        if !unique.contains(&intent) {
            unique.push(intent);
        }
    }
    unique
}
