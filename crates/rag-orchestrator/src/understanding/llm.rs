//! LLM-backed intent classification
//!
//! One LLM call returns both the intent tags and the decomposed sub-queries.
//! Any failure (transport, empty reply, unparseable JSON) falls back to the
//! rule-based classifier so query understanding never blocks the graph.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{dedupe_intents, dedupe_sub_queries, Classification, IntentClassifier, RuleBasedClassifier};
use crate::llm::{parse, GenerationConfig, LLMProvider};
use crate::state::{Intent, SubQuery};

const CLASSIFIER_PROMPT: &str = r#"You are a query classifier for a retrieval system. Given a user question, output a JSON object with exactly these fields:

{"intents":["..."],"sub_queries":[{"text":"...","intents":["..."]}]}

INTENTS (use only these tags):
- "sql_query": aggregates, counts, totals or lookups over structured business tables.
- "document_search": facts, explanations or passages found in documents and knowledge bases.
- "excel_data": values held in spreadsheets or workbooks.
- "dataverse_query": CRM entities such as accounts, contacts, leads or opportunities.

RULES:
- List every intent that applies, most specific first.
- sub_queries: split multi-part questions into standalone questions, each with its own intents. A single question yields one sub-query equal to the question.
- Use at most MAX_SUB_QUERIES sub_queries.

Output ONLY the JSON object, nothing else."#;

pub struct LlmIntentClassifier {
    llm: Arc<dyn LLMProvider>,
    fallback: RuleBasedClassifier,
    generation: GenerationConfig,
}

impl LlmIntentClassifier {
    pub fn new(llm: Arc<dyn LLMProvider>, fallback: RuleBasedClassifier) -> Self {
        Self {
            llm,
            fallback,
            generation: GenerationConfig {
                temperature: 0.0,
                ..GenerationConfig::default()
            }
            .with_max_tokens(300),
        }
    }

    fn build_prompt(&self, query: &str) -> String {
        format!(
            "{}\n\nUser question: \"{}\"\nJSON:",
            CLASSIFIER_PROMPT.replace(
                "MAX_SUB_QUERIES",
                &self.fallback.max_sub_queries().to_string()
            ),
            query
        )
    }

    async fn classify_with_llm(&self, query: &str) -> Result<Classification> {
        let prompt = self.build_prompt(query);
        let raw = self.llm.generate(&prompt, &self.generation).await?;
        if raw.trim().is_empty() {
            return Err(anyhow!("classifier returned an empty response"));
        }

        let parsed = parse_classification(&raw)?;

        let mut sub_queries: Vec<SubQuery> = parsed
            .sub_queries
            .into_iter()
            .map(|sq| match sq {
                RawSubQuery::Text(text) => {
                    let intents = self.fallback.detect(&text);
                    SubQuery::new(text, intents)
                }
                RawSubQuery::Tagged { text, intents } => SubQuery::new(
                    text,
                    dedupe_intents(intents.into_iter().map(Intent::from).collect()),
                ),
            })
            .collect();
        sub_queries = dedupe_sub_queries(sub_queries);
        sub_queries.truncate(self.fallback.max_sub_queries());

        if sub_queries.is_empty() {
            sub_queries = self.fallback.classify_now(query).sub_queries;
        }

        Ok(Classification {
            intents: dedupe_intents(parsed.intents.into_iter().map(Intent::from).collect()),
            sub_queries,
        })
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, query: &str) -> Result<Classification> {
        if query.trim().is_empty() {
            return Ok(Classification::default());
        }

        match self.classify_with_llm(query).await {
            Ok(classification) => {
                tracing::debug!(
                    provider = self.llm.name(),
                    intents = ?classification.intents,
                    sub_queries = classification.sub_queries.len(),
                    "LLM classification"
                );
                Ok(classification)
            }
            Err(e) => {
                tracing::warn!(error = %e, "LLM classification failed, using keyword rules");
                self.fallback.classify(query).await
            }
        }
    }

    fn name(&self) -> &str {
        "llm"
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSubQuery {
    Text(String),
    Tagged {
        text: String,
        #[serde(default)]
        intents: Vec<String>,
    },
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default)]
    intents: Vec<String>,
    #[serde(default)]
    sub_queries: Vec<RawSubQuery>,
}

/// Strict JSON first, then a field scan for truncated or chatty replies.
fn parse_classification(raw: &str) -> Result<RawClassification> {
    let json = parse::json_object_span(raw);

    if let Ok(parsed) = serde_json::from_str::<RawClassification>(json) {
        return Ok(parsed);
    }

    let intents = parse::extract_json_array(json, "intents")
        .ok_or_else(|| anyhow!("no intents field in classifier response"))?;

    Ok(RawClassification {
        intents,
        sub_queries: Vec::new(),
    })
}
