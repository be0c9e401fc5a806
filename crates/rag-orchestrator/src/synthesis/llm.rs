//! LLM answer synthesis
//!
//! Asks for `{"answer": "...", "confidence": 0.0-1.0}` and parses the reply
//! leniently: code fences, chatty prefixes and truncated JSON are tolerated,
//! and a plain-text reply is taken as the answer with a neutral confidence.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;

use super::{Synthesis, Synthesizer};
use crate::llm::{estimate_tokens, parse, GenerationConfig, LLMProvider};
use crate::memory::MemoryContext;

/// Confidence assigned to replies that do not state one.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Conversation turns included in the prompt.
const MEMORY_TURNS: usize = 5;

const SYNTHESIS_INSTRUCTIONS: &str = r#"You answer questions using ONLY the retrieved context below. Each context line starts with its source backend and retrieval score.

RULES:
- If the context does not contain the answer, say so plainly and use a low confidence.
- Do not invent facts, numbers or sources.
- Use the conversation history only to resolve references like "it" or "that one".

Respond with ONLY a JSON object: {"answer":"...","confidence":0.0}
confidence is a number between 0 and 1 expressing how well the context supports the answer."#;

pub struct LlmSynthesizer {
    llm: Arc<dyn LLMProvider>,
    generation: GenerationConfig,
}

impl LlmSynthesizer {
    pub fn new(llm: Arc<dyn LLMProvider>, generation: GenerationConfig) -> Self {
        Self { llm, generation }
    }

    fn build_prompt(context: &str, query: &str, memory: &MemoryContext) -> String {
        let mut parts = Vec::with_capacity(4);
        parts.push(SYNTHESIS_INSTRUCTIONS.to_string());

        let history = memory.render(MEMORY_TURNS);
        if !history.is_empty() {
            parts.push(format!("\n{}", history));
        }

        parts.push(format!("\nContext:\n{}", context));
        parts.push(format!("\nQuestion: {}\nJSON:", query));
        parts.join("\n")
    }
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn complete(&self, context: &str, query: &str, memory: &MemoryContext) -> Result<Synthesis> {
        let prompt = Self::build_prompt(context, query, memory);
        tracing::debug!(
            provider = self.llm.name(),
            prompt_tokens = estimate_tokens(&prompt),
            "Synthesizing answer"
        );

        let raw = self.llm.generate(&prompt, &self.generation).await?;
        parse_synthesis(&raw)
    }
}

#[derive(Deserialize)]
struct RawSynthesis {
    answer: String,
    #[serde(default)]
    confidence: Option<f32>,
}

pub fn parse_synthesis(raw: &str) -> Result<Synthesis> {
    let cleaned = parse::strip_code_fences(raw);
    if cleaned.is_empty() {
        return Err(anyhow!("LLM returned an empty answer"));
    }

    let json = parse::json_object_span(cleaned);
    if let Ok(parsed) = serde_json::from_str::<RawSynthesis>(json) {
        return non_empty(parsed.answer, parsed.confidence.unwrap_or(DEFAULT_CONFIDENCE));
    }

    if let Some(answer) = parse::extract_json_string(json, "answer") {
        let confidence = parse::extract_json_number(json, "confidence")
            .map(|c| c as f32)
            .unwrap_or(DEFAULT_CONFIDENCE);
        return non_empty(answer, confidence);
    }

    // Looks like JSON but no answer field survived
    if cleaned.starts_with('{') {
        return Err(anyhow!("LLM reply has no answer field"));
    }

    non_empty(cleaned.to_string(), DEFAULT_CONFIDENCE)
}

fn non_empty(answer: String, confidence: f32) -> Result<Synthesis> {
    let answer = answer.trim();
    if answer.is_empty() {
        return Err(anyhow!("LLM returned an empty answer"));
    }
    Ok(Synthesis::new(answer, confidence))
}
