//! Answer synthesis adapters.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::memory::MemoryContext;

pub mod extractive;
pub mod llm;

pub use extractive::ExtractiveSynthesizer;
pub use llm::LlmSynthesizer;

/// Answer used when no backend returned usable content.
pub const INSUFFICIENT_INFORMATION_ANSWER: &str =
    "I don't have enough information in the available sources to answer that question.";

/// Answer used when the synthesizer fails or times out.
pub const FALLBACK_ANSWER: &str =
    "Sorry, I couldn't generate an answer right now. Please try again in a moment.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Synthesis {
    pub answer: String,
    pub confidence: f32,
}

impl Synthesis {
    /// Confidence clamped to [0, 1]; NaN becomes 0.
    pub fn new(answer: impl Into<String>, confidence: f32) -> Self {
        Self {
            answer: answer.into(),
            confidence: clamp_confidence(confidence),
        }
    }
}

pub fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Answer `query` from `context`, optionally informed by conversation memory.
    async fn complete(&self, context: &str, query: &str, memory: &MemoryContext) -> Result<Synthesis>;
}
