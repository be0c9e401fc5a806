//! Answers with the best-scored context line. No LLM involved.

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use super::{Synthesis, Synthesizer};
use crate::context::parse_line;
use crate::memory::MemoryContext;

/// Confidence for context lines that carry no score.
const UNSCORED_CONFIDENCE: f32 = 0.5;

#[derive(Debug, Clone, Default)]
pub struct ExtractiveSynthesizer;

impl ExtractiveSynthesizer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Synthesizer for ExtractiveSynthesizer {
    async fn complete(&self, context: &str, _query: &str, _memory: &MemoryContext) -> Result<Synthesis> {
        let mut best: Option<(&str, f32)> = None;
        let mut first_unscored: Option<&str> = None;

        for line in context.lines().map(str::trim).filter(|l| !l.is_empty()) {
            match parse_line(line) {
                Some(parsed) => {
                    // First line wins ties
                    if best.map_or(true, |(_, score)| parsed.score > score) {
                        best = Some((parsed.content, parsed.score));
                    }
                }
                None => {
                    first_unscored.get_or_insert(line);
                }
            }
        }

        match (best, first_unscored) {
            (Some((content, score)), _) => Ok(Synthesis::new(content, score)),
            (None, Some(line)) => Ok(Synthesis::new(line, UNSCORED_CONFIDENCE)),
            (None, None) => Err(anyhow!("no context to extract an answer from")),
        }
    }
}
