//! Query decomposition
//!
//! Splits multi-part questions into independent sub-questions so that each
//! part can be classified and sent to the backend that serves it. Handles
//! enumerations, several question marks, comparatives and conjunctions.

use std::collections::HashSet;
use std::sync::LazyLock;

static ENUMERATED_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?:^|\s)(?:\d+[.)]|[-•])\s+").expect("enumerated regex is valid")
});

static QUESTION_MARK_SPLIT_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"\?\s+").expect("question mark split regex is valid"));

static COMPARATIVE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(?:compare|difference between|versus|vs\.?|differ from)\b")
        .expect("comparative regex is valid")
});

static BETWEEN_ENTITIES_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)between\s+(.+?)\s+and\s+(.+?)(?:\s*\?|$)")
        .expect("between entities regex is valid")
});

static CONJUNCTION_SPLIT_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\s*(?:,\s*)?\b(?:and also|and then|and|additionally|as well as)\b\s*")
        .expect("conjunction regex is valid")
});

/// Phrases where "and" joins a single concept.
const NON_SPLIT_PHRASES: &[&str] = &[
    "pros and cons",
    "advantages and disadvantages",
    "strengths and weaknesses",
    "name and address",
    "profit and loss",
    "terms and conditions",
    "research and development",
    "trial and error",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompositionStrategy {
    /// Query was not decomposed (single intent)
    Single,
    /// Enumerated items ("1. X 2. Y")
    Enumerated,
    /// Several questions ("X? Y?")
    MultiQuestion,
    /// Comparative query split into per-entity lookups plus the original
    Comparative,
    /// Split on conjunctions ("X and what is Y")
    Conjunction,
}

#[derive(Debug, Clone)]
pub struct Decomposition {
    pub parts: Vec<String>,
    pub strategy: DecompositionStrategy,
}

/// Decompose `query` into at most `max_parts` sub-questions.
///
/// Always returns at least one part for a non-blank query; the parts are
/// unique (case-insensitive) and in the order they appear in the query.
pub fn decompose(query: &str, max_parts: usize) -> Decomposition {
    let query = query.trim();
    if query.is_empty() {
        return Decomposition {
            parts: Vec::new(),
            strategy: DecompositionStrategy::Single,
        };
    }

    let (parts, strategy) = split(query);
    let mut parts = dedupe(parts);
    parts.truncate(max_parts.max(1));
    if parts.is_empty() {
        parts.push(query.to_string());
    }

    Decomposition { parts, strategy }
}

fn split(query: &str) -> (Vec<String>, DecompositionStrategy) {
    // Short queries are never decomposed
    if query.split_whitespace().count() < 5 {
        return (vec![query.to_string()], DecompositionStrategy::Single);
    }

    let enumerated = split_enumerated(query);
    if enumerated.len() >= 2 {
        return (enumerated, DecompositionStrategy::Enumerated);
    }

    let questions = split_questions(query);
    if questions.len() >= 2 {
        return (questions, DecompositionStrategy::MultiQuestion);
    }

    if let Some(parts) = split_comparative(query) {
        return (parts, DecompositionStrategy::Comparative);
    }

    if let Some(parts) = split_conjunction(query) {
        return (parts, DecompositionStrategy::Conjunction);
    }

    (vec![query.to_string()], DecompositionStrategy::Single)
}

fn split_enumerated(query: &str) -> Vec<String> {
    if ENUMERATED_RE.find_iter(query).count() < 2 {
        return Vec::new();
    }
    ENUMERATED_RE
        .split(query)
        .map(str::trim)
        .filter(|s| s.split_whitespace().count() >= 2)
        .map(String::from)
        .collect()
}

fn split_questions(query: &str) -> Vec<String> {
    QUESTION_MARK_SPLIT_RE
        .split(query)
        .map(str::trim)
        .filter(|s| s.split_whitespace().count() >= 2)
        .map(|s| {
            if s.ends_with('?') {
                s.to_string()
            } else {
                format!("{}?", s)
            }
        })
        .collect()
}

fn split_comparative(query: &str) -> Option<Vec<String>> {
    if !COMPARATIVE_RE.is_match(query) {
        return None;
    }

    let cap = BETWEEN_ENTITIES_RE.captures(query)?;
    let entity_a = cap.get(1)?.as_str().trim();
    let entity_b = cap.get(2)?.as_str().trim().trim_end_matches('?');

    if entity_a.split_whitespace().count() > 5 || entity_b.split_whitespace().count() > 5 {
        return None;
    }

    Some(vec![
        format!("what is {}", entity_a),
        format!("what is {}", entity_b),
        // Keep original for direct comparison matches
        query.to_string(),
    ])
}

fn split_conjunction(query: &str) -> Option<Vec<String>> {
    let lower = query.to_lowercase();
    if NON_SPLIT_PHRASES.iter().any(|p| lower.contains(p)) {
        return None;
    }

    // Each part must have enough substance to be a standalone query
    let parts: Vec<String> = CONJUNCTION_SPLIT_RE
        .split(query)
        .map(|p| p.trim().trim_end_matches(',').trim().to_string())
        .collect();

    if parts.len() < 2 || parts.iter().any(|p| p.split_whitespace().count() < 3) {
        return None;
    }
    Some(parts)
}

fn dedupe(parts: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    parts
        .into_iter()
        .filter(|p| seen.insert(normalize(p)))
        .collect()
}

/// Lowercased, whitespace-collapsed form used for de-duplication.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_query_not_decomposed() {
        let d = decompose("PAN number", 4);
        assert_eq!(d.strategy, DecompositionStrategy::Single);
        assert_eq!(d.parts, vec!["PAN number".to_string()]);
    }

    #[test]
    fn test_blank_query_has_no_parts() {
        assert!(decompose("   ", 4).parts.is_empty());
    }

    #[test]
    fn test_multi_question() {
        let d = decompose("What is the PAN number? What is the monthly salary?", 4);
        assert_eq!(d.strategy, DecompositionStrategy::MultiQuestion);
        assert_eq!(d.parts.len(), 2);
        assert!(d.parts[0].contains("PAN"));
        assert!(d.parts[1].ends_with("salary?"));
    }

    #[test]
    fn test_enumerated() {
        let d = decompose(
            "1. What is the account number 2. What is the IFSC code 3. What is the balance",
            4,
        );
        assert_eq!(d.strategy, DecompositionStrategy::Enumerated);
        assert_eq!(d.parts.len(), 3);
        assert_eq!(d.parts[2], "What is the balance");
    }

    #[test]
    fn test_comparative() {
        let d = decompose("what is the difference between savings account and fixed deposit", 4);
        assert_eq!(d.strategy, DecompositionStrategy::Comparative);
        assert_eq!(d.parts[0], "what is savings account");
        assert_eq!(d.parts[1], "what is fixed deposit");
        assert_eq!(d.parts.len(), 3);
    }

    #[test]
    fn test_conjunction() {
        let d = decompose("show total sales per region and list the open support tickets", 4);
        assert_eq!(d.strategy, DecompositionStrategy::Conjunction);
        assert_eq!(
            d.parts,
            vec![
                "show total sales per region".to_string(),
                "list the open support tickets".to_string()
            ]
        );
    }

    #[test]
    fn test_pros_and_cons_not_split() {
        let d = decompose("what are the pros and cons of this approach", 4);
        assert_eq!(d.strategy, DecompositionStrategy::Single);
    }

    #[test]
    fn test_duplicate_parts_collapse() {
        let d = decompose("What is the refund policy? what is the  refund policy?", 4);
        assert_eq!(d.parts.len(), 1);
    }

    #[test]
    fn test_parts_are_capped() {
        let d = decompose("1. alpha beta 2. gamma delta 3. epsilon zeta", 2);
        assert_eq!(d.parts.len(), 2);
    }

    #[test]
    fn test_decompose_is_deterministic() {
        let q = "What were the Q3 sales figures and what does the travel policy say?";
        assert_eq!(decompose(q, 4).parts, decompose(q, 4).parts);
    }
}
