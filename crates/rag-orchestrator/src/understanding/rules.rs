//! Keyword-driven intent detection.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::LazyLock;

use super::{decompose, dedupe_sub_queries, Classification, IntentClassifier};
use crate::state::{Intent, SubQuery};

static SQL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)\b(?:sql|database|table|rows?|records?|how many|count|total|sum|average|avg|revenue|sales|orders?|invoices?|customers?|top \d+|per (?:month|year|quarter|region))\b",
    )
    .expect("sql intent regex is valid")
});

static DOCUMENT_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)\b(?:documents?|docs?|pdf|policy|policies|handbook|manual|guide|procedure|contract|article|explain|describe|summari[sz]e|according to)\b",
    )
    .expect("document intent regex is valid")
});

static EXCEL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"(?i)\b(?:excel|spreadsheets?|workbooks?|worksheets?|xlsx?|csv|sheets?|cells?|columns?)\b")
        .expect("excel intent regex is valid")
});

static DATAVERSE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)\b(?:dataverse|dynamics(?: 365)?|crm|leads?|opportunit(?:y|ies)|contacts?|accounts? manager|power apps)\b",
    )
    .expect("dataverse intent regex is valid")
});

/// Default cap on sub-queries per query.
pub const DEFAULT_MAX_SUB_QUERIES: usize = 4;

#[derive(Debug, Clone)]
pub struct RuleBasedClassifier {
    max_sub_queries: usize,
}

impl Default for RuleBasedClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SUB_QUERIES)
    }
}

impl RuleBasedClassifier {
    pub fn new(max_sub_queries: usize) -> Self {
        Self {
            max_sub_queries: max_sub_queries.max(1),
        }
    }

    /// Intents detected in `text`, in routing check order.
    ///
    /// A non-blank text with no keyword hit is a document search; a blank
    /// text has no intent.
    pub fn detect(&self, text: &str) -> Vec<Intent> {
        if text.trim().is_empty() {
            return Vec::new();
        }

        let checks: [(&LazyLock<regex::Regex>, Intent); 4] = [
            (&SQL_RE, Intent::SqlQuery),
            (&DOCUMENT_RE, Intent::DocumentSearch),
            (&EXCEL_RE, Intent::ExcelData),
            (&DATAVERSE_RE, Intent::DataverseQuery),
        ];

        let intents: Vec<Intent> = checks
            .into_iter()
            .filter(|(re, _)| re.is_match(text))
            .map(|(_, intent)| intent)
            .collect();

        if intents.is_empty() {
            vec![Intent::DocumentSearch]
        } else {
            intents
        }
    }

    /// Full classification without going through the async trait.
    pub fn classify_now(&self, query: &str) -> Classification {
        let query = query.trim();
        if query.is_empty() {
            return Classification::default();
        }

        let decomposition = decompose(query, self.max_sub_queries);
        let sub_queries: Vec<SubQuery> = decomposition
            .parts
            .into_iter()
            .map(|part| {
                let intents = self.detect(&part);
                SubQuery::new(part, intents)
            })
            .collect();

        Classification {
            intents: self.detect(query),
            sub_queries: dedupe_sub_queries(sub_queries),
        }
    }

    pub fn max_sub_queries(&self) -> usize {
        self.max_sub_queries
    }
}

#[async_trait]
impl IntentClassifier for RuleBasedClassifier {
    async fn classify(&self, query: &str) -> Result<Classification> {
        Ok(self.classify_now(query))
    }

    fn name(&self) -> &str {
        "rules"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_question_is_document_search() {
        let rules = RuleBasedClassifier::default();
        assert_eq!(
            rules.detect("What is the capital of France?"),
            vec![Intent::DocumentSearch]
        );
    }

    #[test]
    fn test_blank_query_has_no_intent() {
        let rules = RuleBasedClassifier::default();
        assert!(rules.detect("   ").is_empty());
        assert_eq!(rules.classify_now(""), Classification::default());
    }

    #[test]
    fn test_intents_follow_check_order() {
        let rules = RuleBasedClassifier::default();
        let intents = rules.detect("Compare the spreadsheet total with the travel policy document");
        assert_eq!(
            intents,
            vec![Intent::SqlQuery, Intent::DocumentSearch, Intent::ExcelData]
        );
    }

    #[test]
    fn test_dataverse_keywords() {
        let rules = RuleBasedClassifier::default();
        assert_eq!(
            rules.detect("list open opportunities in Dynamics"),
            vec![Intent::DataverseQuery]
        );
    }

    #[tokio::test]
    async fn test_sub_queries_carry_their_own_intents() {
        let rules = RuleBasedClassifier::default();
        let c = rules
            .classify("How many orders shipped last month? What does the returns policy say?")
            .await
            .unwrap();
        assert_eq!(c.sub_queries.len(), 2);
        assert_eq!(c.sub_queries[0].intents, vec![Intent::SqlQuery]);
        assert_eq!(c.sub_queries[1].intents, vec![Intent::DocumentSearch]);
        assert_eq!(c.intents, vec![Intent::SqlQuery, Intent::DocumentSearch]);
    }

    #[tokio::test]
    async fn test_classification_is_deterministic() {
        let rules = RuleBasedClassifier::default();
        let q = "total revenue per region and summarize the onboarding handbook";
        assert_eq!(rules.classify(q).await.unwrap(), rules.classify(q).await.unwrap());
    }
}
