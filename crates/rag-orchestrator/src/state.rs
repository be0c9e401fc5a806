//! Query state threaded through the orchestration graph.
//!
//! One `QueryState` is created per user query, owned by the executor and
//! handed to each node as `&mut QueryState`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::memory::MemoryContext;

// ---------------------------------------------------------------------------
// Intents and backends
// ---------------------------------------------------------------------------

/// Classified category of a user request.
///
/// Serialized as the plain tag string (`"sql_query"`, `"document_search"`, ...).
/// Tags outside the known vocabulary are kept as `Other` and route to the
/// default backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Intent {
    SqlQuery,
    DocumentSearch,
    ExcelData,
    DataverseQuery,
    Other(String),
}

impl Intent {
    /// Known intents in routing check order.
    pub const ROUTING_ORDER: [Intent; 4] = [
        Intent::SqlQuery,
        Intent::DocumentSearch,
        Intent::ExcelData,
        Intent::DataverseQuery,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            Intent::SqlQuery => "sql_query",
            Intent::DocumentSearch => "document_search",
            Intent::ExcelData => "excel_data",
            Intent::DataverseQuery => "dataverse_query",
            Intent::Other(tag) => tag,
        }
    }

    /// Backend serving this intent, `None` for unknown tags.
    pub fn backend(&self) -> Option<Backend> {
        match self {
            Intent::SqlQuery => Some(Backend::Sql),
            Intent::DocumentSearch => Some(Backend::Vector),
            Intent::ExcelData => Some(Backend::Excel),
            Intent::DataverseQuery => Some(Backend::Dataverse),
            Intent::Other(_) => None,
        }
    }
}

impl From<String> for Intent {
    fn from(tag: String) -> Self {
        match tag.trim().to_lowercase().as_str() {
            "sql_query" => Intent::SqlQuery,
            "document_search" => Intent::DocumentSearch,
            "excel_data" => Intent::ExcelData,
            "dataverse_query" => Intent::DataverseQuery,
            _ => Intent::Other(tag),
        }
    }
}

impl From<&str> for Intent {
    fn from(tag: &str) -> Self {
        Intent::from(tag.to_string())
    }
}

impl From<Intent> for String {
    fn from(intent: Intent) -> Self {
        intent.as_str().to_string()
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retrieval source. Variants are declared in name order so that iterating a
/// `BTreeMap<Backend, _>` visits backends alphabetically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Dataverse,
    Excel,
    Sql,
    Vector,
}

impl Backend {
    pub const ALL: [Backend; 4] = [
        Backend::Dataverse,
        Backend::Excel,
        Backend::Sql,
        Backend::Vector,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Dataverse => "dataverse",
            Backend::Excel => "excel",
            Backend::Sql => "sql",
            Backend::Vector => "vector",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Search records
// ---------------------------------------------------------------------------

/// One hit returned by a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Vec<String>>,
    pub score: f32,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}

impl SearchResult {
    pub fn new(content: impl Into<String>, score: f32) -> Self {
        Self {
            content: content.into(),
            url: None,
            score,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// No adapter configured or the adapter returned an error.
    Unavailable,
    /// The node did not finish within its time budget.
    Timeout,
    /// The sub-query could not be turned into a backend request.
    MalformedQuery,
}

/// Failure recorded in place of results under a backend's key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Entry stored under a backend key in `QueryState::search_results`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SearchEntry {
    Result(SearchResult),
    Error(SearchFailure),
}

impl SearchEntry {
    pub fn error(kind: FailureKind, message: impl Into<String>) -> Self {
        SearchEntry::Error(SearchFailure {
            kind,
            message: message.into(),
        })
    }

    pub fn as_result(&self) -> Option<&SearchResult> {
        match self {
            SearchEntry::Result(result) => Some(result),
            SearchEntry::Error(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, SearchEntry::Error(_))
    }
}

/// A decomposed sub-question and the intents it carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubQuery {
    pub text: String,
    #[serde(default)]
    pub intents: Vec<Intent>,
}

impl SubQuery {
    pub fn new(text: impl Into<String>, intents: Vec<Intent>) -> Self {
        Self {
            text: text.into(),
            intents,
        }
    }

    /// True when the sub-query names no intent or one served by `backend`.
    pub fn targets(&self, backend: Backend) -> bool {
        self.intents.is_empty() || self.intents.iter().any(|i| i.backend() == Some(backend))
    }
}

// ---------------------------------------------------------------------------
// Query state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryState {
    pub user_query: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub session_id: String,
    #[serde(default)]
    pub intent: Vec<Intent>,
    #[serde(default)]
    pub sub_queries: Vec<SubQuery>,
    #[serde(default)]
    pub search_results: BTreeMap<Backend, Vec<SearchEntry>>,
    #[serde(default)]
    pub aggregated_context: String,
    #[serde(default)]
    pub final_answer: String,
    #[serde(default)]
    pub confidence_score: f32,
    #[serde(default)]
    pub memory_context: MemoryContext,
    /// Query text that `query_understanding` last classified. Re-entry with
    /// the same `user_query` is a no-op.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub classified_query: Option<String>,
}

impl QueryState {
    pub fn new(
        user_query: impl Into<String>,
        user_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            user_query: user_query.into(),
            user_id: user_id.into(),
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    /// Append entries under `backend`, leaving every other key untouched.
    pub fn record_results(&mut self, backend: Backend, entries: Vec<SearchEntry>) {
        self.search_results.entry(backend).or_default().extend(entries);
    }

    pub fn record_failure(&mut self, backend: Backend, kind: FailureKind, message: impl Into<String>) {
        self.search_results
            .entry(backend)
            .or_default()
            .push(SearchEntry::error(kind, message));
    }

    pub fn has_entry_for(&self, backend: Backend) -> bool {
        self.search_results.contains_key(&backend)
    }

    /// Successful results across all backends, in backend-name order.
    pub fn results(&self) -> impl Iterator<Item = (Backend, &SearchResult)> {
        self.search_results
            .iter()
            .flat_map(|(backend, entries)| {
                entries
                    .iter()
                    .filter_map(move |e| e.as_result().map(|r| (*backend, r)))
            })
    }

    pub fn has_usable_results(&self) -> bool {
        self.results().any(|(_, r)| !r.content.trim().is_empty())
    }
}
