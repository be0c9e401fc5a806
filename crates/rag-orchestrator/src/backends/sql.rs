//! Natural-language SQL backend
//!
//! The LLM translates the question into a single read-only SELECT using the
//! schema reported by the executor. Anything else is rejected before it
//! reaches the database.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::{Arc, LazyLock};
use tokio::sync::OnceCell;

use super::{MalformedQuery, SearchBackend, SearchRequest};
use crate::llm::{parse, GenerationConfig, LLMProvider};
use crate::state::{Backend, SearchResult};

static WRITE_KEYWORD_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)\b(?:insert|update|delete|drop|alter|create|truncate|replace|merge|grant|revoke|attach|detach|pragma|vacuum|exec|execute)\b",
    )
    .expect("write keyword regex is valid")
});

pub type SqlRow = Map<String, Value>;

/// Executes SQL against a concrete database.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Human-readable schema description (tables and columns) for prompting.
    async fn schema(&self) -> Result<String>;

    async fn execute(&self, sql: &str) -> Result<Vec<SqlRow>>;
}

pub struct SqlSearch {
    llm: Arc<dyn LLMProvider>,
    executor: Arc<dyn SqlExecutor>,
    generation: GenerationConfig,
    schema: OnceCell<String>,
}

impl SqlSearch {
    pub fn new(llm: Arc<dyn LLMProvider>, executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            llm,
            executor,
            generation: GenerationConfig {
                temperature: 0.0,
                ..GenerationConfig::default()
            }
            .with_max_tokens(400),
            schema: OnceCell::new(),
        }
    }

    async fn schema(&self) -> Result<&str> {
        let schema = self
            .schema
            .get_or_try_init(|| async { self.executor.schema().await })
            .await?;
        Ok(schema.as_str())
    }

    async fn nl_to_sql(&self, question: &str) -> Result<String> {
        let schema = self.schema().await?;
        let prompt = format!(
            "Convert this natural language question to a single SQLite SELECT statement.\n\
             Question: {}\n\n\
             Available schema:\n{}\n\n\
             Return only the SQL query.",
            question, schema
        );
        let raw = self.llm.generate(&prompt, &self.generation).await?;
        Ok(sanitize_sql(&raw))
    }
}

/// Strip code fences, a leading `sql` language tag and trailing semicolons.
pub fn sanitize_sql(raw: &str) -> String {
    let text = parse::strip_code_fences(raw);
    let text = match text.get(..3) {
        Some(tag) if tag.eq_ignore_ascii_case("sql") && text[3..].starts_with(char::is_whitespace) => {
            text[3..].trim_start()
        }
        _ => text,
    };
    text.trim().trim_end_matches(';').trim().to_string()
}

/// Accepts a single SELECT (or WITH ... SELECT) statement with no write keywords.
pub fn ensure_read_only(sql: &str) -> Result<(), MalformedQuery> {
    if sql.is_empty() {
        return Err(MalformedQuery("empty SQL statement".to_string()));
    }
    if sql.contains(';') {
        return Err(MalformedQuery("multiple SQL statements".to_string()));
    }

    let first = sql
        .split_whitespace()
        .next()
        .map(|w| w.to_ascii_lowercase())
        .unwrap_or_default();
    if first != "select" && first != "with" {
        return Err(MalformedQuery(format!("not a SELECT statement: {}", sql)));
    }
    if let Some(m) = WRITE_KEYWORD_RE.find(sql) {
        return Err(MalformedQuery(format!("write keyword '{}' in query", m.as_str())));
    }
    Ok(())
}

fn row_to_text(row: &SqlRow) -> String {
    row.iter()
        .map(|(column, value)| match value {
            Value::String(s) => format!("{}: {}", column, s),
            Value::Null => format!("{}: NULL", column),
            other => format!("{}: {}", column, other),
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

#[async_trait]
impl SearchBackend for SqlSearch {
    fn backend(&self) -> Backend {
        Backend::Sql
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let sql = self.nl_to_sql(&request.query).await?;
        ensure_read_only(&sql)?;
        tracing::debug!(sql = %sql, "Executing generated SQL");

        let rows = self
            .executor
            .execute(&sql)
            .await
            .map_err(|e| anyhow!("SQL execution failed: {}", e))?;

        Ok(rows
            .iter()
            .take(request.limit)
            .enumerate()
            .map(|(i, row)| {
                SearchResult::new(row_to_text(row), 1.0)
                    .with_metadata("sql", sql.clone())
                    .with_metadata("row", i)
                    .with_metadata("columns", Value::Array(row.keys().cloned().map(Value::String).collect()))
            })
            .collect())
    }
}
