//! Microsoft Dataverse backend (Web API / OData v4).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

use super::{query_terms, SearchBackend, SearchRequest};
use crate::state::{Backend, SearchResult};

/// Max query terms turned into `contains(...)` clauses.
const MAX_FILTER_TERMS: usize = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataverseConfig {
    /// e.g. `https://org.crm.dynamics.com/api/data/v9.2`
    pub base_url: String,
    /// Entity set name, e.g. `accounts`.
    pub entity_set: String,
    /// Columns requested with `$select`; empty means all.
    #[serde(default)]
    pub select: Vec<String>,
    /// Column matched with `contains()`.
    pub search_field: String,
    /// Environment variable holding the bearer token.
    #[serde(default = "default_token_env")]
    pub token_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_token_env() -> String {
    "DATAVERSE_TOKEN".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

pub struct DataverseSearch {
    config: DataverseConfig,
    token: Option<String>,
    client: Client,
}

impl DataverseSearch {
    pub fn new(config: DataverseConfig, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            config,
            token,
            client,
        })
    }

    pub fn from_env(config: DataverseConfig) -> Result<Self> {
        let token = std::env::var(&config.token_env).ok().filter(|t| !t.is_empty());
        if token.is_none() {
            tracing::warn!(var = %config.token_env, "No Dataverse token in environment");
        }
        Self::new(config, token)
    }

    fn entity_url(&self) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            self.config.entity_set
        )
    }

    /// OData query options for `request`.
    fn query_options(&self, request: &SearchRequest) -> Vec<(&'static str, String)> {
        let mut options = Vec::new();
        if !self.config.select.is_empty() {
            options.push(("$select", self.config.select.join(",")));
        }
        if let Some(filter) = contains_filter(&self.config.search_field, &request.query) {
            options.push(("$filter", filter));
        }
        options.push(("$top", request.limit.to_string()));
        options
    }
}

/// `contains(field,'a') or contains(field,'b')` over the query's content words.
fn contains_filter(field: &str, query: &str) -> Option<String> {
    let clauses: Vec<String> = query_terms(query)
        .into_iter()
        .take(MAX_FILTER_TERMS)
        .map(|term| format!("contains({},'{}')", field, term.replace('\'', "''")))
        .collect();
    if clauses.is_empty() {
        None
    } else {
        Some(clauses.join(" or "))
    }
}

fn record_to_text(record: &Map<String, Value>) -> String {
    record
        .iter()
        .filter(|(key, value)| !key.contains('@') && !value.is_null())
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}: {}", key, s),
            other => format!("{}: {}", key, other),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Deserialize)]
struct ODataCollection {
    #[serde(default)]
    value: Vec<Map<String, Value>>,
}

#[async_trait]
impl SearchBackend for DataverseSearch {
    fn backend(&self) -> Backend {
        Backend::Dataverse
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        let url = self.entity_url();
        let mut builder = self
            .client
            .get(&url)
            .query(&self.query_options(request))
            .header("Accept", "application/json")
            .header("OData-MaxVersion", "4.0")
            .header("OData-Version", "4.0");
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .with_context(|| format!("Dataverse request to {} failed", url))?;
        let status = response.status();
        let body = response.text().await.context("Failed to read Dataverse response")?;
        if !status.is_success() {
            let preview: String = body.chars().take(300).collect();
            return Err(anyhow!("Dataverse error ({}): {}", status, preview));
        }

        let collection: ODataCollection =
            serde_json::from_str(&body).context("Dataverse returned invalid JSON")?;

        Ok(collection
            .value
            .iter()
            .take(request.limit)
            .enumerate()
            .map(|(rank, record)| {
                // Server order is the only relevance signal
                let score = 1.0 / (1.0 + rank as f32 * 0.1);
                SearchResult::new(record_to_text(record), score)
                    .with_metadata("entity_set", self.config.entity_set.clone())
            })
            .filter(|r| !r.content.is_empty())
            .collect())
    }
}
