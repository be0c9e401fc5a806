//! External API provider for OpenAI-compatible chat completion endpoints
//! (OpenAI, OpenRouter, Together, Ollama, self-hosted gateways).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::{GenerationConfig, LLMConfig, LLMProvider};

pub struct ExternalProvider {
    endpoint: String,
    api_key: Option<String>,
    model: String,
    client: Client,
}

impl ExternalProvider {
    pub fn new(config: &LLMConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .context("Failed to build HTTP client")?;

        tracing::info!(
            endpoint = %config.endpoint,
            model = %config.model,
            "Creating ExternalProvider"
        );

        Ok(Self {
            endpoint: config.endpoint.clone(),
            api_key,
            model: config.model.clone(),
            client,
        })
    }

    /// Reads the API key from the environment variable named in the config.
    /// A missing key is allowed for local gateways (e.g. Ollama).
    pub fn from_env(config: &LLMConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).ok().filter(|k| !k.is_empty());
        if api_key.is_none() {
            tracing::warn!(var = %config.api_key_env, "No API key in environment, sending unauthenticated requests");
        }
        Self::new(config, api_key)
    }

    /// Parse a response body as JSON, returning a clear error if the server returned HTML
    /// (e.g. a gateway error page) instead of valid JSON.
    fn parse_json_body<T: serde::de::DeserializeOwned>(
        body: &str,
        endpoint: &str,
        status: reqwest::StatusCode,
    ) -> Result<T> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(anyhow!(
                "Endpoint {} returned HTML instead of JSON (HTTP {}): {}",
                endpoint,
                status,
                preview
            ));
        }

        serde_json::from_str::<T>(body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            anyhow!(
                "Failed to parse JSON from {} (HTTP {}): {}. Response body: {}",
                endpoint,
                status,
                e,
                preview
            )
        })
    }
}

#[async_trait]
impl LLMProvider for ExternalProvider {
    async fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        tracing::debug!(
            endpoint = %self.endpoint,
            model = %self.model,
            max_tokens = config.max_tokens,
            prompt_len = prompt.len(),
            "Sending OpenAI-compatible request"
        );

        let mut request = json!({
            "model": self.model,
            "messages": [
                {"role": "user", "content": prompt}
            ],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "top_p": config.top_p,
            "stream": false
        });
        if !config.stop_sequences.is_empty() {
            request["stop"] = json!(config.stop_sequences);
        }

        let mut builder = self.client.post(&self.endpoint).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                tracing::error!(endpoint = %self.endpoint, "Request timed out");
                anyhow!("Request to {} timed out", self.endpoint)
            } else if e.is_connect() {
                tracing::error!(endpoint = %self.endpoint, error = %e, "Connection failed");
                anyhow!("Failed to connect to {}: {}", self.endpoint, e)
            } else {
                anyhow!("Request to {} failed: {}", self.endpoint, e)
            }
        })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .with_context(|| format!("Failed to read response body from {}", self.endpoint))?;

        if !status.is_success() {
            tracing::error!(endpoint = %self.endpoint, status = %status, "API returned error");
            let preview: String = body.chars().take(300).collect();
            return Err(anyhow!("API error ({}): {}", status, preview));
        }

        let result: OpenAIResponse = Self::parse_json_body(&body, &self.endpoint, status)?;
        let content = result.into_content()?;

        tracing::debug!("API response received, {} chars", content.len());
        Ok(content)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[derive(Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
}

impl OpenAIResponse {
    /// Text of the first choice. Servers send `"content": null` for
    /// refusals and tool-only replies.
    fn into_content(self) -> Result<String> {
        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No choices returned from API"))?;
        choice
            .message
            .content
            .ok_or_else(|| anyhow!("API returned an empty completion"))
    }
}

#[derive(Deserialize)]
struct OpenAIMessage {
    #[serde(default)]
    content: Option<String>,
}
