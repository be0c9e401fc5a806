//! In-process fakes for the orchestrator's collaborators.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

use crate::backends::{SearchBackend, SearchRequest, SqlExecutor};
use crate::backends::sql::SqlRow;
use crate::llm::{GenerationConfig, LLMProvider};
use crate::memory::{MemoryContext, MemoryManager};
use crate::state::{Backend, Intent, SearchResult};
use crate::understanding::{Classification, IntentClassifier};

/// LLM replaying canned replies in order; the last one repeats.
pub struct ScriptedLlm {
    replies: Mutex<VecDeque<Result<String, String>>>,
    prompts: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedLlm {
    pub fn new(replies: Vec<Result<&str, &str>>) -> Self {
        Self {
            replies: Mutex::new(
                replies
                    .into_iter()
                    .map(|r| r.map(str::to_string).map_err(str::to_string))
                    .collect(),
            ),
            prompts: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn single(reply: Result<&str, &str>) -> Self {
        Self::new(vec![reply])
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LLMProvider for ScriptedLlm {
    async fn generate(&self, prompt: &str, _config: &GenerationConfig) -> Result<String> {
        self.prompts.lock().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let reply = {
            let mut replies = self.replies.lock();
            if replies.len() > 1 {
                replies.pop_front()
            } else {
                replies.front().cloned()
            }
        };
        match reply {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no scripted reply")),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Backend returning fixed results and recording requests.
pub struct FakeBackend {
    backend: Backend,
    results: Vec<SearchResult>,
    requests: Mutex<Vec<SearchRequest>>,
    delay: Option<Duration>,
}

impl FakeBackend {
    pub fn new(backend: Backend, results: Vec<SearchResult>) -> Self {
        Self {
            backend,
            results,
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl SearchBackend for FakeBackend {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchResult>> {
        self.requests.lock().push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.results.iter().take(request.limit).cloned().collect())
    }
}

pub struct FailingBackend {
    backend: Backend,
    message: String,
}

impl FailingBackend {
    pub fn new(backend: Backend, message: impl Into<String>) -> Self {
        Self {
            backend,
            message: message.into(),
        }
    }
}

#[async_trait]
impl SearchBackend for FailingBackend {
    fn backend(&self) -> Backend {
        self.backend
    }

    async fn search(&self, _request: &SearchRequest) -> Result<Vec<SearchResult>> {
        Err(anyhow!(self.message.clone()))
    }
}

pub struct StaticSqlExecutor {
    schema: String,
    rows: Vec<SqlRow>,
    executed: Mutex<Vec<String>>,
}

impl StaticSqlExecutor {
    pub fn new(schema: impl Into<String>, rows: Vec<SqlRow>) -> Self {
        Self {
            schema: schema.into(),
            rows,
            executed: Mutex::new(Vec::new()),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().clone()
    }
}

#[async_trait]
impl SqlExecutor for StaticSqlExecutor {
    async fn schema(&self) -> Result<String> {
        Ok(self.schema.clone())
    }

    async fn execute(&self, sql: &str) -> Result<Vec<SqlRow>> {
        self.executed.lock().push(sql.to_string());
        Ok(self.rows.clone())
    }
}

/// One recorded `update_memory` call.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryUpdate {
    pub user_id: String,
    pub session_id: String,
    pub query: String,
    pub response: String,
}

/// Memory manager returning a fixed context and recording updates.
#[derive(Default)]
pub struct RecordingMemory {
    context: MemoryContext,
    fail_updates: bool,
    lookups: Mutex<usize>,
    updates: Mutex<Vec<MemoryUpdate>>,
}

impl RecordingMemory {
    pub fn new(context: MemoryContext) -> Self {
        Self {
            context,
            ..Default::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_updates: true,
            ..Default::default()
        }
    }

    pub fn lookups(&self) -> usize {
        *self.lookups.lock()
    }

    pub fn updates(&self) -> Vec<MemoryUpdate> {
        self.updates.lock().clone()
    }
}

#[async_trait]
impl MemoryManager for RecordingMemory {
    async fn get_context(&self, _user_id: &str, _session_id: &str) -> Result<MemoryContext> {
        *self.lookups.lock() += 1;
        Ok(self.context.clone())
    }

    async fn update_memory(
        &self,
        user_id: &str,
        session_id: &str,
        query: &str,
        response: &str,
    ) -> Result<()> {
        if self.fail_updates {
            return Err(anyhow!("memory store offline"));
        }
        self.updates.lock().push(MemoryUpdate {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            query: query.to_string(),
            response: response.to_string(),
        });
        Ok(())
    }
}

/// Classifier returning the same intents for every query.
pub struct FixedClassifier {
    intents: Vec<Intent>,
}

impl FixedClassifier {
    pub fn new(intents: Vec<Intent>) -> Self {
        Self { intents }
    }
}

#[async_trait]
impl IntentClassifier for FixedClassifier {
    async fn classify(&self, _query: &str) -> Result<Classification> {
        Ok(Classification {
            intents: self.intents.clone(),
            sub_queries: Vec::new(),
        })
    }

    fn name(&self) -> &str {
        "fixed"
    }
}
