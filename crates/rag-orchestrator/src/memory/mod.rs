//! Conversational memory for the orchestrator
//!
//! Short-term memory holds the turns of the current session; long-term memory
//! holds per-user session summaries. Both expire after a configurable TTL.
//! The in-process `ConversationMemory` optionally persists to a JSON file.

pub mod types;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

pub use types::*;

/// Memory collaborator consumed by synthesis and memory_update.
#[async_trait]
pub trait MemoryManager: Send + Sync {
    async fn get_context(&self, user_id: &str, session_id: &str) -> Result<MemoryContext>;

    async fn update_memory(
        &self,
        user_id: &str,
        session_id: &str,
        query: &str,
        response: &str,
    ) -> Result<()>;
}

/// Largest TTL accepted by configuration validation (about 100 years).
pub const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 3600;

/// Oldest timestamp still alive under `ttl_secs`. `None` when the TTL
/// reaches past the representable range, meaning nothing expires.
fn ttl_cutoff(now: DateTime<Utc>, ttl_secs: u64) -> Option<DateTime<Utc>> {
    let ttl = i64::try_from(ttl_secs).ok().and_then(TimeDelta::try_seconds)?;
    now.checked_sub_signed(ttl)
}

fn is_alive(timestamp: &DateTime<Utc>, cutoff: Option<DateTime<Utc>>) -> bool {
    cutoff.map_or(true, |c| *timestamp >= c)
}

/// Configuration for the memory system
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Directory for `memory.json`; `None` keeps everything in process.
    pub storage_path: Option<PathBuf>,
    pub ttl_short_term_secs: u64,
    pub ttl_long_term_secs: u64,
    /// Turns returned as short-term context.
    pub short_term_window: usize,
    /// Long-term records aggregated into the context.
    pub long_term_window: usize,
    /// Roll the session into long-term memory every N turns.
    pub summary_every: usize,
    pub max_topics: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            storage_path: None,
            ttl_short_term_secs: 3600,
            ttl_long_term_secs: 2_592_000,
            short_term_window: 10,
            long_term_window: 5,
            summary_every: 5,
            max_topics: 5,
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct MemoryStore {
    short_term: Vec<MemoryTurn>,
    long_term: Vec<LongTermRecord>,
    /// user_id -> preference key -> value
    preferences: HashMap<String, HashMap<String, String>>,
}

/// In-process memory manager
pub struct ConversationMemory {
    config: MemoryConfig,
    store: RwLock<MemoryStore>,
}

impl ConversationMemory {
    pub fn new(config: MemoryConfig) -> Result<Self> {
        if let Some(path) = &config.storage_path {
            std::fs::create_dir_all(path)
                .with_context(|| format!("Failed to create memory dir {}", path.display()))?;
        }

        let memory = Self {
            config,
            store: RwLock::new(MemoryStore::default()),
        };
        memory.load_from_disk();
        Ok(memory)
    }

    pub fn in_memory() -> Self {
        Self::ephemeral(MemoryConfig::default())
    }

    /// Same limits as `config`, never touches disk.
    pub fn ephemeral(config: MemoryConfig) -> Self {
        Self {
            config: MemoryConfig {
                storage_path: None,
                ..config
            },
            store: RwLock::new(MemoryStore::default()),
        }
    }

    pub fn set_preference(&self, user_id: &str, key: impl Into<String>, value: impl Into<String>) {
        self.store
            .write()
            .preferences
            .entry(user_id.to_string())
            .or_default()
            .insert(key.into(), value.into());
        self.persist();
    }

    /// Drop expired short- and long-term entries. Returns how many were removed.
    pub fn prune_expired(&self) -> usize {
        let removed = self.prune_store(&mut self.store.write());
        if removed > 0 {
            self.persist();
        }
        removed
    }

    fn prune_store(&self, store: &mut MemoryStore) -> usize {
        let now = Utc::now();
        let short_cutoff = ttl_cutoff(now, self.config.ttl_short_term_secs);
        let long_cutoff = ttl_cutoff(now, self.config.ttl_long_term_secs);

        let before = store.short_term.len() + store.long_term.len();
        store.short_term.retain(|t| is_alive(&t.timestamp, short_cutoff));
        store.long_term.retain(|r| is_alive(&r.timestamp, long_cutoff));
        let removed = before - (store.short_term.len() + store.long_term.len());
        if removed > 0 {
            tracing::debug!(removed, "Pruned expired memories");
        }
        removed
    }

    fn short_term_for(&self, store: &MemoryStore, session_id: &str) -> Vec<MemoryTurn> {
        let cutoff = ttl_cutoff(Utc::now(), self.config.ttl_short_term_secs);
        let mut turns: Vec<MemoryTurn> = store
            .short_term
            .iter()
            .filter(|t| t.session_id == session_id && is_alive(&t.timestamp, cutoff))
            .cloned()
            .collect();
        turns.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        turns
    }

    fn long_term_for(&self, store: &MemoryStore, user_id: &str) -> LongTermMemory {
        let cutoff = ttl_cutoff(Utc::now(), self.config.ttl_long_term_secs);
        let mut records: Vec<&LongTermRecord> = store
            .long_term
            .iter()
            .filter(|r| r.user_id == user_id && is_alive(&r.timestamp, cutoff))
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(self.config.long_term_window);

        let mut topics: Vec<String> = Vec::new();
        for record in &records {
            for topic in &record.topics {
                if !topics.contains(topic) {
                    topics.push(topic.clone());
                }
            }
        }

        LongTermMemory {
            summaries: records.iter().map(|r| r.summary.clone()).collect(),
            topics,
            preferences: store.preferences.get(user_id).cloned().unwrap_or_default(),
        }
    }

    fn persist(&self) {
        let Some(dir) = &self.config.storage_path else {
            return;
        };
        let result = {
            let store = self.store.read();
            serde_json::to_string(&*store)
        };
        match result {
            Ok(json) => {
                if let Err(e) = std::fs::write(dir.join("memory.json"), json) {
                    tracing::warn!("Memory persist failed: {}", e);
                }
            }
            Err(e) => tracing::warn!("Memory serialization failed: {}", e),
        }
    }

    fn load_from_disk(&self) {
        let Some(dir) = &self.config.storage_path else {
            return;
        };
        let path = dir.join("memory.json");
        if !path.exists() {
            return;
        }
        let json = match std::fs::read_to_string(&path) {
            Ok(j) => j,
            Err(e) => {
                tracing::warn!("Failed to read memory.json, starting fresh: {}", e);
                return;
            }
        };
        match serde_json::from_str::<MemoryStore>(&json) {
            Ok(data) => *self.store.write() = data,
            Err(e) => tracing::warn!("Corrupt memory.json, starting fresh: {}", e),
        }
    }
}

#[async_trait]
impl MemoryManager for ConversationMemory {
    async fn get_context(&self, user_id: &str, session_id: &str) -> Result<MemoryContext> {
        let store = self.store.read();
        let mut short_term = self.short_term_for(&store, session_id);
        let long_term = self.long_term_for(&store, user_id);
        drop(store);

        let recent_topics = extract_topics(
            short_term.iter().map(|t| t.query.as_str()),
            self.config.max_topics,
        );
        short_term.truncate(self.config.short_term_window);

        Ok(MemoryContext {
            short_term,
            user_preferences: long_term.preferences.clone(),
            long_term,
            recent_topics,
        })
    }

    async fn update_memory(
        &self,
        user_id: &str,
        session_id: &str,
        query: &str,
        response: &str,
    ) -> Result<()> {
        let mut store = self.store.write();
        self.prune_store(&mut store);
        store.short_term.push(MemoryTurn {
            user_id: user_id.to_string(),
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            query: query.to_string(),
            response: response.to_string(),
        });

        let session = self.short_term_for(&store, session_id);
        let every = self.config.summary_every.max(1);
        if !session.is_empty() && session.len() % every == 0 {
            let summary = summarize_session(&session);
            let topics = extract_topics(session.iter().map(|t| t.query.as_str()), self.config.max_topics);
            tracing::debug!(user_id, session_id, turns = session.len(), "Rolling session into long-term memory");
            store.long_term.push(LongTermRecord {
                user_id: user_id.to_string(),
                session_id: session_id.to_string(),
                timestamp: Utc::now(),
                summary,
                topics,
            });
        }
        drop(store);

        self.persist();
        Ok(())
    }
}

pub(crate) const STOPWORDS: &[&str] = &[
    "about", "after", "also", "been", "before", "could", "does", "from", "have", "many",
    "much", "should", "show", "tell", "than", "that", "their", "them", "there", "these",
    "they", "this", "what", "when", "where", "which", "while", "with", "would", "your",
];

/// Most frequent content words across `texts`, ties broken by first appearance.
pub fn extract_topics<'a>(texts: impl Iterator<Item = &'a str>, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
    let mut position = 0usize;

    for text in texts {
        for raw in text.split(|c: char| !c.is_alphanumeric()) {
            let word = raw.to_lowercase();
            if word.len() <= 3 || STOPWORDS.contains(&word.as_str()) || word.chars().all(|c| c.is_numeric()) {
                continue;
            }
            let entry = counts.entry(word).or_insert((0, position));
            entry.0 += 1;
            position += 1;
        }
    }

    let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
    ranked.into_iter().take(limit).map(|(w, _)| w).collect()
}

/// Extractive summary of a session (turns newest first).
fn summarize_session(turns: &[MemoryTurn]) -> String {
    let questions: Vec<&str> = turns.iter().rev().map(|t| t.query.trim()).collect();
    let mut summary = format!("Asked about: {}", questions.join("; "));
    if summary.chars().count() > 500 {
        summary = summary.chars().take(497).collect::<String>() + "...";
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_short_term_is_scoped_to_session() {
        let memory = ConversationMemory::in_memory();
        memory.update_memory("u1", "s1", "what is the refund policy", "30 days").await.unwrap();
        memory.update_memory("u1", "s2", "unrelated", "x").await.unwrap();

        let ctx = memory.get_context("u1", "s1").await.unwrap();
        assert_eq!(ctx.short_term.len(), 1);
        assert_eq!(ctx.short_term[0].query, "what is the refund policy");
        assert!(ctx.recent_topics.contains(&"refund".to_string()));
    }

    #[tokio::test]
    async fn test_short_term_window_keeps_newest() {
        let config = MemoryConfig {
            short_term_window: 2,
            summary_every: 100,
            ..Default::default()
        };
        let memory = ConversationMemory::new(config).unwrap();
        for i in 0..4 {
            memory.update_memory("u", "s", &format!("question {}", i), "a").await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let ctx = memory.get_context("u", "s").await.unwrap();
        assert_eq!(ctx.short_term.len(), 2);
        assert_eq!(ctx.short_term[0].query, "question 3");
    }

    #[tokio::test]
    async fn test_session_rolls_into_long_term() {
        let config = MemoryConfig {
            summary_every: 2,
            ..Default::default()
        };
        let memory = ConversationMemory::new(config).unwrap();
        memory.update_memory("u", "s", "quarterly revenue figures", "a").await.unwrap();
        memory.update_memory("u", "s", "revenue by region", "b").await.unwrap();

        let ctx = memory.get_context("u", "other-session").await.unwrap();
        assert!(ctx.short_term.is_empty());
        assert_eq!(ctx.long_term.summaries.len(), 1);
        assert!(ctx.long_term.summaries[0].contains("quarterly revenue figures"));
        assert_eq!(ctx.long_term.topics.first().map(String::as_str), Some("revenue"));
    }

    #[tokio::test]
    async fn test_preferences_surface_in_context() {
        let memory = ConversationMemory::in_memory();
        memory.set_preference("u", "language", "fr");

        let ctx = memory.get_context("u", "s").await.unwrap();
        assert_eq!(ctx.user_preferences.get("language").map(String::as_str), Some("fr"));
        assert_eq!(ctx.long_term.preferences.get("language").map(String::as_str), Some("fr"));
    }

    #[tokio::test]
    async fn test_expired_turns_are_hidden_and_pruned() {
        let config = MemoryConfig {
            ttl_short_term_secs: 0,
            summary_every: 100,
            ..Default::default()
        };
        let memory = ConversationMemory::new(config).unwrap();
        memory.update_memory("u", "s", "old question", "a").await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;

        let ctx = memory.get_context("u", "s").await.unwrap();
        assert!(ctx.short_term.is_empty());
        assert_eq!(memory.prune_expired(), 1);
    }

    #[tokio::test]
    async fn test_updates_drop_expired_entries() {
        let config = MemoryConfig {
            ttl_short_term_secs: 0,
            ttl_long_term_secs: 0,
            summary_every: 1,
            ..Default::default()
        };
        let memory = ConversationMemory::new(config).unwrap();
        for i in 0..20 {
            memory.update_memory("u", "s", &format!("question {}", i), "a").await.unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let store = memory.store.read();
        assert!(store.short_term.len() <= 1);
        assert!(store.long_term.len() <= 1);
    }

    #[tokio::test]
    async fn test_huge_ttl_never_expires() {
        let config = MemoryConfig {
            ttl_short_term_secs: u64::MAX,
            ttl_long_term_secs: 10_000_000_000_000,
            summary_every: 1,
            ..Default::default()
        };
        let memory = ConversationMemory::new(config).unwrap();
        memory.update_memory("u", "s", "where is the office", "Paris").await.unwrap();

        let ctx = memory.get_context("u", "s").await.unwrap();
        assert_eq!(ctx.short_term.len(), 1);
        assert_eq!(ctx.long_term.summaries.len(), 1);
        assert_eq!(memory.prune_expired(), 0);
    }

    #[test]
    fn test_ttl_cutoff_overflow_means_no_cutoff() {
        let now = Utc::now();
        assert!(ttl_cutoff(now, u64::MAX).is_none());
        assert!(ttl_cutoff(now, 10_000_000_000_000).is_none());
        assert_eq!(ttl_cutoff(now, 60), Some(now - TimeDelta::seconds(60)));
    }

    #[tokio::test]
    async fn test_memory_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let config = MemoryConfig {
            storage_path: Some(dir.path().to_path_buf()),
            ..Default::default()
        };

        let memory = ConversationMemory::new(config.clone()).unwrap();
        memory.update_memory("u", "s", "where is the office", "Paris").await.unwrap();
        drop(memory);

        let reloaded = ConversationMemory::new(config).unwrap();
        let ctx = reloaded.get_context("u", "s").await.unwrap();
        assert_eq!(ctx.short_term.len(), 1);
        assert_eq!(ctx.short_term[0].response, "Paris");
    }

    #[test]
    fn test_extract_topics_ranks_by_frequency() {
        let texts = ["invoice totals for march", "march invoice status", "invoice owner"];
        let topics = extract_topics(texts.iter().copied(), 2);
        assert_eq!(topics, vec!["invoice".to_string(), "march".to_string()]);
    }
}
