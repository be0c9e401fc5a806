//! Type definitions for conversational memory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One question/answer exchange inside a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryTurn {
    pub user_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub query: String,
    pub response: String,
}

impl MemoryTurn {
    pub fn new(
        user_id: impl Into<String>,
        session_id: impl Into<String>,
        query: impl Into<String>,
        response: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            session_id: session_id.into(),
            timestamp: Utc::now(),
            query: query.into(),
            response: response.into(),
        }
    }
}

/// Session summary rolled into a user's long-term memory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongTermRecord {
    pub user_id: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
    pub topics: Vec<String>,
}

/// Aggregated view over a user's recent long-term records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LongTermMemory {
    /// Newest first.
    pub summaries: Vec<String>,
    pub topics: Vec<String>,
    pub preferences: HashMap<String, String>,
}

impl LongTermMemory {
    pub fn is_empty(&self) -> bool {
        self.summaries.is_empty() && self.topics.is_empty() && self.preferences.is_empty()
    }
}

/// Snapshot handed to synthesis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryContext {
    /// Current session, newest first.
    #[serde(default)]
    pub short_term: Vec<MemoryTurn>,
    #[serde(default)]
    pub long_term: LongTermMemory,
    #[serde(default)]
    pub user_preferences: HashMap<String, String>,
    #[serde(default)]
    pub recent_topics: Vec<String>,
}

impl MemoryContext {
    pub fn is_empty(&self) -> bool {
        self.short_term.is_empty()
            && self.long_term.is_empty()
            && self.user_preferences.is_empty()
            && self.recent_topics.is_empty()
    }

    /// Compact prompt section, empty when there is nothing to tell.
    pub fn render(&self, max_turns: usize) -> String {
        let mut parts = Vec::new();

        if !self.short_term.is_empty() {
            let turns: Vec<String> = self
                .short_term
                .iter()
                .take(max_turns)
                .rev()
                .map(|t| format!("user: {}\nassistant: {}", t.query, t.response))
                .collect();
            parts.push(format!("Recent conversation:\n{}", turns.join("\n")));
        }

        if !self.long_term.summaries.is_empty() {
            parts.push(format!(
                "Earlier sessions:\n- {}",
                self.long_term.summaries.join("\n- ")
            ));
        }

        if !self.recent_topics.is_empty() {
            parts.push(format!("Recent topics: {}", self.recent_topics.join(", ")));
        }

        if !self.user_preferences.is_empty() {
            let mut prefs: Vec<String> = self
                .user_preferences
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            prefs.sort();
            parts.push(format!("User preferences: {}", prefs.join(", ")));
        }

        parts.join("\n\n")
    }
}
