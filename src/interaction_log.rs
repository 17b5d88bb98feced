//! Bounded record of generation attempts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

pub const DEFAULT_LOG_CAPACITY: usize = 1000;
pub const PROMPT_EXCERPT_CHARS: usize = 100;
pub const RESPONSE_EXCERPT_CHARS: usize = 200;
pub const ELLIPSIS: &str = "...";

const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractionLogEntry {
    pub id: String,
    pub registry_id: String,
    pub requested_model: String,
    pub prompt_excerpt: String,
    pub response_excerpt: String,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    pub succeeded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl InteractionLogEntry {
    pub fn success(
        registry_id: &str,
        model: &str,
        prompt: &str,
        response: &str,
        latency_ms: u64,
        token_count: Option<u64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            registry_id: registry_id.to_string(),
            requested_model: model.to_string(),
            prompt_excerpt: excerpt(prompt, PROMPT_EXCERPT_CHARS),
            response_excerpt: excerpt(response, RESPONSE_EXCERPT_CHARS),
            latency_ms,
            token_count,
            succeeded: true,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn failure(registry_id: &str, model: &str, prompt: &str, error: &str, latency_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            registry_id: registry_id.to_string(),
            requested_model: model.to_string(),
            prompt_excerpt: excerpt(prompt, PROMPT_EXCERPT_CHARS),
            response_excerpt: String::new(),
            latency_ms,
            token_count: None,
            succeeded: false,
            error_message: Some(error.to_string()),
            created_at: Utc::now(),
        }
    }
}

/// Truncates `text` to `max_chars` characters, appending [`ELLIPSIS`] when
/// anything was cut.
pub fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], ELLIPSIS),
        None => text.to_string(),
    }
}

/// Body of `POST /v1/logs`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLogEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub registry_id: String,
    #[serde(default)]
    pub requested_model: String,
    #[serde(default, alias = "prompt")]
    pub prompt_excerpt: String,
    #[serde(default, alias = "response")]
    pub response_excerpt: String,
    #[serde(default)]
    pub latency_ms: u64,
    #[serde(default)]
    pub token_count: Option<u64>,
    #[serde(default)]
    pub succeeded: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl NewLogEntry {
    fn into_entry(self) -> InteractionLogEntry {
        let error_message = if self.succeeded {
            None
        } else {
            Some(
                self.error_message
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| "unknown error".to_string()),
            )
        };

        InteractionLogEntry {
            id: self
                .id
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| Uuid::new_v4().to_string()),
            registry_id: self.registry_id,
            requested_model: self.requested_model,
            prompt_excerpt: excerpt(&self.prompt_excerpt, PROMPT_EXCERPT_CHARS),
            response_excerpt: excerpt(&self.response_excerpt, RESPONSE_EXCERPT_CHARS),
            latency_ms: self.latency_ms,
            token_count: self.token_count,
            succeeded: self.succeeded,
            error_message,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQuery {
    #[serde(default)]
    pub registry_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub logs: Vec<InteractionLogEntry>,
    pub total: usize,
    pub has_more: bool,
}

#[derive(Clone)]
pub struct InteractionLog {
    entries: Arc<Mutex<VecDeque<InteractionLogEntry>>>,
    capacity: usize,
}

impl Default for InteractionLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}

impl InteractionLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_LOG_CAPACITY)))),
            capacity,
        }
    }

    pub async fn append(&self, entry: InteractionLogEntry) -> InteractionLogEntry {
        let mut entries = self.entries.lock().await;
        entries.push_back(entry.clone());
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        entry
    }

    pub async fn record(&self, new_entry: NewLogEntry) -> InteractionLogEntry {
        self.append(new_entry.into_entry()).await
    }

    /// Newest-first page of entries, optionally filtered by registry id.
    pub async fn query(&self, query: &LogQuery) -> LogPage {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        let offset = query.offset.unwrap_or(0);
        let registry_id = query.registry_id.as_deref().filter(|id| !id.is_empty());

        let entries = self.entries.lock().await;
        let matching: Vec<&InteractionLogEntry> = entries
            .iter()
            .rev()
            .filter(|e| registry_id.is_none_or(|id| e.registry_id == id))
            .collect();

        let total = matching.len();
        let logs: Vec<InteractionLogEntry> = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        let has_more = offset.saturating_add(logs.len()) < total;

        LogPage { logs, total, has_more }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}
