// [[RARO]]/apps/telemetry-server/src/tasks/enrich.rs
// Purpose: Optional LLM-generated task descriptions.
// Architecture: Task Engine / External Collaborator
// Dependencies: reqwest, async-trait, dashmap

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::json;

use crate::config::EnrichmentConfig;
use crate::error::EnrichError;

/// Replies outside 1..100 characters are discarded.
pub const MAX_DESCRIPTION_CHARS: usize = 100;

#[async_trait]
pub trait DescriptionEnricher: Send + Sync {
    /// Produce a short description for a task from a sample of its output.
    async fn describe(&self, task_id: &str, sample: &str) -> Result<String, EnrichError>;
}

pub struct AnthropicEnricher {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

#[derive(Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Deserialize)]
struct ResponseBlock {
    text: Option<String>,
}

impl AnthropicEnricher {
    /// `None` when no API key is configured.
    pub fn from_config(config: &EnrichmentConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            client: reqwest::Client::new(),
            api_key,
            model: config.model.clone(),
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl DescriptionEnricher for AnthropicEnricher {
    async fn describe(&self, task_id: &str, sample: &str) -> Result<String, EnrichError> {
        if self.api_key.is_empty() {
            return Err(EnrichError::MissingCredentials);
        }

        let prompt = format!(
            "Based on this command output, give a 2-5 word description of what this background task is doing. \
             Be specific and concise. Just respond with the description, nothing else.\n\nOutput:\n{}",
            sample
        );
        let body = json!({
            "model": self.model,
            "max_tokens": 50,
            "messages": [{ "role": "user", "content": prompt }],
        });

        tracing::debug!("Requesting description for task {}", task_id);
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(EnrichError::Status(response.status().as_u16()));
        }

        let reply: MessagesResponse = response.json().await?;
        reply
            .content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .and_then(|text| accept_description(&text))
            .ok_or(EnrichError::Unusable)
    }
}

/// Trimmed reply if it has a usable length.
pub fn accept_description(reply: &str) -> Option<String> {
    let trimmed = reply.trim();
    let len = trimmed.chars().count();
    if len > 0 && len < MAX_DESCRIPTION_CHARS {
        Some(trimmed.to_string())
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
enum EnrichState {
    Pending,
    Described(String),
    Unavailable,
}

/// Per-task enrichment bookkeeping. A task gets at most one request for its
/// lifetime; the entry is dropped together with the task.
#[derive(Default)]
pub struct DescriptionCache {
    entries: DashMap<String, EnrichState>,
}

impl DescriptionCache {
    /// Claim the single enrichment slot for a task.
    pub fn try_begin(&self, task_id: &str) -> bool {
        match self.entries.entry(task_id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(EnrichState::Pending);
                true
            }
        }
    }

    /// Record the outcome of a pending request. Returns false when the task
    /// was forgotten while the request was in flight.
    pub fn complete(&self, task_id: &str, description: Option<String>) -> bool {
        match self.entries.get_mut(task_id) {
            Some(mut state) => {
                *state = match description {
                    Some(d) => EnrichState::Described(d),
                    None => EnrichState::Unavailable,
                };
                true
            }
            None => false,
        }
    }

    pub fn get(&self, task_id: &str) -> Option<String> {
        match self.entries.get(task_id)?.value() {
            EnrichState::Described(d) => Some(d.clone()),
            _ => None,
        }
    }

    #[cfg(test)]
    pub fn is_pending(&self, task_id: &str) -> bool {
        matches!(self.entries.get(task_id).as_deref(), Some(EnrichState::Pending))
    }

    pub fn forget(&self, task_id: &str) {
        self.entries.remove(task_id);
    }
}
