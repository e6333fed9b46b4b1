//! Chat provider abstraction.
//!
//! The simulator talks to exactly one external chat API. Everything above this
//! module sees a `ChatProvider` that takes a `ChatRequest` and returns either a
//! `ChatCompletion` or a categorised `UpstreamError`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::config::StageModel;
use crate::error::{UpstreamError, UpstreamResult};

pub mod structured;
pub mod xai;

#[cfg(test)]
pub(crate) mod scripted;

pub use structured::{parse_structured, Validate};
pub use xai::XaiProvider;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }
}

/// JSON Schema the provider must constrain its answer to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: JsonValue,
}

impl ResponseSchema {
    pub fn new(name: impl Into<String>, schema: JsonValue) -> Self {
        Self { name: name.into(), schema }
    }
}

/// Search capability attached to a chat call, scoped to a date range.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchTool {
    pub from_date: NaiveDate,
    pub to_date: NaiveDate,
    pub enable_image_understanding: bool,
    pub enable_video_understanding: bool,
}

impl SearchTool {
    /// Search over the last `days` days with media understanding enabled.
    pub fn recent(days: i64) -> Self {
        let to_date = Utc::now().date_naive();
        let from_date = to_date - chrono::Duration::days(days);
        Self {
            from_date,
            to_date,
            enable_image_understanding: true,
            enable_video_understanding: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub response_format: Option<ResponseSchema>,
    pub search: Option<SearchTool>,
    pub timeout: Duration,
}

impl ChatRequest {
    pub fn new(model: impl Into<String>, timeout: Duration) -> Self {
        Self {
            model: model.into(),
            messages: Vec::new(),
            response_format: None,
            search: None,
            timeout,
        }
    }

    pub fn for_stage(stage: &StageModel) -> Self {
        Self::new(stage.model.clone(), stage.timeout())
    }

    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::system(content));
        self
    }

    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    pub fn with_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_format = Some(schema);
        self
    }

    pub fn with_search(mut self, search: SearchTool) -> Self {
        self.search = Some(search);
        self
    }
}

/// Token counters reported by the provider. Missing counters read as zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    pub completion_tokens: u64,
    pub reasoning_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub content: String,
    pub usage: TokenUsage,
}

/// Core trait for chat providers
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Run one chat completion.
    async fn complete(&self, request: ChatRequest) -> UpstreamResult<ChatCompletion>;

    /// Provider name for logs.
    fn name(&self) -> &str;
}

/// Run `request` against `provider`, bounded by the request's own timeout.
pub async fn bounded(
    provider: &dyn ChatProvider,
    request: ChatRequest,
) -> UpstreamResult<ChatCompletion> {
    let budget = request.timeout;
    let model = request.model.clone();
    let start = std::time::Instant::now();

    let result = match tokio::time::timeout(budget, provider.complete(request)).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamError::Timeout(budget)),
    };

    if let Ok(completion) = &result {
        tracing::debug!(
            provider = provider.name(),
            model = %model,
            elapsed_ms = start.elapsed().as_millis() as u64,
            total_tokens = completion.usage.total_tokens,
            "Provider call completed"
        );
    }
    result
}

/// At most `max_chars` characters of `text`, cut on a char boundary.
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
