//! In-memory provider for tests: replays queued responses per stage.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{ChatCompletion, ChatProvider, ChatRequest, TokenUsage};
use crate::error::{UpstreamError, UpstreamResult};

/// Key used for requests that carry no response schema (context gathering).
pub const CONTEXT_KEY: &str = "context";

#[derive(Default)]
pub struct ScriptedProvider {
    queues: Mutex<HashMap<String, VecDeque<UpstreamResult<ChatCompletion>>>>,
    calls: Mutex<Vec<ChatRequest>>,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push(&self, key: &str, result: UpstreamResult<ChatCompletion>) {
        self.queues
            .lock()
            .entry(key.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn push_ok(&self, key: &str, content: &str) {
        self.push_with_usage(key, content, TokenUsage::default());
    }

    pub fn push_with_usage(&self, key: &str, content: &str, usage: TokenUsage) {
        self.push(
            key,
            Ok(ChatCompletion {
                content: content.to_string(),
                usage,
            }),
        );
    }

    pub fn push_err(&self, key: &str, error: UpstreamError) {
        self.push(key, Err(error));
    }

    pub fn calls(&self) -> Vec<ChatRequest> {
        self.calls.lock().clone()
    }

    pub fn calls_for(&self, key: &str) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|r| stage_key(r) == key)
            .count()
    }
}

fn stage_key(request: &ChatRequest) -> &str {
    request
        .response_format
        .as_ref()
        .map(|s| s.name.as_str())
        .unwrap_or(CONTEXT_KEY)
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    async fn complete(&self, request: ChatRequest) -> UpstreamResult<ChatCompletion> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let key = stage_key(&request).to_string();
        self.calls.lock().push(request);
        self.queues
            .lock()
            .get_mut(&key)
            .and_then(|q| q.pop_front())
            .unwrap_or_else(|| Err(UpstreamError::Other(format!("no scripted response for {}", key))))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
