//! Context gathering: one search-augmented chat call per subject.

use std::sync::Arc;

use crate::cache::ContextCache;
use crate::config::StageModel;
use crate::error::UpstreamResult;
use crate::llm::{bounded, ChatProvider, ChatRequest, SearchTool};
use crate::subject::Subject;

pub const SEARCH_WINDOW_DAYS: i64 = 30;

pub struct ContextGatherer {
    provider: Arc<dyn ChatProvider>,
    cache: Arc<ContextCache>,
    stage: StageModel,
}

impl ContextGatherer {
    pub fn new(provider: Arc<dyn ChatProvider>, cache: Arc<ContextCache>, stage: StageModel) -> Self {
        Self { provider, cache, stage }
    }

    /// Recent activity for `subject`. Never fails: a provider failure yields
    /// a placeholder, which is not cached.
    pub async fn gather(&self, subject: &Subject) -> String {
        if let Some(cached) = self.cache.get(subject.as_str()) {
            tracing::info!(subject = %subject, "Using cached context");
            return cached;
        }

        match self.fetch(subject).await {
            Ok(context) => {
                tracing::info!(subject = %subject, chars = context.len(), "Gathered context");
                self.cache.put(subject.as_str(), context.clone());
                context
            }
            Err(e) => {
                tracing::error!(
                    subject = %subject,
                    category = e.category(),
                    error = %e,
                    "Error gathering context, using placeholder"
                );
                placeholder_context(subject)
            }
        }
    }

    async fn fetch(&self, subject: &Subject) -> UpstreamResult<String> {
        let request = ChatRequest::for_stage(&self.stage)
            .user(search_query(subject))
            .with_search(SearchTool::recent(SEARCH_WINDOW_DAYS));
        let completion = bounded(self.provider.as_ref(), request).await?;
        Ok(completion.content)
    }
}

pub fn search_query(subject: &Subject) -> String {
    format!(
        "Posts, replies, images, and videos by or to @{subject} on X from the past {SEARCH_WINDOW_DAYS} days, \
         including topics they engage with, replies they make, media they share, and visual content they post"
    )
}

/// Synthetic context returned when the real call fails.
pub fn placeholder_context(subject: &Subject) -> String {
    format!(
        "Mock context for {}: This is a placeholder response for testing purposes. \
         In a real scenario, this would contain actual X search results.",
        subject
    )
}
