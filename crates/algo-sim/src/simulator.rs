//! Pipeline facade: gather once, then run the generators a route needs.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cache::ContextCache;
use crate::config::SimulatorConfig;
use crate::gatherer::ContextGatherer;
use crate::insights::QuickInsightsGenerator;
use crate::llm::ChatProvider;
use crate::political::{PoliticalAnalysis, PoliticalAnalysisGenerator};
use crate::report::{RecommendationGenerator, Recommendations};
use crate::subject::Subject;
use crate::topics::{Topic, TopicExtractor};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub topics: Vec<Topic>,
    pub recommendations: Recommendations,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsResponse {
    pub insights: Vec<String>,
}

/// Every operation is infallible: each stage substitutes its own fallback.
pub struct Simulator {
    cache: Arc<ContextCache>,
    gatherer: ContextGatherer,
    topics: TopicExtractor,
    recommendations: RecommendationGenerator,
    insights: QuickInsightsGenerator,
    political: PoliticalAnalysisGenerator,
}

impl Simulator {
    pub fn new(provider: Arc<dyn ChatProvider>, config: &SimulatorConfig) -> Self {
        let cache = Arc::new(ContextCache::from_settings(&config.cache));
        Self::with_cache(provider, cache, config)
    }

    /// Build around an existing cache, e.g. one shared by several simulators.
    pub fn with_cache(
        provider: Arc<dyn ChatProvider>,
        cache: Arc<ContextCache>,
        config: &SimulatorConfig,
    ) -> Self {
        let models = &config.models;
        tracing::info!(
            provider = provider.name(),
            context_model = %models.context.model,
            report_model = %models.recommendations.model,
            "Simulator initialized"
        );

        Self {
            gatherer: ContextGatherer::new(provider.clone(), cache.clone(), models.context.clone()),
            topics: TopicExtractor::new(provider.clone(), models.topics.clone()),
            recommendations: RecommendationGenerator::new(provider.clone(), models.recommendations.clone()),
            insights: QuickInsightsGenerator::new(provider.clone(), models.insights.clone()),
            political: PoliticalAnalysisGenerator::new(provider, models.political.clone()),
            cache,
        }
    }

    pub fn cache(&self) -> &Arc<ContextCache> {
        &self.cache
    }

    pub async fn analyze(&self, subject: &Subject) -> AnalysisResponse {
        let started = Instant::now();
        let context = self.gatherer.gather(subject).await;
        let topics = self.topics.extract(&context).await;
        let recommendations = self.recommendations.generate(&topics, &context).await;

        tracing::info!(
            subject = %subject,
            topics = topics.len(),
            total_tokens = recommendations.tokens.total_tokens,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Analysis complete"
        );
        AnalysisResponse { topics, recommendations }
    }

    pub async fn insights(&self, subject: &Subject) -> InsightsResponse {
        let context = self.gatherer.gather(subject).await;
        let insights = self.insights.generate(subject, &context).await;
        tracing::debug!(subject = %subject, count = insights.len(), "Quick insights ready");
        InsightsResponse { insights }
    }

    pub async fn political_analysis(&self, subject: &Subject) -> PoliticalAnalysis {
        let context = self.gatherer.gather(subject).await;
        self.political.generate(&context).await
    }
}
