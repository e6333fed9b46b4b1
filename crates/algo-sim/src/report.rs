//! Recommendation report: how the feed algorithm would adjust for a subject.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::config::StageModel;
use crate::error::UpstreamResult;
use crate::llm::structured::{require_items, require_text, require_texts};
use crate::llm::{
    bounded, excerpt, parse_structured, ChatProvider, ChatRequest, ResponseSchema, TokenUsage,
    Validate,
};
use crate::topics::Topic;

const CONTEXT_EXCERPT_CHARS: usize = 1000;
pub(crate) const SCHEMA_NAME: &str = "algorithm_report";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub name: String,
    pub adjustment: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedComposition {
    pub increase: Vec<String>,
    pub decrease: Vec<String>,
    pub account_distribution: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub prioritized_signals: Vec<String>,
    pub spam_filters: Vec<String>,
    pub diversity_mechanisms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiversityMetrics {
    pub filter_bubble_risk: String,
    pub topic_diversity: String,
    pub interventions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpposingViewpoints {
    pub strategy: String,
    pub exposure_targets: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalAnalysis {
    pub recency_weighting: String,
    pub trending_signals: Vec<String>,
    pub decay_notes: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalExplanation {
    pub signal: String,
    pub explanation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmReport {
    pub analysis_process: String,
    pub signals_boosted: Vec<Signal>,
    pub signals_reduced: Vec<Signal>,
    pub feed_composition: FeedComposition,
    pub quality_metrics: QualityMetrics,
    pub diversity_metrics: DiversityMetrics,
    pub opposing_viewpoints: OpposingViewpoints,
    pub temporal_analysis: TemporalAnalysis,
    pub signal_explanations: Vec<SignalExplanation>,
    pub expected_outcome: String,
    pub user_profile: String,
}

/// Report plus the token counters of the call that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    pub report: AlgorithmReport,
    pub tokens: TokenUsage,
}

impl Validate for AlgorithmReport {
    fn validate(&self) -> Result<(), String> {
        require_text("analysis_process", &self.analysis_process)?;
        require_items("signals_boosted", &self.signals_boosted)?;
        for signal in self.signals_boosted.iter().chain(&self.signals_reduced) {
            require_text("signal.name", &signal.name)?;
            require_text("signal.adjustment", &signal.adjustment)?;
        }
        require_texts("feed_composition.increase", &self.feed_composition.increase)?;
        require_text("diversity_metrics.filter_bubble_risk", &self.diversity_metrics.filter_bubble_risk)?;
        require_text("opposing_viewpoints.strategy", &self.opposing_viewpoints.strategy)?;
        require_text("temporal_analysis.recency_weighting", &self.temporal_analysis.recency_weighting)?;
        require_text("expected_outcome", &self.expected_outcome)?;
        require_text("user_profile", &self.user_profile)
    }
}

fn string_list(description: &str) -> JsonValue {
    json!({"type": "array", "items": {"type": "string"}, "description": description})
}

fn object(properties: JsonValue) -> JsonValue {
    let required: Vec<String> = properties
        .as_object()
        .map(|p| p.keys().cloned().collect())
        .unwrap_or_default();
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

pub(crate) fn report_schema() -> ResponseSchema {
    let signal = object(json!({
        "name": {"type": "string", "description": "Name of the signal"},
        "adjustment": {"type": "string", "description": "Adjustment percentage (e.g., '+40%' or '-30%')"},
        "reason": {"type": "string", "description": "Brief explanation for the adjustment"}
    }));

    ResponseSchema::new(
        SCHEMA_NAME,
        object(json!({
            "analysis_process": {"type": "string", "description": "Explanation of the analysis reasoning"},
            "signals_boosted": {"type": "array", "items": signal.clone()},
            "signals_reduced": {"type": "array", "items": signal},
            "feed_composition": object(json!({
                "increase": string_list("Content types that will increase"),
                "decrease": string_list("Content types that will decrease"),
                "account_distribution": {"type": "string", "description": "Account size distribution changes"}
            })),
            "quality_metrics": object(json!({
                "prioritized_signals": string_list("Signals being prioritized"),
                "spam_filters": string_list("Spam/low-quality filters applied"),
                "diversity_mechanisms": string_list("Diversity mechanisms")
            })),
            "diversity_metrics": object(json!({
                "filter_bubble_risk": {"type": "string", "description": "Assessment of filter-bubble risk"},
                "topic_diversity": {"type": "string", "description": "How varied the detected interests are"},
                "interventions": string_list("Mechanisms used to widen the feed")
            })),
            "opposing_viewpoints": object(json!({
                "strategy": {"type": "string", "description": "How opposing viewpoints are surfaced"},
                "exposure_targets": string_list("Perspectives the feed would introduce")
            })),
            "temporal_analysis": object(json!({
                "recency_weighting": {"type": "string", "description": "How recency affects ranking"},
                "trending_signals": string_list("Signals gaining momentum"),
                "decay_notes": {"type": "string", "description": "How older interests decay"}
            })),
            "signal_explanations": {"type": "array", "items": object(json!({
                "signal": {"type": "string"},
                "explanation": {"type": "string", "description": "Plain-language explanation for the user"}
            }))},
            "expected_outcome": {"type": "string", "description": "Summary of expected feed changes"},
            "user_profile": {"type": "string", "description": "Narrative profile of the user"}
        })),
    )
}

fn build_report_prompt(topics: &[Topic], context: &str) -> String {
    let signals = topics
        .iter()
        .map(|t| format!("{} (weight: {:.2})", t.topic, t.weight))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "CONTEXT: You are generating an educational simulator report that demonstrates how X's recommendation algorithm \
would adjust based on a LIMITED SAMPLE (1-20 posts) of user activity. Be realistic about the limited data available.

USER INTEREST SIGNALS DETECTED: {signals}
USER ACTIVITY SAMPLE: {sample}

Generate a technical, analytical report on how the recommendation algorithm would adjust for this user.

## Analysis Process
- How you analyzed the user's interests FROM THIS LIMITED SAMPLE and which key signals matter
- Acknowledge that this is based on a small sample

## Algorithm Adjustments
- Signals BOOSTED and REDUCED, each with a name, a percentage adjustment and a reason
- Feed composition: content types that INCREASE or DECREASE, as RELATIVE changes from baseline, plus account size distribution
- Quality metrics: prioritized intrinsic value signals, spam/low-quality filters, diversity mechanisms

## Diversity and Filter Bubbles
- Filter-bubble risk, topic diversity, and the interventions that widen the feed
- Opposing-viewpoint strategy: how and which other perspectives would be surfaced

## Temporal Analysis
- How recency weighting applies, which signals are trending, how older interests decay

## Explanations
- For each boosted or reduced signal, a one-sentence plain-language explanation addressed to the user

## Expected Outcome and Profile
- Net effect on the feed in 2-3 sentences, acknowledging this is a simulation
- A short narrative profile of the user as the algorithm sees them

Use technical language and specific metrics. Respond with JSON matching the declared schema exactly.",
        signals = signals,
        sample = excerpt(context, CONTEXT_EXCERPT_CHARS),
    )
}

pub struct RecommendationGenerator {
    provider: Arc<dyn ChatProvider>,
    stage: StageModel,
}

impl RecommendationGenerator {
    pub fn new(provider: Arc<dyn ChatProvider>, stage: StageModel) -> Self {
        Self { provider, stage }
    }

    pub async fn generate(&self, topics: &[Topic], context: &str) -> Recommendations {
        match self.request(topics, context).await {
            Ok(recommendations) => recommendations,
            Err(e) => {
                tracing::error!(
                    category = e.category(),
                    error = %e,
                    "Error generating recommendations, using fallback report"
                );
                fallback_recommendations(topics)
            }
        }
    }

    async fn request(&self, topics: &[Topic], context: &str) -> UpstreamResult<Recommendations> {
        let request = ChatRequest::for_stage(&self.stage)
            .user(build_report_prompt(topics, context))
            .with_schema(report_schema());
        let completion = bounded(self.provider.as_ref(), request).await?;
        let report: AlgorithmReport = parse_structured(&completion.content)?;

        tracing::info!(
            completion_tokens = completion.usage.completion_tokens,
            reasoning_tokens = completion.usage.reasoning_tokens,
            total_tokens = completion.usage.total_tokens,
            "Generated recommendation report"
        );
        Ok(Recommendations { report, tokens: completion.usage })
    }
}

/// Fully populated placeholder report with zeroed token counts.
pub fn fallback_recommendations(topics: &[Topic]) -> Recommendations {
    let names = topics.iter().map(|t| t.topic.as_str()).collect::<Vec<_>>().join(", ");
    let s = |text: &str| text.to_string();

    let report = AlgorithmReport {
        analysis_process: format!(
            "Mock analysis for topics: {}. This is a fallback response for testing.",
            names
        ),
        signals_boosted: vec![Signal {
            name: s("Content relevance"),
            adjustment: s("+30%"),
            reason: s("Matches user interests"),
        }],
        signals_reduced: vec![Signal {
            name: s("Generic content"),
            adjustment: s("-20%"),
            reason: s("Low relevance"),
        }],
        feed_composition: FeedComposition {
            increase: vec![s("Topic-specific content")],
            decrease: vec![s("Off-topic posts")],
            account_distribution: s("Standard distribution"),
        },
        quality_metrics: QualityMetrics {
            prioritized_signals: vec![s("Engagement rate")],
            spam_filters: vec![s("Low-quality filter")],
            diversity_mechanisms: vec![s("Topic diversity")],
        },
        diversity_metrics: DiversityMetrics {
            filter_bubble_risk: s("Unknown: fallback response, no analysis performed"),
            topic_diversity: s("Unknown: fallback response"),
            interventions: vec![s("Standard topic rotation")],
        },
        opposing_viewpoints: OpposingViewpoints {
            strategy: s("Mock strategy: standard exposure to adjacent viewpoints"),
            exposure_targets: vec![s("Adjacent perspectives")],
        },
        temporal_analysis: TemporalAnalysis {
            recency_weighting: s("Standard recency weighting"),
            trending_signals: vec![s("No trending signals detected (fallback)")],
            decay_notes: s("Standard interest decay"),
        },
        signal_explanations: vec![SignalExplanation {
            signal: s("Content relevance"),
            explanation: s("Posts matching your detected interests are shown more often."),
        }],
        expected_outcome: s("Mock outcome: Feed will be adjusted based on user interests."),
        user_profile: s("Mock profile: insufficient data to build a profile (fallback response)."),
    };

    Recommendations { report, tokens: TokenUsage::default() }
}
