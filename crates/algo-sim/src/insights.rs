//! Quick insights shown while the full analysis loads.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::json;

use crate::config::StageModel;
use crate::error::UpstreamResult;
use crate::llm::structured::require_texts;
use crate::llm::{bounded, excerpt, parse_structured, ChatProvider, ChatRequest, ResponseSchema, Validate};
use crate::subject::Subject;

pub const MAX_INSIGHTS: usize = 12;
const REQUESTED_INSIGHTS: usize = 10;
const CONTEXT_EXCERPT_CHARS: usize = 1500;
pub(crate) const SCHEMA_NAME: &str = "quick_insights";

#[derive(Debug, Deserialize)]
struct QuickInsightsResponse {
    insights: Vec<String>,
}

impl Validate for QuickInsightsResponse {
    fn validate(&self) -> Result<(), String> {
        require_texts("insights", &self.insights)
    }
}

fn insights_schema() -> ResponseSchema {
    ResponseSchema::new(
        SCHEMA_NAME,
        json!({
            "type": "object",
            "properties": {
                "insights": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "List of quick observations about the user"
                }
            },
            "required": ["insights"],
            "additionalProperties": false
        }),
    )
}

fn build_insights_prompt(subject: &Subject, context: &str) -> String {
    format!(
        "Based on this X user's activity, generate {count} quick, interesting insights that reveal patterns \
in their behavior. These will be shown to the user while their full analysis loads.

Keep each insight:
- Short (1-2 sentences max)
- Specific and actionable
- Varied (cover different aspects: topics, engagement style, network, timing, content preferences)
- Neutral/positive tone
- Data-driven when possible

Examples of good insights:
- \"You engage most with accounts under 10K followers, suggesting you prefer authentic voices over influencers.\"
- \"You reply more than you repost, showing a preference for genuine conversation over amplification.\"

Avoid generic statements like \"You post about technology.\" Be specific and insightful.

Username: @{subject}
Activity Data: {sample}

Generate exactly {count} distinct insights.",
        count = REQUESTED_INSIGHTS,
        subject = subject,
        sample = excerpt(context, CONTEXT_EXCERPT_CHARS),
    )
}

pub struct QuickInsightsGenerator {
    provider: Arc<dyn ChatProvider>,
    stage: StageModel,
}

impl QuickInsightsGenerator {
    pub fn new(provider: Arc<dyn ChatProvider>, stage: StageModel) -> Self {
        Self { provider, stage }
    }

    pub async fn generate(&self, subject: &Subject, context: &str) -> Vec<String> {
        match self.request(subject, context).await {
            Ok(insights) => insights,
            Err(e) => {
                tracing::error!(
                    subject = %subject,
                    category = e.category(),
                    error = %e,
                    "Error generating quick insights, using placeholders"
                );
                fallback_insights(subject)
            }
        }
    }

    async fn request(&self, subject: &Subject, context: &str) -> UpstreamResult<Vec<String>> {
        let request = ChatRequest::for_stage(&self.stage)
            .user(build_insights_prompt(subject, context))
            .with_schema(insights_schema());
        let completion = bounded(self.provider.as_ref(), request).await?;
        let parsed: QuickInsightsResponse = parse_structured(&completion.content)?;

        let mut insights = parsed.insights;
        insights.truncate(MAX_INSIGHTS);
        Ok(insights)
    }
}

/// Generic progress lines; they only need to cover the latency of the full
/// analysis.
pub fn fallback_insights(subject: &Subject) -> Vec<String> {
    vec![
        format!("Analyzing @{}'s recent activity patterns...", subject),
        "Detecting primary interest signals...".to_string(),
        "Mapping engagement behavior across content types...".to_string(),
        "Identifying network interaction patterns...".to_string(),
        "Calculating topic weights based on engagement depth...".to_string(),
        "Analyzing content creation vs consumption balance...".to_string(),
        "Evaluating temporal activity patterns...".to_string(),
        "Building personalized recommendation profile...".to_string(),
    ]
}
