//! Political-leaning analysis report.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::StageModel;
use crate::error::UpstreamResult;
use crate::llm::structured::{require_text, require_unit_range};
use crate::llm::{
    bounded, excerpt, parse_structured, ChatProvider, ChatRequest, ResponseSchema, TokenUsage,
    Validate,
};

const CONTEXT_EXCERPT_CHARS: usize = 2000;
pub(crate) const SCHEMA_NAME: &str = "political_analysis";

pub const DEFAULT_DISCLAIMER: &str = "This analysis is an automated, AI-generated estimate based on a limited \
sample of public activity. It may be inaccurate, does not represent the user's actual beliefs, and should not \
be used to make decisions about any person.";

const FALLBACK_DISCLAIMER: &str = "Insufficient data: this is a fallback response generated because the analysis \
service was unavailable. It contains no findings about the user and should not be used to make decisions about \
any person.";

const SYSTEM_PROMPT: &str = "You are producing an educational, neutral analysis of the political leaning expressed \
in a LIMITED SAMPLE of a user's public X activity. Be balanced, avoid loaded language, and be explicit about \
uncertainty.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpectrumPosition {
    #[serde(rename = "Far Left")]
    FarLeft,
    Left,
    #[serde(rename = "Center-Left")]
    CenterLeft,
    Center,
    #[serde(rename = "Center-Right")]
    CenterRight,
    Right,
    #[serde(rename = "Far Right")]
    FarRight,
    Apolitical,
}

impl SpectrumPosition {
    pub const ALL: [SpectrumPosition; 8] = [
        Self::FarLeft,
        Self::Left,
        Self::CenterLeft,
        Self::Center,
        Self::CenterRight,
        Self::Right,
        Self::FarRight,
        Self::Apolitical,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::FarLeft => "Far Left",
            Self::Left => "Left",
            Self::CenterLeft => "Center-Left",
            Self::Center => "Center",
            Self::CenterRight => "Center-Right",
            Self::Right => "Right",
            Self::FarRight => "Far Right",
            Self::Apolitical => "Apolitical",
        }
    }
}

impl fmt::Display for SpectrumPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumPlacement {
    pub position: SpectrumPosition,
    pub confidence: f64,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoliticalAnalysisReport {
    pub political_spectrum: SpectrumPlacement,
    pub key_topics: Vec<String>,
    pub ideological_markers: Vec<String>,
    pub value_alignments: Vec<String>,
    pub concerns: Vec<String>,
    pub policy_positions: Vec<String>,
    pub summary: String,
    #[serde(default)]
    pub disclaimer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoliticalAnalysis {
    pub report: PoliticalAnalysisReport,
    pub tokens: TokenUsage,
}

impl Validate for PoliticalAnalysisReport {
    fn validate(&self) -> Result<(), String> {
        require_unit_range("political_spectrum.confidence", self.political_spectrum.confidence)?;
        require_text("political_spectrum.reasoning", &self.political_spectrum.reasoning)?;
        require_text("summary", &self.summary)
    }
}

fn political_schema() -> ResponseSchema {
    let list = |description: &str| json!({"type": "array", "items": {"type": "string"}, "description": description});
    let positions: Vec<&str> = SpectrumPosition::ALL.iter().map(|p| p.label()).collect();

    ResponseSchema::new(
        SCHEMA_NAME,
        json!({
            "type": "object",
            "properties": {
                "political_spectrum": {
                    "type": "object",
                    "properties": {
                        "position": {"type": "string", "enum": positions},
                        "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                        "reasoning": {"type": "string"}
                    },
                    "required": ["position", "confidence", "reasoning"],
                    "additionalProperties": false
                },
                "key_topics": list("Political topics the user engages with"),
                "ideological_markers": list("Language or framing that signals ideology"),
                "value_alignments": list("Values the activity aligns with"),
                "concerns": list("Issues the user appears concerned about"),
                "policy_positions": list("Inferred stances on specific policies"),
                "summary": {"type": "string", "description": "Multi-paragraph narrative summary"},
                "disclaimer": {"type": "string"}
            },
            "required": ["political_spectrum", "key_topics", "ideological_markers", "value_alignments",
                         "concerns", "policy_positions", "summary", "disclaimer"],
            "additionalProperties": false
        }),
    )
}

fn build_political_prompt(context: &str) -> String {
    format!(
        "USER ACTIVITY SAMPLE: {}

Produce:
- political_spectrum: a position (one of Far Left, Left, Center-Left, Center, Center-Right, Right, Far Right, Apolitical), \
a confidence between 0 and 1 reflecting how much evidence the sample contains, and the reasoning behind it
- key_topics, ideological_markers, value_alignments, concerns, policy_positions: short lists grounded in the sample
- summary: several paragraphs describing the overall picture and its limits
- disclaimer: a note that this is an automated estimate from limited data

If the sample contains little political content, prefer Apolitical or Center with low confidence.",
        excerpt(context, CONTEXT_EXCERPT_CHARS)
    )
}

pub struct PoliticalAnalysisGenerator {
    provider: Arc<dyn ChatProvider>,
    stage: StageModel,
}

impl PoliticalAnalysisGenerator {
    pub fn new(provider: Arc<dyn ChatProvider>, stage: StageModel) -> Self {
        Self { provider, stage }
    }

    pub async fn generate(&self, context: &str) -> PoliticalAnalysis {
        match self.request(context).await {
            Ok(analysis) => analysis,
            Err(e) => {
                tracing::error!(
                    category = e.category(),
                    error = %e,
                    "Error generating political analysis, using fallback report"
                );
                fallback_political_analysis()
            }
        }
    }

    async fn request(&self, context: &str) -> UpstreamResult<PoliticalAnalysis> {
        let request = ChatRequest::for_stage(&self.stage)
            .system(SYSTEM_PROMPT)
            .user(build_political_prompt(context))
            .with_schema(political_schema());
        let completion = bounded(self.provider.as_ref(), request).await?;
        let mut report: PoliticalAnalysisReport = parse_structured(&completion.content)?;

        if report.disclaimer.trim().is_empty() {
            report.disclaimer = DEFAULT_DISCLAIMER.to_string();
        }

        tracing::info!(
            position = %report.political_spectrum.position,
            confidence = report.political_spectrum.confidence,
            total_tokens = completion.usage.total_tokens,
            "Generated political analysis"
        );
        Ok(PoliticalAnalysis { report, tokens: completion.usage })
    }
}

pub fn fallback_political_analysis() -> PoliticalAnalysis {
    let insufficient = |what: &str| format!("Insufficient data: {} unavailable (fallback response)", what);

    let report = PoliticalAnalysisReport {
        political_spectrum: SpectrumPlacement {
            position: SpectrumPosition::Center,
            confidence: 0.3,
            reasoning: "Insufficient data to determine a political position. This is a fallback response \
                        with a neutral default placement."
                .to_string(),
        },
        key_topics: vec![insufficient("key topics")],
        ideological_markers: vec![insufficient("ideological markers")],
        value_alignments: vec![insufficient("value alignments")],
        concerns: vec![insufficient("concerns")],
        policy_positions: vec![insufficient("policy positions")],
        summary: "Insufficient data to produce a political analysis. The analysis service was unavailable, \
                  so this fallback report uses a neutral default and should not be read as a finding."
            .to_string(),
        disclaimer: FALLBACK_DISCLAIMER.to_string(),
    };

    PoliticalAnalysis { report, tokens: TokenUsage::default() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::llm::scripted::ScriptedProvider;
    use crate::llm::ChatRole;

    fn generator(provider: Arc<ScriptedProvider>) -> PoliticalAnalysisGenerator {
        PoliticalAnalysisGenerator::new(provider, StageModel::new("grok-4-fast-reasoning", 5))
    }

    fn report_json(position: &str, confidence: f64, disclaimer: Option<&str>) -> String {
        let mut value = json!({
            "political_spectrum": {"position": position, "confidence": confidence, "reasoning": "Mostly policy posts"},
            "key_topics": ["Energy"],
            "ideological_markers": ["Market framing"],
            "value_alignments": ["Innovation"],
            "concerns": ["Regulation"],
            "policy_positions": ["Supports nuclear power"],
            "summary": "A summary."
        });
        if let Some(d) = disclaimer {
            value["disclaimer"] = json!(d);
        }
        value.to_string()
    }

    #[test]
    fn test_position_labels_roundtrip() {
        for position in SpectrumPosition::ALL {
            let encoded = serde_json::to_string(&position).unwrap();
            assert_eq!(encoded, format!("\"{}\"", position.label()));
        }
        let parsed: SpectrumPosition = serde_json::from_str("\"Center-Right\"").unwrap();
        assert_eq!(parsed, SpectrumPosition::CenterRight);
    }

    #[tokio::test]
    async fn test_request_framed_by_system_message() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_ok(SCHEMA_NAME, &report_json("Center", 0.4, None));
        generator(provider.clone()).generate("my activity").await;

        let messages = &provider.calls()[0].messages;
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, ChatRole::System);
        assert!(messages[0].content.contains("neutral"));
        assert_eq!(messages[1].role, ChatRole::User);
        assert!(messages[1].content.contains("my activity"));
    }

    #[test]
    fn test_schema_enumerates_positions() {
        let schema = political_schema().schema;
        let positions = schema["properties"]["political_spectrum"]["properties"]["position"]["enum"]
            .as_array()
            .unwrap()
            .len();
        assert_eq!(positions, 8);
    }

    #[tokio::test]
    async fn test_missing_disclaimer_injected() {
        let provider = Arc::new(ScriptedProvider::new());
        let usage = TokenUsage { completion_tokens: 3, reasoning_tokens: 4, total_tokens: 20 };
        provider.push_with_usage(SCHEMA_NAME, &report_json("Center-Left", 0.7, None), usage);
        let analysis = generator(provider).generate("ctx").await;
        assert_eq!(analysis.report.political_spectrum.position, SpectrumPosition::CenterLeft);
        assert_eq!(analysis.report.disclaimer, DEFAULT_DISCLAIMER);
        assert_eq!(analysis.tokens, usage);
    }

    #[tokio::test]
    async fn test_blank_disclaimer_injected() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_ok(SCHEMA_NAME, &report_json("Apolitical", 0.2, Some("  ")));
        let analysis = generator(provider).generate("ctx").await;
        assert_eq!(analysis.report.disclaimer, DEFAULT_DISCLAIMER);
    }

    #[tokio::test]
    async fn test_provider_disclaimer_kept() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_ok(SCHEMA_NAME, &report_json("Right", 0.5, Some("Custom note")));
        let analysis = generator(provider).generate("ctx").await;
        assert_eq!(analysis.report.disclaimer, "Custom note");
    }

    #[tokio::test]
    async fn test_unknown_position_falls_back() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_ok(SCHEMA_NAME, &report_json("Libertarian", 0.9, None));
        let analysis = generator(provider).generate("ctx").await;
        assert_eq!(analysis, fallback_political_analysis());
    }

    #[tokio::test]
    async fn test_confidence_out_of_range_falls_back() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_ok(SCHEMA_NAME, &report_json("Left", 1.2, None));
        let analysis = generator(provider).generate("ctx").await;
        assert_eq!(analysis.report.political_spectrum.confidence, 0.3);
    }

    #[tokio::test]
    async fn test_failure_fallback_shape() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_err(SCHEMA_NAME, UpstreamError::Other("boom".into()));
        let analysis = generator(provider).generate("ctx").await;
        let report = &analysis.report;
        assert_eq!(report.political_spectrum.position, SpectrumPosition::Center);
        assert_eq!(report.political_spectrum.confidence, 0.3);
        assert!(!report.disclaimer.is_empty());

        let texts = [
            &report.political_spectrum.reasoning,
            &report.summary,
            &report.disclaimer,
        ];
        let lists = [
            &report.key_topics,
            &report.ideological_markers,
            &report.value_alignments,
            &report.concerns,
            &report.policy_positions,
        ];
        let marked = |text: &str| text.contains("Insufficient data") && text.contains("fallback");
        assert!(texts.iter().all(|t| marked(t)));
        assert!(lists.iter().all(|list| !list.is_empty() && list.iter().all(|t| marked(t))));
        assert_eq!(analysis.tokens, TokenUsage::default());

        let encoded = serde_json::to_value(&analysis).unwrap();
        assert_eq!(encoded["report"]["political_spectrum"]["position"], "Center");
    }
}
