//! Weighted topic extraction.
//!
//! Primary path asks the provider for 5-10 weighted topics under a strict
//! schema. The fallback is a local word-frequency count, so the simulator
//! always has something to show.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::StageModel;
use crate::error::UpstreamResult;
use crate::llm::structured::{require_items, require_text, require_unit_range};
use crate::llm::{bounded, parse_structured, ChatProvider, ChatRequest, ResponseSchema, Validate};

pub const MAX_TOPICS: usize = 10;
const FALLBACK_TOPIC_COUNT: usize = 8;
const GENERAL_INTEREST: &str = "General Interest";
pub(crate) const SCHEMA_NAME: &str = "topics_response";

/// Words ignored by the fallback extractor. Includes the vocabulary of the
/// placeholder context so a failed gather cannot recommend itself.
const STOP_WORDS: &[&str] = &[
    "that", "this", "with", "from", "have", "been", "will", "about", "their", "would", "there",
    "could", "when", "what", "which", "these", "those", "some", "more", "than", "other", "such",
    "into", "only", "also", "then", "them", "your", "just", "like", "much", "make", "made",
    "many", "over", "posts", "user", "mock", "context", "placeholder", "testing", "purposes",
    "real", "scenario", "contain", "actual", "results", "search",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub topic: String,
    pub weight: f64,
}

impl Topic {
    pub fn new(topic: impl Into<String>, weight: f64) -> Self {
        Self { topic: topic.into(), weight }
    }
}

#[derive(Debug, Deserialize)]
struct TopicsResponse {
    topics: Vec<Topic>,
}

impl Validate for TopicsResponse {
    fn validate(&self) -> Result<(), String> {
        require_items("topics", &self.topics)?;
        for (i, t) in self.topics.iter().enumerate() {
            require_text(&format!("topics[{}].topic", i), &t.topic)?;
            require_unit_range(&format!("topics[{}].weight", i), t.weight)?;
        }
        Ok(())
    }
}

fn topics_schema() -> ResponseSchema {
    ResponseSchema::new(
        SCHEMA_NAME,
        json!({
            "type": "object",
            "properties": {
                "topics": {
                    "type": "array",
                    "description": "List of identified topics with weights",
                    "items": {
                        "type": "object",
                        "properties": {
                            "topic": {"type": "string", "description": "The topic or interest area"},
                            "weight": {"type": "number", "minimum": 0, "maximum": 1,
                                       "description": "Weight/importance score (0-1)"}
                        },
                        "required": ["topic", "weight"],
                        "additionalProperties": false
                    }
                }
            },
            "required": ["topics"],
            "additionalProperties": false
        }),
    )
}

fn build_topics_prompt(context: &str) -> String {
    format!(
        "CONTEXT: You're analyzing a LIMITED SAMPLE (approximately 1-20 posts) of a user's X activity to demonstrate \
how X's recommendation algorithm would personalize their feed. This is for an educational simulator showing \
users what signals the algorithm picks up from their activity.

Based on this limited sample of the user's X activity, extract the main topics or interests.

Analyze the context and calculate weights for each topic based on:
- Frequency: how often the topic appears in this sample
- Recency: how recent the mentions are (assume recent if mentioned in recent context)
- Engagement: indicators like likes, reposts, replies (infer from context)

Return the top 5-10 topics with their weights (0-1 scale), ensuring diversity (no repetitive similar topics).

CRITICAL: The weights MUST be normalized so that they sum to exactly 1.0.
For example, if you identify 5 topics, their weights might be [0.35, 0.25, 0.20, 0.12, 0.08].

User Activity Sample: {}",
        context
    )
}

pub struct TopicExtractor {
    provider: Arc<dyn ChatProvider>,
    stage: StageModel,
}

impl TopicExtractor {
    pub fn new(provider: Arc<dyn ChatProvider>, stage: StageModel) -> Self {
        Self { provider, stage }
    }

    /// 1..=10 topics whose weights sum to 1.0 (to three decimals).
    pub async fn extract(&self, context: &str) -> Vec<Topic> {
        match self.request(context).await {
            Ok(topics) => topics,
            Err(e) => {
                tracing::error!(
                    category = e.category(),
                    error = %e,
                    "Error analyzing context, using keyword fallback"
                );
                fallback_topics(context)
            }
        }
    }

    async fn request(&self, context: &str) -> UpstreamResult<Vec<Topic>> {
        let request = ChatRequest::for_stage(&self.stage)
            .user(build_topics_prompt(context))
            .with_schema(topics_schema());
        let completion = bounded(self.provider.as_ref(), request).await?;
        let parsed: TopicsResponse = parse_structured(&completion.content)?;

        let mut topics = parsed.topics;
        topics.truncate(MAX_TOPICS);
        Ok(normalize_weights(topics))
    }
}

/// Scale weights to sum to 1.0, rounded to three decimals. A zero total is
/// returned unchanged.
pub fn normalize_weights(topics: Vec<Topic>) -> Vec<Topic> {
    let total: f64 = topics.iter().map(|t| t.weight).sum();
    if total <= 0.0 {
        return topics;
    }
    topics
        .into_iter()
        .map(|t| Topic { weight: round3(t.weight / total), topic: t.topic })
        .collect()
}

fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\b[a-z]{4,}\b").expect("static regex"))
}

/// Keyword-frequency topics: top eight non-stop-words of four or more
/// letters, ties broken by first occurrence.
pub fn fallback_topics(context: &str) -> Vec<Topic> {
    let text = context.to_lowercase();

    // word -> (count, first position)
    let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
    for (position, word) in word_pattern()
        .find_iter(&text)
        .map(|m| m.as_str())
        .filter(|w| !STOP_WORDS.contains(w))
        .enumerate()
    {
        counts.entry(word).or_insert((0, position)).0 += 1;
    }

    if counts.is_empty() {
        return vec![Topic::new(GENERAL_INTEREST, 1.0)];
    }

    let mut ranked: Vec<(&str, usize, usize)> = counts
        .into_iter()
        .map(|(word, (count, first))| (word, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    let topics = ranked
        .into_iter()
        .take(FALLBACK_TOPIC_COUNT)
        .map(|(word, count, _)| Topic::new(capitalize(word), count as f64))
        .collect();
    normalize_weights(topics)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UpstreamError;
    use crate::gatherer::placeholder_context;
    use crate::llm::scripted::ScriptedProvider;
    use crate::subject::Subject;

    fn extractor(provider: Arc<ScriptedProvider>) -> TopicExtractor {
        TopicExtractor::new(provider, StageModel::new("grok-4-fast", 5))
    }

    fn weight_sum(topics: &[Topic]) -> f64 {
        topics.iter().map(|t| t.weight).sum()
    }

    #[tokio::test]
    async fn test_provider_topics_are_normalized() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_ok(
            SCHEMA_NAME,
            r#"{"topics":[{"topic":"AI","weight":0.8},{"topic":"Space","weight":0.6},{"topic":"Cars","weight":0.6}]}"#,
        );
        let topics = extractor(provider).extract("ctx").await;
        assert_eq!(topics.len(), 3);
        assert_eq!(topics[0], Topic::new("AI", 0.4));
        assert_eq!(topics[1].weight, 0.3);
        assert!((weight_sum(&topics) - 1.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_provider_topics_truncated_to_ten() {
        let items: Vec<String> = (0..14)
            .map(|i| format!(r#"{{"topic":"T{}","weight":0.5}}"#, i))
            .collect();
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_ok(SCHEMA_NAME, &format!(r#"{{"topics":[{}]}}"#, items.join(",")));
        let topics = extractor(provider).extract("ctx").await;
        assert_eq!(topics.len(), MAX_TOPICS);
        assert_eq!(topics[9].topic, "T9");
        assert!(topics.iter().all(|t| t.weight == 0.1));
    }

    #[tokio::test]
    async fn test_out_of_range_weight_falls_back() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_ok(SCHEMA_NAME, r#"{"topics":[{"topic":"AI","weight":3.0}]}"#);
        let topics = extractor(provider).extract("rockets rockets engines").await;
        assert_eq!(topics[0].topic, "Rockets");
    }

    #[tokio::test]
    async fn test_upstream_error_falls_back() {
        let provider = Arc::new(ScriptedProvider::new());
        provider.push_err(SCHEMA_NAME, UpstreamError::Timeout(std::time::Duration::from_secs(1)));
        let topics = extractor(provider).extract("").await;
        assert_eq!(topics, vec![Topic::new("General Interest", 1.0)]);
    }

    #[test]
    fn test_zero_total_left_unchanged() {
        let topics = vec![Topic::new("A", 0.0), Topic::new("B", 0.0)];
        assert_eq!(normalize_weights(topics.clone()), topics);
    }

    #[test]
    fn test_fallback_counts_and_orders() {
        let context = "Rockets and rockets. Engines for rockets; engines, orbit.";
        let topics = fallback_topics(context);
        let names: Vec<&str> = topics.iter().map(|t| t.topic.as_str()).collect();
        assert_eq!(names, vec!["Rockets", "Engines", "Orbit"]);
        assert_eq!(topics[0].weight, 0.5);
        assert_eq!(topics[1].weight, 0.333);
        assert_eq!(topics[2].weight, 0.167);
    }

    #[test]
    fn test_fallback_caps_at_eight() {
        let context = "alpha bravo charlie delta echoes foxtrot golfing hotel india juliet kilo lima";
        let topics = fallback_topics(context);
        assert_eq!(topics.len(), 8);
        assert_eq!(topics[0].topic, "Alpha");
        assert!((weight_sum(&topics) - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_fallback_ignores_placeholder_vocabulary() {
        let subject = Subject::parse("someone").unwrap();
        let topics = fallback_topics(&placeholder_context(&subject));
        assert!(topics
            .iter()
            .all(|t| !["Mock", "Context", "Placeholder", "Search"].contains(&t.topic.as_str())));
    }

    #[test]
    fn test_fallback_without_words() {
        assert_eq!(
            fallback_topics("a an the 42 !!"),
            vec![Topic::new("General Interest", 1.0)]
        );
    }

    #[test]
    fn test_fallback_weights_in_unit_range() {
        let topics = fallback_topics("Lots of words here about quantum computing and quantum physics research");
        assert!(!topics.is_empty() && topics.len() <= MAX_TOPICS);
        assert!(topics.iter().all(|t| (0.0..=1.0).contains(&t.weight)));
        assert!((weight_sum(&topics) - 1.0).abs() < 0.01);
    }
}
