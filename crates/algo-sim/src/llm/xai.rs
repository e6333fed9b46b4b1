//! xAI chat completions client (OpenAI-compatible wire format).

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use super::{ChatCompletion, ChatProvider, ChatRequest, TokenUsage};
use crate::config::ProviderSettings;
use crate::error::{UpstreamError, UpstreamResult};

pub struct XaiProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

impl XaiProvider {
    pub fn new(settings: &ProviderSettings) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()?;

        tracing::info!(
            base_url = %settings.base_url,
            connect_timeout_secs = settings.connect_timeout_secs,
            "Creating XaiProvider"
        );

        Ok(Self {
            api_key: settings.api_key.clone(),
            base_url: settings.base_url.clone(),
            client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn request_body(request: &ChatRequest) -> JsonValue {
        let mut body = json!({
            "model": request.model,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(schema) = &request.response_format {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": schema.name,
                    "schema": schema.schema,
                    "strict": true,
                }
            });
        }

        if let Some(search) = &request.search {
            body["tools"] = json!([{
                "type": "x_search",
                "from_date": search.from_date.format("%Y-%m-%d").to_string(),
                "to_date": search.to_date.format("%Y-%m-%d").to_string(),
                "enable_image_understanding": search.enable_image_understanding,
                "enable_video_understanding": search.enable_video_understanding,
            }]);
        }

        body
    }

    /// Parse a response body as JSON, returning a clear error if the server returned HTML.
    fn decode_body<T: serde::de::DeserializeOwned>(
        body: &str,
        status: u16,
        endpoint: &str,
    ) -> UpstreamResult<T> {
        let trimmed = body.trim_start();
        if trimmed.starts_with('<') {
            let preview: String = trimmed.chars().take(200).collect();
            return Err(UpstreamError::Protocol(format!(
                "{} returned HTML instead of JSON (HTTP {}): {}",
                endpoint, status, preview
            )));
        }
        serde_json::from_str::<T>(body).map_err(|e| {
            let preview: String = body.chars().take(300).collect();
            UpstreamError::Protocol(format!(
                "failed to parse JSON from {} (HTTP {}): {}. Body: {}",
                endpoint, status, e, preview
            ))
        })
    }

    fn classify(error: reqwest::Error, endpoint: &str, budget: Duration) -> UpstreamError {
        if error.is_timeout() {
            UpstreamError::Timeout(budget)
        } else if error.is_connect() {
            UpstreamError::Connect {
                endpoint: endpoint.to_string(),
                message: error.to_string(),
            }
        } else if error.is_decode() || error.is_body() {
            UpstreamError::Protocol(error.to_string())
        } else {
            UpstreamError::Other(format!("request to {} failed: {}", endpoint, error))
        }
    }
}

#[async_trait]
impl ChatProvider for XaiProvider {
    async fn complete(&self, request: ChatRequest) -> UpstreamResult<ChatCompletion> {
        let endpoint = self.endpoint();
        let body = Self::request_body(&request);

        let response = self
            .client
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::classify(e, &endpoint, request.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| Self::classify(e, &endpoint, request.timeout))?;

        if !status.is_success() {
            let preview: String = text.chars().take(500).collect();
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                body: preview,
            });
        }

        let parsed: CompletionResponse = Self::decode_body(&text, status.as_u16(), &endpoint)?;
        parsed.into_completion()
    }

    fn name(&self) -> &str {
        "xai"
    }
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<CompletionChoice>,
    #[serde(default)]
    usage: Option<CompletionUsage>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Deserialize)]
struct CompletionMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Default)]
struct CompletionUsage {
    #[serde(default)]
    completion_tokens: Option<u64>,
    #[serde(default)]
    total_tokens: Option<u64>,
    #[serde(default)]
    completion_tokens_details: Option<CompletionTokensDetails>,
}

#[derive(Deserialize, Default)]
struct CompletionTokensDetails {
    #[serde(default)]
    reasoning_tokens: Option<u64>,
}

impl From<CompletionUsage> for TokenUsage {
    fn from(usage: CompletionUsage) -> Self {
        Self {
            completion_tokens: usage.completion_tokens.unwrap_or(0),
            reasoning_tokens: usage
                .completion_tokens_details
                .and_then(|d| d.reasoning_tokens)
                .unwrap_or(0),
            total_tokens: usage.total_tokens.unwrap_or(0),
        }
    }
}

impl CompletionResponse {
    fn into_completion(self) -> UpstreamResult<ChatCompletion> {
        let usage = self.usage.map(TokenUsage::from).unwrap_or_default();
        let content = self
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| UpstreamError::Protocol("provider returned no message content".into()))?;
        Ok(ChatCompletion { content, usage })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ResponseSchema, SearchTool};

    fn decode(body: &str) -> UpstreamResult<ChatCompletion> {
        XaiProvider::decode_body::<CompletionResponse>(body, 200, "test")?.into_completion()
    }

    #[test]
    fn test_request_body_with_schema() {
        let request = ChatRequest::new("grok-4-fast", Duration::from_secs(5))
            .user("extract topics")
            .with_schema(ResponseSchema::new("topics", json!({"type": "object"})));
        let body = XaiProvider::request_body(&request);
        assert_eq!(body["model"], "grok-4-fast");
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["messages"][0]["content"], "extract topics");
        assert_eq!(body["response_format"]["type"], "json_schema");
        assert_eq!(body["response_format"]["json_schema"]["name"], "topics");
        assert_eq!(body["response_format"]["json_schema"]["strict"], true);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_request_body_with_search() {
        let request = ChatRequest::new("grok-4-fast", Duration::from_secs(5))
            .user("posts by @someone")
            .with_search(SearchTool::recent(30));
        let body = XaiProvider::request_body(&request);
        let tool = &body["tools"][0];
        assert_eq!(tool["type"], "x_search");
        assert_eq!(tool["enable_image_understanding"], true);
        assert_eq!(tool["enable_video_understanding"], true);
        assert_eq!(tool["from_date"].as_str().unwrap().len(), 10);
        assert!(body.get("response_format").is_none());
    }

    #[test]
    fn test_decode_full_usage() {
        let body = r#"{
            "choices": [{"message": {"role": "assistant", "content": "hi"}}],
            "usage": {"prompt_tokens": 5, "completion_tokens": 7, "total_tokens": 40,
                      "completion_tokens_details": {"reasoning_tokens": 28}}
        }"#;
        let completion = decode(body).unwrap();
        assert_eq!(completion.content, "hi");
        assert_eq!(
            completion.usage,
            TokenUsage { completion_tokens: 7, reasoning_tokens: 28, total_tokens: 40 }
        );
    }

    #[test]
    fn test_decode_missing_usage_defaults_to_zero() {
        let body = r#"{"choices": [{"message": {"content": "hi"}}]}"#;
        let completion = decode(body).unwrap();
        assert_eq!(completion.usage, TokenUsage::default());
    }

    #[test]
    fn test_decode_empty_choices_is_protocol_error() {
        let err = decode(r#"{"choices": []}"#).unwrap_err();
        assert!(matches!(err, UpstreamError::Protocol(_)));
    }

    #[test]
    fn test_decode_html_is_protocol_error() {
        let err = decode("<!DOCTYPE html><html>Bad gateway</html>").unwrap_err();
        match err {
            UpstreamError::Protocol(msg) => assert!(msg.contains("HTML")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let settings = ProviderSettings {
            api_key: "xai-test".into(),
            base_url: "https://api.x.ai/v1/".into(),
            connect_timeout_secs: 1,
        };
        let provider = XaiProvider::new(&settings).unwrap();
        assert_eq!(provider.endpoint(), "https://api.x.ai/v1/chat/completions");
    }
}
