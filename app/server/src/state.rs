use std::net::IpAddr;
use std::sync::Arc;

use axum::http::HeaderMap;
use subtle::ConstantTimeEq;

use algo_sim::config::redact;
use algo_sim::rate_limit::caller_identity;
use algo_sim::{ChatProvider, RateLimiter, Simulator, SimulatorConfig};

use crate::error::ApiError;

pub const API_KEY_HEADER: &str = "x-api-key";

#[derive(Clone)]
pub struct AppState {
    pub simulator: Arc<Simulator>,
    pub limiter: Arc<RateLimiter>,
    api_key: Arc<str>,
}

impl AppState {
    pub fn new(simulator: Arc<Simulator>, limiter: Arc<RateLimiter>, api_key: &str) -> Self {
        Self { simulator, limiter, api_key: Arc::from(api_key) }
    }

    pub fn from_config(provider: Arc<dyn ChatProvider>, config: &SimulatorConfig) -> Self {
        Self::new(
            Arc::new(Simulator::new(provider, config)),
            Arc::new(RateLimiter::from_settings(&config.rate_limit)),
            &config.server.api_key,
        )
    }

    /// Check the `X-API-Key` header against the shared secret. The raw
    /// header bytes must match exactly; comparison is constant-time.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let Some(presented) = headers.get(API_KEY_HEADER) else {
            tracing::warn!("Rejected request without API key");
            return Err(ApiError::Unauthorized);
        };

        let expected = self.api_key.as_bytes();
        if !expected.is_empty() && bool::from(presented.as_bytes().ct_eq(expected)) {
            return Ok(());
        }

        let shown = presented.to_str().map(redact).unwrap_or_else(|_| "<non-ascii>".to_string());
        tracing::warn!(key = %shown, "Rejected request with invalid API key");
        Err(ApiError::Unauthorized)
    }

    pub fn admit(&self, headers: &HeaderMap, peer: Option<IpAddr>) -> Result<(), ApiError> {
        let caller = caller_identity(presented_key(headers), peer);
        if self.limiter.admit(&caller) {
            Ok(())
        } else {
            Err(ApiError::RateLimited {
                limit: self.limiter.max_requests(),
                window_secs: self.limiter.window().as_secs(),
            })
        }
    }
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;
    use std::time::Duration;

    struct Unreachable;

    #[async_trait::async_trait]
    impl ChatProvider for Unreachable {
        async fn complete(
            &self,
            _request: algo_sim::llm::ChatRequest,
        ) -> algo_sim::UpstreamResult<algo_sim::llm::ChatCompletion> {
            Err(algo_sim::UpstreamError::Other("unreachable".into()))
        }

        fn name(&self) -> &str {
            "unreachable"
        }
    }

    fn state(limit: usize) -> AppState {
        let config = SimulatorConfig::from_lookup(|name| match name {
            "XAI_API_KEY" => Some("xai-test".to_string()),
            "API_KEY" => Some("secret".to_string()),
            _ => None,
        })
        .unwrap();
        let simulator = Arc::new(Simulator::new(Arc::new(Unreachable), &config));
        AppState::new(simulator, Arc::new(RateLimiter::new(limit, Duration::from_secs(60))), "secret")
    }

    fn headers(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_str(key).unwrap());
        headers
    }

    #[test]
    fn test_authorize() {
        let state = state(10);
        assert!(state.authorize(&headers("secret")).is_ok());
        assert!(matches!(state.authorize(&headers("wrong")), Err(ApiError::Unauthorized)));
        assert!(matches!(state.authorize(&HeaderMap::new()), Err(ApiError::Unauthorized)));
        assert!(matches!(state.authorize(&headers("   ")), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_authorize_requires_exact_bytes() {
        let state = state(10);
        assert!(matches!(state.authorize(&headers(" secret ")), Err(ApiError::Unauthorized)));
        assert!(matches!(state.authorize(&headers("secret ")), Err(ApiError::Unauthorized)));
        assert!(matches!(state.authorize(&headers("secre")), Err(ApiError::Unauthorized)));
        assert!(matches!(state.authorize(&headers("secrets")), Err(ApiError::Unauthorized)));
    }

    #[test]
    fn test_admit_reports_configured_limit() {
        let state = state(2);
        let h = headers("secret");
        assert!(state.admit(&h, None).is_ok());
        assert!(state.admit(&h, None).is_ok());
        match state.admit(&h, None) {
            Err(ApiError::RateLimited { limit, window_secs }) => {
                assert_eq!(limit, 2);
                assert_eq!(window_secs, 60);
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
    }

    #[test]
    fn test_callers_limited_independently() {
        let state = state(1);
        assert!(state.admit(&headers("one"), None).is_ok());
        assert!(state.admit(&headers("two"), None).is_ok());
        assert!(state.admit(&headers("one"), None).is_err());
    }
}
