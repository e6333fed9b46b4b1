use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

const DEFAULT_BASE_URL: &str = "https://api.x.ai/v1";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8000";
const DEFAULT_ALLOWED_ORIGIN: &str = "http://localhost:3000";
const XAI_KEY_PREFIX: &str = "xai-";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub provider: ProviderSettings,
    pub models: ModelSettings,
    pub cache: CacheSettings,
    pub rate_limit: RateLimitSettings,
    pub server: ServerSettings,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub base_url: String,
    pub connect_timeout_secs: u64,
}

/// Model and time budget for one outbound stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageModel {
    pub model: String,
    pub timeout_secs: u64,
}

impl StageModel {
    pub fn new(model: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            model: model.into(),
            timeout_secs,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    pub context: StageModel,
    pub topics: StageModel,
    pub recommendations: StageModel,
    pub insights: StageModel,
    pub political: StageModel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    pub max_requests: usize,
    pub window_secs: u64,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    pub bind_addr: String,
    /// Shared secret expected in the `X-API-Key` header.
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub allowed_origins: Vec<String>,
}

impl fmt::Debug for ProviderSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSettings")
            .field("api_key", &redact(&self.api_key))
            .field("base_url", &self.base_url)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

impl fmt::Debug for ServerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerSettings")
            .field("bind_addr", &self.bind_addr)
            .field("api_key", &redact(&self.api_key))
            .field("allowed_origins", &self.allowed_origins)
            .finish()
    }
}

/// First four characters followed by an ellipsis, for logs.
pub fn redact(secret: &str) -> String {
    if secret.is_empty() {
        return "<empty>".to_string();
    }
    let prefix: String = secret.chars().take(4).collect();
    format!("{}...", prefix)
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            context: StageModel::new("grok-4-fast", 120),
            topics: StageModel::new("grok-4-fast", 120),
            recommendations: StageModel::new("grok-4-fast-reasoning", 3600),
            insights: StageModel::new("grok-3", 30),
            political: StageModel::new("grok-4-fast-reasoning", 3600),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            provider: ProviderSettings {
                api_key: String::new(),
                base_url: DEFAULT_BASE_URL.to_string(),
                connect_timeout_secs: 15,
            },
            models: ModelSettings::default(),
            cache: CacheSettings {
                ttl_secs: 300,
                max_entries: 100,
            },
            rate_limit: RateLimitSettings {
                max_requests: 10,
                window_secs: 60,
            },
            server: ServerSettings {
                bind_addr: DEFAULT_BIND_ADDR.to_string(),
                api_key: String::new(),
                allowed_origins: vec![DEFAULT_ALLOWED_ORIGIN.to_string()],
            },
        }
    }
}

impl SimulatorConfig {
    /// Load from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup, falling back to defaults for
    /// everything except the two secrets.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        config.provider.api_key = lookup("XAI_API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("XAI_API_KEY environment variable is required and cannot be empty"))?;
        if !config.provider.api_key.starts_with(XAI_KEY_PREFIX) {
            tracing::warn!("XAI_API_KEY does not appear to be a valid xAI key format");
        }

        config.server.api_key = lookup("API_KEY")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| anyhow!("API_KEY environment variable is required and cannot be empty"))?;

        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            let parsed: Vec<String> = origins
                .split(',')
                .map(|o| o.trim().to_string())
                .filter(|o| !o.is_empty())
                .collect();
            if !parsed.is_empty() {
                config.server.allowed_origins = parsed;
            }
        }
        if let Some(addr) = lookup("BIND_ADDR") {
            config.server.bind_addr = addr;
        }
        if let Some(url) = lookup("XAI_BASE_URL") {
            config.provider.base_url = url;
        }

        if let Some(ttl) = parse_var(&lookup, "CACHE_TTL_SECS")? {
            config.cache.ttl_secs = ttl;
        }
        if let Some(max) = parse_var(&lookup, "CACHE_MAX_ENTRIES")? {
            config.cache.max_entries = max;
        }
        if let Some(max) = parse_var(&lookup, "RATE_LIMIT_REQUESTS")? {
            config.rate_limit.max_requests = max;
        }
        if let Some(window) = parse_var(&lookup, "RATE_LIMIT_WINDOW_SECS")? {
            config.rate_limit.window_secs = window;
        }

        config.validate().map_err(|e| anyhow!(e))?;
        Ok(config)
    }

    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.provider.api_key.trim().is_empty() {
            return Err("provider.api_key must not be empty".into());
        }
        if self.server.api_key.trim().is_empty() {
            return Err("server.api_key must not be empty".into());
        }
        if self.cache.ttl_secs == 0 {
            return Err("cache.ttl_secs must be > 0".into());
        }
        if self.cache.max_entries == 0 {
            return Err("cache.max_entries must be > 0".into());
        }
        if self.rate_limit.max_requests == 0 {
            return Err("rate_limit.max_requests must be > 0".into());
        }
        if self.rate_limit.window_secs == 0 {
            return Err("rate_limit.window_secs must be > 0".into());
        }
        let stages = [
            ("context", &self.models.context),
            ("topics", &self.models.topics),
            ("recommendations", &self.models.recommendations),
            ("insights", &self.models.insights),
            ("political", &self.models.political),
        ];
        for (name, stage) in stages {
            if stage.model.trim().is_empty() {
                return Err(format!("models.{}.model must not be empty", name));
            }
            if stage.timeout_secs == 0 {
                return Err(format!("models.{}.timeout_secs must be > 0", name));
            }
        }
        Ok(())
    }
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .with_context(|| format!("{} must be a non-negative integer, got {:?}", key, raw)),
        None => Ok(None),
    }
}
