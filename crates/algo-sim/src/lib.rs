//! X algorithm simulator core.
//!
//! Gathers a subject's recent activity through a search-augmented chat call,
//! extracts weighted topics and produces structured reports. Every outbound
//! call is bounded and fails open to a deterministic fallback.

pub mod cache;
pub mod config;
pub mod error;
pub mod gatherer;
pub mod insights;
pub mod llm;
pub mod political;
pub mod rate_limit;
pub mod report;
pub mod simulator;
pub mod subject;
pub mod topics;

pub use cache::ContextCache;
pub use config::SimulatorConfig;
pub use error::{UpstreamError, UpstreamResult};
pub use llm::{ChatProvider, TokenUsage, XaiProvider};
pub use rate_limit::RateLimiter;
pub use simulator::{AnalysisResponse, InsightsResponse, Simulator};
pub use subject::{Subject, SubjectError};
pub use topics::Topic;
