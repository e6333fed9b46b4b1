//! HTTP routes for the simulator API

use std::any::Any as PanicPayload;
use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{HeaderMap, HeaderValue},
    response::Json,
    routing::{get, post},
    Router,
};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use algo_sim::political::PoliticalAnalysis;
use algo_sim::{AnalysisResponse, InsightsResponse, Subject};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SubjectRequest {
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Serialize)]
struct RootMessage {
    message: &'static str,
}

pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/analyze", post(analyze))
        .route("/insights", post(insights))
        .route("/political-analysis", post(political_analysis))
        .layer(cors_layer(allowed_origins))
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root() -> Json<RootMessage> {
    Json(RootMessage { message: "X Algorithm Simulator API" })
}

/// Validate, authenticate and rate-check, in that order. A body that does
/// not decode counts as invalid input.
fn admit(
    state: &AppState,
    headers: &HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: Result<Json<SubjectRequest>, JsonRejection>,
) -> Result<Subject, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::InvalidInput(rejection.body_text()))?;
    let subject = Subject::parse(&body.username)?;
    state.authorize(headers)?;
    state.admit(headers, peer.map(|ConnectInfo(addr)| addr.ip()))?;
    Ok(subject)
}

async fn analyze(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<SubjectRequest>, JsonRejection>,
) -> Result<Json<AnalysisResponse>, ApiError> {
    let subject = admit(&state, &headers, peer, body)?;
    tracing::info!(subject = %subject, "Analyzing");

    guarded("Analysis", state.simulator.analyze(&subject))
        .await
        .map(Json)
}

async fn insights(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<SubjectRequest>, JsonRejection>,
) -> Result<Json<InsightsResponse>, ApiError> {
    let subject = admit(&state, &headers, peer, body)?;
    tracing::info!(subject = %subject, "Generating quick insights");

    guarded("Insight generation", state.simulator.insights(&subject))
        .await
        .map(Json)
}

async fn political_analysis(
    State(state): State<AppState>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Result<Json<SubjectRequest>, JsonRejection>,
) -> Result<Json<PoliticalAnalysis>, ApiError> {
    let subject = admit(&state, &headers, peer, body)?;
    tracing::info!(subject = %subject, "Generating political analysis");

    guarded("Political analysis", state.simulator.political_analysis(&subject))
        .await
        .map(Json)
}

/// Run a pipeline, turning an escaped panic into a 500.
pub async fn guarded<F, T>(operation: &'static str, pipeline: F) -> Result<T, ApiError>
where
    F: Future<Output = T>,
{
    AssertUnwindSafe(pipeline)
        .catch_unwind()
        .await
        .map_err(|payload| ApiError::Internal {
            operation,
            message: panic_message(payload.as_ref()),
        })
}

fn panic_message(payload: &(dyn PanicPayload + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unexpected error".to_string()
    }
}
