use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use signal_core::{Alert, AgentStatus, CycleRecord, CycleStatus, Recommendation};

use crate::{ApiResponse, AppError, AppState};

const DEFAULT_HISTORY_LEN: usize = 20;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Number of cycles to return, newest first (default: 20)
    pub n: Option<usize>,
}

/// Newest decision plus the cycle context it came from.
#[derive(Debug, Serialize, Deserialize)]
pub struct LatestRecommendation {
    pub cycle_id: u64,
    pub timestamp: DateTime<Utc>,
    pub status: CycleStatus,
    pub current_price: Option<f64>,
    pub recommendation: Option<Recommendation>,
    pub alert_count: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub records: usize,
    pub latest_cycle: Option<u64>,
}

pub fn signal_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/api/recommendation/latest", get(latest_recommendation))
        .route("/api/history", get(history))
        .route("/api/alerts/active", get(active_alerts))
        .route("/api/status", get(status))
        .route("/api/cycles/trigger", post(trigger_cycle))
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let latest_cycle = state.store.latest().await.map(|r| r.cycle_id);
    Json(HealthResponse {
        status: "ok".to_string(),
        records: state.store.len().await,
        latest_cycle,
    })
}

async fn latest_recommendation(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<LatestRecommendation>>, AppError> {
    let record = state
        .store
        .latest()
        .await
        .ok_or_else(|| AppError::not_found("No cycles recorded yet"))?;

    let current_price = record
        .price_snapshot
        .as_ref()
        .map(|s| s.close)
        .or_else(|| record.forecast.as_ref().map(|f| f.base_price));

    Ok(Json(ApiResponse::success(LatestRecommendation {
        cycle_id: record.cycle_id,
        timestamp: record.timestamp,
        status: record.status,
        current_price,
        alert_count: record.alerts.len(),
        recommendation: record.recommendation,
    })))
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> Json<ApiResponse<Vec<CycleRecord>>> {
    let n = query
        .n
        .unwrap_or(DEFAULT_HISTORY_LEN)
        .min(state.store.retention());
    Json(ApiResponse::success(state.store.recent(n).await))
}

async fn active_alerts(State(state): State<AppState>) -> Json<ApiResponse<Vec<Alert>>> {
    let since = Utc::now() - state.alert_window;
    Json(ApiResponse::success(state.store.active_alerts(since).await))
}

async fn status(State(state): State<AppState>) -> Json<ApiResponse<AgentStatus>> {
    Json(ApiResponse::success(state.control.status().await))
}

async fn trigger_cycle(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<CycleRecord>>, AppError> {
    tracing::info!("Manual cycle requested via dashboard");
    let record = state.control.trigger_cycle().await?;
    Ok(Json(ApiResponse::success(record)))
}
