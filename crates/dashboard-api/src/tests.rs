use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
};
use chrono::{Duration, Utc};
use history_store::HistoryStore;
use serde_json::Value;
use signal_core::{
    AgentStatus, Alert, AlertKind, CycleRecord, CycleTrigger, Decision, MetricsSnapshot,
    PendingCycle, Recommendation, SentimentClass, Severity, SignalError, SignalResult, TaskStatus,
    Trend,
};
use tower::ServiceExt;

use crate::{build_router, AppState, CycleControl};

struct StubControl {
    store: Arc<HistoryStore>,
    fail: bool,
}

fn hold() -> Recommendation {
    Recommendation {
        decision: Decision::Hold,
        confidence: 0.3,
        price_change_pct: 0.1,
        trend: Trend::Flat,
        sentiment: SentimentClass::Neutral,
        reasoning: vec!["Trend FLAT".to_string()],
    }
}

fn record(store: &HistoryStore, trigger: CycleTrigger, with_alert: bool) -> CycleRecord {
    let now = Utc::now();
    let mut pending = PendingCycle::start(store.next_cycle_id(), now, trigger);
    pending.recommendation = Some(hold());
    if with_alert {
        pending.alerts.push(Alert::new(
            AlertKind::Volatility,
            Severity::Warning,
            "HIGH VOLATILITY",
            now,
        ));
    }
    pending.finalize()
}

#[async_trait]
impl CycleControl for StubControl {
    async fn trigger_cycle(&self) -> SignalResult<CycleRecord> {
        if self.fail {
            return Err(SignalError::Transient("forecast service unreachable".to_string()));
        }
        let r = record(&self.store, CycleTrigger::Manual, false);
        self.store.append(r.clone()).await?;
        Ok(r)
    }

    async fn status(&self) -> AgentStatus {
        AgentStatus {
            symbol: "GC=F".to_string(),
            started_at: Utc::now(),
            tasks: vec![TaskStatus::new("prediction", 300)],
            metrics: MetricsSnapshot::default(),
        }
    }
}

async fn state(fail: bool) -> AppState {
    let store = Arc::new(HistoryStore::open("sqlite::memory:", 50, 1).await.unwrap());
    AppState {
        control: Arc::new(StubControl {
            store: store.clone(),
            fail,
        }),
        store,
        alert_window: Duration::hours(1),
    }
}

async fn call(state: AppState, method: &str, uri: &str) -> (StatusCode, Value) {
    let response = build_router(state)
        .oneshot(
            Request::builder()
                .method(method)
                .uri(uri)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_latest_without_history_is_404() {
    let (status, body) = call(state(false).await, "GET", "/api/recommendation/latest").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn test_latest_recommendation() {
    let state = state(false).await;
    let r = record(&state.store, CycleTrigger::Scheduled, false);
    state.store.append(r).await.unwrap();

    let (status, body) = call(state, "GET", "/api/recommendation/latest").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cycle_id"], 1);
    assert_eq!(body["data"]["status"], "OK");
    assert_eq!(body["data"]["recommendation"]["decision"], "HOLD");
}

#[tokio::test]
async fn test_history_newest_first_and_bounded_by_n() {
    let state = state(false).await;
    for _ in 0..4 {
        let r = record(&state.store, CycleTrigger::Scheduled, false);
        state.store.append(r).await.unwrap();
    }

    let (status, body) = call(state, "GET", "/api/history?n=2").await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<u64> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["cycle_id"].as_u64().unwrap())
        .collect();
    assert_eq!(ids, vec![4, 3]);
}

#[tokio::test]
async fn test_active_alerts() {
    let state = state(false).await;
    let r = record(&state.store, CycleTrigger::Scheduled, true);
    state.store.append(r).await.unwrap();

    let (_, body) = call(state, "GET", "/api/alerts/active").await;
    let alerts = body["data"].as_array().unwrap();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0]["kind"], "VOLATILITY");
    assert_eq!(alerts[0]["severity"], "WARNING");
}

#[tokio::test]
async fn test_trigger_appends_manual_cycle() {
    let state = state(false).await;
    let store = state.store.clone();

    let (status, body) = call(state, "POST", "/api/cycles/trigger").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["trigger"], "manual");
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn test_trigger_failure_maps_to_503() {
    let (status, body) = call(state(true).await, "POST", "/api/cycles/trigger").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].as_str().unwrap().contains("unreachable"));
}

#[tokio::test]
async fn test_status_and_health() {
    let (status, body) = call(state(false).await, "GET", "/api/status").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tasks"][0]["state"], "IDLE");

    let (status, body) = call(state(false).await, "GET", "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["records"], 0);
}
