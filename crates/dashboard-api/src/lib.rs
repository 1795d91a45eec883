//! Read-only HTTP dashboard over the cycle history, plus the single write
//! path: an on-demand cycle trigger.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    Json, Router,
};
use history_store::HistoryStore;
use serde::Serialize;
use signal_core::{AgentStatus, CycleRecord, SignalError, SignalResult};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

mod headers;
mod routes;
#[cfg(test)]
mod tests;

pub use routes::{signal_routes, HistoryQuery, LatestRecommendation};

/// What the dashboard needs from the running agent.
#[async_trait]
pub trait CycleControl: Send + Sync {
    /// Run a prediction cycle now. Waits for any in-flight cycle first.
    async fn trigger_cycle(&self) -> SignalResult<CycleRecord>;

    async fn status(&self) -> AgentStatus;
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<HistoryStore>,
    pub control: Arc<dyn CycleControl>,
    /// How far back `/api/alerts/active` looks.
    pub alert_window: chrono::Duration,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

pub struct AppError {
    status: StatusCode,
    error: anyhow::Error,
}

impl AppError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: anyhow::anyhow!(message.into()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!("Request failed: {:#}", self.error);
        }
        let body = ApiResponse::<()>::error(self.error.to_string());
        (self.status, Json(body)).into_response()
    }
}

impl From<SignalError> for AppError {
    fn from(err: SignalError) -> Self {
        let status = match err {
            SignalError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            error: err.into(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    signal_routes()
        .layer(middleware::from_fn(headers::dashboard_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serve until `shutdown` resolves, then drain in-flight requests.
pub async fn serve<F>(bind: SocketAddr, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind).await?;
    tracing::info!("Dashboard listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown)
        .await?;

    tracing::info!("Dashboard stopped");
    Ok(())
}
