use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashboard_api::CycleControl;
use signal_core::{AgentStatus, CycleRecord, SignalError, SignalResult};

use crate::metrics::AgentMetrics;
use crate::scheduler::{TaskHandle, TaskOutcome, TaskScheduler};

/// The dashboard's view of the running agent.
pub struct AgentControl {
    symbol: String,
    started_at: DateTime<Utc>,
    prediction: TaskHandle,
    scheduler: Arc<TaskScheduler>,
    metrics: Arc<AgentMetrics>,
}

impl AgentControl {
    pub fn new(
        symbol: impl Into<String>,
        prediction: TaskHandle,
        scheduler: Arc<TaskScheduler>,
        metrics: Arc<AgentMetrics>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            started_at: Utc::now(),
            prediction,
            scheduler,
            metrics,
        }
    }
}

#[async_trait]
impl CycleControl for AgentControl {
    async fn trigger_cycle(&self) -> SignalResult<CycleRecord> {
        match self.prediction.run_now().await? {
            TaskOutcome::Cycle(record) => Ok(*record),
            TaskOutcome::Refreshed(_) => Err(SignalError::Configuration(
                "manual trigger is not bound to the prediction task".to_string(),
            )),
        }
    }

    async fn status(&self) -> AgentStatus {
        AgentStatus {
            symbol: self.symbol.clone(),
            started_at: self.started_at,
            tasks: self.scheduler.statuses().await,
            metrics: self.metrics.snapshot(),
        }
    }
}
