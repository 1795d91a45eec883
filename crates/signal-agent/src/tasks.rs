use std::sync::Arc;

use async_trait::async_trait;
use signal_core::{CycleTrigger, OracleSource, SignalResult};

use crate::cycle::CycleRunner;
use crate::scheduler::{PeriodicTask, TaskOutcome};

pub struct MarketRefreshTask {
    runner: Arc<CycleRunner>,
}

impl MarketRefreshTask {
    pub fn new(runner: Arc<CycleRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl PeriodicTask for MarketRefreshTask {
    fn name(&self) -> &str {
        "market_refresh"
    }

    async fn run(&self, _trigger: CycleTrigger) -> SignalResult<TaskOutcome> {
        self.runner.refresh_market().await?;
        Ok(TaskOutcome::Refreshed(OracleSource::Price))
    }
}

pub struct SentimentRefreshTask {
    runner: Arc<CycleRunner>,
}

impl SentimentRefreshTask {
    pub fn new(runner: Arc<CycleRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl PeriodicTask for SentimentRefreshTask {
    fn name(&self) -> &str {
        "sentiment_refresh"
    }

    async fn run(&self, _trigger: CycleTrigger) -> SignalResult<TaskOutcome> {
        self.runner.refresh_sentiment().await?;
        Ok(TaskOutcome::Refreshed(OracleSource::Sentiment))
    }
}

pub struct PredictionTask {
    runner: Arc<CycleRunner>,
}

impl PredictionTask {
    pub fn new(runner: Arc<CycleRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl PeriodicTask for PredictionTask {
    fn name(&self) -> &str {
        "prediction"
    }

    async fn run(&self, trigger: CycleTrigger) -> SignalResult<TaskOutcome> {
        let record = self.runner.run_once(trigger).await;
        Ok(TaskOutcome::Cycle(Box::new(record)))
    }
}
