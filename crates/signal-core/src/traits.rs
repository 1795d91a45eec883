use async_trait::async_trait;
use chrono::Duration;

use crate::{FeatureVector, ForecastResult, LookbackWindow, PriceSeries, SentimentResult, SignalResult};

/// Market data source: a price series plus the current OHLCV snapshot.
#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn fetch(&self, symbol: &str, window: LookbackWindow) -> SignalResult<PriceSeries>;

    fn name(&self) -> &str;
}

/// Forecasting model boundary. Treated as a pure function of its features.
#[async_trait]
pub trait ForecastOracle: Send + Sync {
    async fn predict(&self, features: &FeatureVector) -> SignalResult<ForecastResult>;

    fn name(&self) -> &str;
}

/// Aggregated news sentiment for a topic over a trailing window.
#[async_trait]
pub trait SentimentOracle: Send + Sync {
    async fn aggregate(&self, topic: &str, window: Duration) -> SignalResult<SentimentResult>;

    fn name(&self) -> &str;
}
