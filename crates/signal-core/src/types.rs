use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{SignalError, SignalResult};

fn is_valid_price(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

/// Current OHLCV observation for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceSnapshot {
    /// Checks `high >= max(open, close) >= min(open, close) >= low`, all non-negative.
    pub fn validate(&self) -> SignalResult<()> {
        let fields = [self.open, self.high, self.low, self.close, self.volume];
        if !fields.iter().all(|v| is_valid_price(*v)) {
            return Err(SignalError::InvalidData(format!(
                "{} snapshot has negative or non-finite fields",
                self.symbol
            )));
        }
        let body_high = self.open.max(self.close);
        let body_low = self.open.min(self.close);
        if self.high < body_high || body_low < self.low {
            return Err(SignalError::InvalidData(format!(
                "{} snapshot violates OHLC ordering (o={} h={} l={} c={})",
                self.symbol, self.open, self.high, self.low, self.close
            )));
        }
        Ok(())
    }
}

/// A single close in a price series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub close: f64,
}

/// Price oracle payload: oldest-first closes plus the current snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSeries {
    pub snapshot: PriceSnapshot,
    pub points: Vec<PricePoint>,
}

impl PriceSeries {
    pub fn validate(&self) -> SignalResult<()> {
        self.snapshot.validate()?;
        if let Some(bad) = self.points.iter().find(|p| !is_valid_price(p.close)) {
            return Err(SignalError::InvalidData(format!(
                "{} series has invalid close {} at {}",
                self.snapshot.symbol, bad.close, bad.timestamp
            )));
        }
        if self.points.windows(2).any(|w| w[1].timestamp < w[0].timestamp) {
            return Err(SignalError::InvalidData(format!(
                "{} series is not time-ordered",
                self.snapshot.symbol
            )));
        }
        Ok(())
    }

    pub fn closes(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.close).collect()
    }
}

/// Bar interval requested from a price oracle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BarInterval {
    Minute1,
    Minute5,
    Minute15,
    Hour1,
    Day1,
}

impl BarInterval {
    pub fn to_minutes(&self) -> i64 {
        match self {
            BarInterval::Minute1 => 1,
            BarInterval::Minute5 => 5,
            BarInterval::Minute15 => 15,
            BarInterval::Hour1 => 60,
            BarInterval::Day1 => 1440,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "1m" | "1min" => Some(BarInterval::Minute1),
            "5m" | "5min" => Some(BarInterval::Minute5),
            "15m" | "15min" => Some(BarInterval::Minute15),
            "1h" | "60m" => Some(BarInterval::Hour1),
            "1d" | "daily" => Some(BarInterval::Day1),
            _ => None,
        }
    }
}

/// How much history a price oracle should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LookbackWindow {
    pub periods: usize,
    pub interval: BarInterval,
}

impl LookbackWindow {
    pub fn new(periods: usize, interval: BarInterval) -> Self {
        Self { periods, interval }
    }

    pub fn span(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.interval.to_minutes() * self.periods as i64)
    }
}

/// Named numeric inputs for the forecast model. Ordered so serialization is stable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(BTreeMap<String, f64>);

impl FeatureVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.0.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub base_price: f64,
    pub next_period_price: f64,
    /// Periods after `base_price`, chronological. Empty when unsupported.
    #[serde(default)]
    pub horizon_prices: Vec<f64>,
}

impl ForecastResult {
    pub fn validate(&self) -> SignalResult<()> {
        if !is_valid_price(self.base_price) || !is_valid_price(self.next_period_price) {
            return Err(SignalError::InvalidData(format!(
                "forecast prices out of range (base={}, next={})",
                self.base_price, self.next_period_price
            )));
        }
        if let Some(bad) = self.horizon_prices.iter().find(|p| !is_valid_price(**p)) {
            return Err(SignalError::InvalidData(format!(
                "forecast horizon contains invalid price {bad}"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

/// One scored headline or post that fed the aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentItem {
    pub text: String,
    pub label: SentimentLabel,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub score: f64, // -1.0 to 1.0
    pub sample_count: u32,
    #[serde(default)]
    pub contributing_items: Vec<SentimentItem>,
}

impl SentimentResult {
    /// Neutral-by-default read used when a source had nothing to score.
    pub fn no_data() -> Self {
        Self {
            score: 0.0,
            sample_count: 0,
            contributing_items: Vec::new(),
        }
    }

    pub fn has_samples(&self) -> bool {
        self.sample_count > 0
    }

    pub fn validate(&self) -> SignalResult<()> {
        if !self.score.is_finite() || !(-1.0..=1.0).contains(&self.score) {
            return Err(SignalError::InvalidData(format!(
                "sentiment score {} outside [-1, 1]",
                self.score
            )));
        }
        if self.sample_count == 0 && self.score != 0.0 {
            return Err(SignalError::InvalidData(format!(
                "sentiment score {} reported with zero samples",
                self.score
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Decision {
    Buy,
    Hold,
    Sell,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Buy => "BUY",
            Decision::Hold => "HOLD",
            Decision::Sell => "SELL",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trend {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentClass {
    Positive,
    Negative,
    Neutral,
}

/// Fused trading signal for one cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub decision: Decision,
    pub confidence: f64, // 0.0 to 1.0
    pub price_change_pct: f64,
    pub trend: Trend,
    pub sentiment: SentimentClass,
    pub reasoning: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertKind {
    Price,
    Volatility,
    Sentiment,
    DataQuality,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(
        kind: AlertKind,
        severity: Severity,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            kind,
            severity,
            message: message.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleSource {
    Price,
    Forecast,
    Sentiment,
}

impl OracleSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OracleSource::Price => "price",
            OracleSource::Forecast => "forecast",
            OracleSource::Sentiment => "sentiment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Transient,
    Invalid,
    NoData,
}

/// Why an oracle input is missing (or empty) for a cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleFailure {
    pub source: OracleSource,
    pub kind: FailureKind,
    pub detail: String,
}

impl OracleFailure {
    pub fn new(source: OracleSource, kind: FailureKind, detail: impl Into<String>) -> Self {
        Self {
            source,
            kind,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CycleStatus {
    Ok,
    Partial,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CycleTrigger {
    Scheduled,
    Manual,
}

/// A finalized cycle. Owned by the history store once appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub cycle_id: u64,
    pub timestamp: DateTime<Utc>,
    pub trigger: CycleTrigger,
    pub price_snapshot: Option<PriceSnapshot>,
    pub forecast: Option<ForecastResult>,
    pub sentiment: Option<SentimentResult>,
    pub recommendation: Option<Recommendation>,
    pub alerts: Vec<Alert>,
    #[serde(default)]
    pub failures: Vec<OracleFailure>,
    #[serde(default)]
    pub stale_inputs: Vec<OracleSource>,
    pub status: CycleStatus,
}

impl CycleRecord {
    /// Attach an alert before the record is handed to the store.
    pub fn with_alert(mut self, alert: Alert) -> Self {
        self.alerts.push(alert);
        self
    }
}

/// A cycle in flight. Status is decided only when it is finalized.
#[derive(Debug, Clone)]
pub struct PendingCycle {
    pub cycle_id: u64,
    pub timestamp: DateTime<Utc>,
    pub trigger: CycleTrigger,
    pub price_snapshot: Option<PriceSnapshot>,
    pub forecast: Option<ForecastResult>,
    pub sentiment: Option<SentimentResult>,
    pub recommendation: Option<Recommendation>,
    pub alerts: Vec<Alert>,
    pub failures: Vec<OracleFailure>,
    pub stale_inputs: Vec<OracleSource>,
}

impl PendingCycle {
    pub fn start(cycle_id: u64, timestamp: DateTime<Utc>, trigger: CycleTrigger) -> Self {
        Self {
            cycle_id,
            timestamp,
            trigger,
            price_snapshot: None,
            forecast: None,
            sentiment: None,
            recommendation: None,
            alerts: Vec::new(),
            failures: Vec::new(),
            stale_inputs: Vec::new(),
        }
    }

    pub fn record_failure(&mut self, failure: OracleFailure) {
        self.failures.push(failure);
    }

    /// OK with every input live, PARTIAL when a decision used defaults or
    /// cached inputs, FAILED when no decision could be produced.
    pub fn status(&self) -> CycleStatus {
        let degraded = !self.failures.is_empty() || !self.stale_inputs.is_empty();
        match (&self.recommendation, !degraded) {
            (None, _) => CycleStatus::Failed,
            (Some(_), true) => CycleStatus::Ok,
            (Some(_), false) => CycleStatus::Partial,
        }
    }

    /// Snapshot close, else the forecast's base price.
    pub fn current_price(&self) -> Option<f64> {
        self.price_snapshot
            .as_ref()
            .map(|s| s.close)
            .or_else(|| self.forecast.as_ref().map(|f| f.base_price))
    }

    pub fn finalize(self) -> CycleRecord {
        let status = self.status();
        CycleRecord {
            cycle_id: self.cycle_id,
            timestamp: self.timestamp,
            trigger: self.trigger,
            price_snapshot: self.price_snapshot,
            forecast: self.forecast,
            sentiment: self.sentiment,
            recommendation: self.recommendation,
            alerts: self.alerts,
            failures: self.failures,
            stale_inputs: self.stale_inputs,
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(open: f64, high: f64, low: f64, close: f64) -> PriceSnapshot {
        PriceSnapshot {
            symbol: "GC=F".to_string(),
            timestamp: Utc::now(),
            open,
            high,
            low,
            close,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_snapshot_ordering_invariant() {
        assert!(snapshot(1800.0, 1810.0, 1795.0, 1805.0).validate().is_ok());
        assert!(snapshot(1800.0, 1802.0, 1795.0, 1805.0).validate().is_err());
        assert!(snapshot(1800.0, 1810.0, 1801.0, 1805.0).validate().is_err());
        assert!(snapshot(-1.0, 1810.0, 1795.0, 1805.0).validate().is_err());
    }

    #[test]
    fn test_forecast_rejects_negative_horizon() {
        let forecast = ForecastResult {
            base_price: 1800.0,
            next_period_price: 1810.0,
            horizon_prices: vec![1810.0, -3.0],
        };
        assert!(matches!(forecast.validate(), Err(SignalError::InvalidData(_))));

        let nan = ForecastResult {
            base_price: 1800.0,
            next_period_price: f64::NAN,
            horizon_prices: vec![],
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_sentiment_zero_samples_must_be_neutral() {
        assert!(SentimentResult::no_data().validate().is_ok());
        let bogus = SentimentResult {
            score: 0.4,
            sample_count: 0,
            contributing_items: vec![],
        };
        assert!(bogus.validate().is_err());
        let out_of_range = SentimentResult {
            score: 1.5,
            sample_count: 3,
            contributing_items: vec![],
        };
        assert!(out_of_range.validate().is_err());
    }

    #[test]
    fn test_pending_cycle_status() {
        let mut pending = PendingCycle::start(1, Utc::now(), CycleTrigger::Scheduled);
        assert_eq!(pending.status(), CycleStatus::Failed);

        pending.recommendation = Some(Recommendation {
            decision: Decision::Hold,
            confidence: 0.3,
            price_change_pct: 0.0,
            trend: Trend::Flat,
            sentiment: SentimentClass::Neutral,
            reasoning: vec![],
        });
        assert_eq!(pending.status(), CycleStatus::Ok);

        pending.stale_inputs.push(OracleSource::Price);
        assert_eq!(pending.status(), CycleStatus::Partial);
        pending.stale_inputs.clear();

        pending.record_failure(OracleFailure::new(
            OracleSource::Forecast,
            FailureKind::Transient,
            "timeout",
        ));
        let record = pending.finalize();
        assert_eq!(record.status, CycleStatus::Partial);
        assert_eq!(record.failures.len(), 1);
    }

    #[test]
    fn test_series_must_be_time_ordered() {
        let now = Utc::now();
        let series = PriceSeries {
            snapshot: snapshot(1800.0, 1810.0, 1795.0, 1805.0),
            points: vec![
                PricePoint { timestamp: now, close: 1800.0 },
                PricePoint { timestamp: now - chrono::Duration::minutes(5), close: 1801.0 },
            ],
        };
        assert!(series.validate().is_err());
    }

    #[test]
    fn test_enum_wire_names() {
        assert_eq!(serde_json::to_string(&Decision::Buy).unwrap(), "\"BUY\"");
        assert_eq!(
            serde_json::to_string(&AlertKind::DataQuality).unwrap(),
            "\"DATA_QUALITY\""
        );
        assert_eq!(serde_json::to_string(&CycleStatus::Partial).unwrap(), "\"PARTIAL\"");
    }

    #[test]
    fn test_current_price_falls_back_to_forecast_base() {
        let mut pending = PendingCycle::start(1, Utc::now(), CycleTrigger::Scheduled);
        assert_eq!(pending.current_price(), None);

        pending.forecast = Some(ForecastResult {
            base_price: 1795.0,
            next_period_price: 1800.0,
            horizon_prices: vec![],
        });
        assert_eq!(pending.current_price(), Some(1795.0));

        pending.price_snapshot = Some(snapshot(1800.0, 1810.0, 1795.0, 1805.0));
        assert_eq!(pending.current_price(), Some(1805.0));
    }
}
