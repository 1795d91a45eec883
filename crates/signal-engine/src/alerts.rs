use chrono::{DateTime, Utc};
use signal_core::{
    Alert, AlertKind, ForecastResult, OracleFailure, OracleSource, PriceSnapshot, Recommendation,
    SentimentResult, Severity, SignalConfig,
};

use crate::volatility::{VolatilityReading, VolatilitySource};

/// Everything one cycle produced that the alert rules look at.
#[derive(Debug, Clone, Copy)]
pub struct AlertInputs<'a> {
    pub snapshot: Option<&'a PriceSnapshot>,
    pub forecast: Option<&'a ForecastResult>,
    pub sentiment: Option<&'a SentimentResult>,
    pub recommendation: Option<&'a Recommendation>,
    pub volatility: Option<VolatilityReading>,
    pub failures: &'a [OracleFailure],
    /// Sources whose live fetch failed and were served from cache instead.
    pub stale_inputs: &'a [OracleSource],
    /// Cycle timestamp; stamped on every alert so evaluation stays deterministic.
    pub timestamp: DateTime<Utc>,
}

/// Threshold evaluator. Rules run in a fixed order: PRICE, VOLATILITY,
/// SENTIMENT, DATA_QUALITY.
pub struct AlertEngine {
    config: SignalConfig,
}

impl AlertEngine {
    pub fn new(config: SignalConfig) -> Self {
        Self { config }
    }

    pub fn evaluate(&self, inputs: &AlertInputs<'_>) -> Vec<Alert> {
        let mut alerts = Vec::new();
        self.check_price(inputs, &mut alerts);
        self.check_volatility(inputs, &mut alerts);
        self.check_sentiment(inputs, &mut alerts);
        self.check_data_quality(inputs, &mut alerts);

        for alert in &alerts {
            tracing::debug!(kind = ?alert.kind, severity = ?alert.severity, "{}", alert.message);
        }
        alerts
    }

    fn check_price(&self, inputs: &AlertInputs<'_>, alerts: &mut Vec<Alert>) {
        let bounds = self.config.price_bounds;
        let candidates = [
            ("Current", inputs.snapshot.map(|s| s.close)),
            ("Forecasted", inputs.forecast.map(|f| f.next_period_price)),
        ];

        for (label, price) in candidates {
            let Some(price) = price else { continue };
            if !bounds.is_outside(price) {
                continue;
            }
            let side = if price >= bounds.high { "HIGH" } else { "LOW" };
            alerts.push(Alert::new(
                AlertKind::Price,
                Severity::Warning,
                format!(
                    "{side}: {label} price {price:.2} outside plausible range [{:.2}, {:.2}]",
                    bounds.low, bounds.high
                ),
                inputs.timestamp,
            ));
        }
    }

    fn check_volatility(&self, inputs: &AlertInputs<'_>, alerts: &mut Vec<Alert>) {
        let Some(reading) = inputs.volatility else { return };
        let Some(ratio) = reading.ratio() else { return };
        let multipliers = self.config.volatility_multiplier;

        let severity = if ratio > multipliers.critical {
            Severity::Critical
        } else if ratio > multipliers.warning {
            Severity::Warning
        } else {
            return;
        };

        let scope = match reading.source {
            VolatilitySource::RecentWindow => "recent price window",
            VolatilitySource::ForecastHorizon => "forecast horizon",
            VolatilitySource::PredictionHistory => "prediction history",
        };
        alerts.push(Alert::new(
            AlertKind::Volatility,
            severity,
            format!(
                "HIGH VOLATILITY: {scope} dispersion {:.4} is {ratio:.2}x baseline {:.4}",
                reading.current, reading.baseline
            ),
            inputs.timestamp,
        ));
    }

    fn check_sentiment(&self, inputs: &AlertInputs<'_>, alerts: &mut Vec<Alert>) {
        let Some(sentiment) = inputs.sentiment else { return };
        if sentiment.score.abs() <= self.config.strong_sentiment_threshold {
            return;
        }

        let direction = if sentiment.score > 0.0 { "POSITIVE" } else { "NEGATIVE" };
        let context = inputs
            .recommendation
            .map(|r| format!(" alongside {} signal", r.decision.as_str()))
            .unwrap_or_default();
        alerts.push(Alert::new(
            AlertKind::Sentiment,
            Severity::Info,
            format!(
                "{direction} SENTIMENT: score {:+.2} from {} samples{context}",
                sentiment.score, sentiment.sample_count
            ),
            inputs.timestamp,
        ));
    }

    fn check_data_quality(&self, inputs: &AlertInputs<'_>, alerts: &mut Vec<Alert>) {
        // Ordered and de-duplicated by source.
        let mut degraded: Vec<(OracleSource, String)> = Vec::new();
        for failure in inputs.failures {
            if degraded.iter().all(|(source, _)| *source != failure.source) {
                let detail = format!(
                    "{} ({:?}: {})",
                    failure.source.as_str(),
                    failure.kind,
                    failure.detail
                );
                degraded.push((failure.source, detail));
            }
        }
        for source in inputs.stale_inputs {
            if degraded.iter().all(|(s, _)| s != source) {
                degraded.push((*source, format!("{} (served from cache)", source.as_str())));
            }
        }
        if let Some(sentiment) = inputs.sentiment {
            let already = degraded.iter().any(|(s, _)| *s == OracleSource::Sentiment);
            if !sentiment.has_samples() && !already {
                degraded.push((OracleSource::Sentiment, "sentiment (no samples)".to_string()));
            }
        }
        if degraded.is_empty() {
            return;
        }

        let severity = if degraded.len() >= 2 {
            Severity::Critical
        } else {
            Severity::Warning
        };
        let detail: Vec<String> = degraded.into_iter().map(|(_, d)| d).collect();
        alerts.push(Alert::new(
            AlertKind::DataQuality,
            severity,
            format!("Degraded inputs: {}", detail.join("; ")),
            inputs.timestamp,
        ));
    }
}
