use serde::{Deserialize, Serialize};
use signal_core::stats::{simple_returns, std_dev};
use signal_core::ForecastResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilitySource {
    RecentWindow,
    ForecastHorizon,
    PredictionHistory,
}

/// Predictions per prediction-history reading, current cycle included.
pub const PREDICTION_HISTORY_LEN: usize = 5;

/// Dispersion of returns (population std dev) against the full-window baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityReading {
    pub source: VolatilitySource,
    pub current: f64,
    pub baseline: f64,
}

impl VolatilityReading {
    /// `current / baseline`, or `None` when there is no usable baseline.
    pub fn ratio(&self) -> Option<f64> {
        if self.baseline.is_finite() && self.baseline > 0.0 && self.current.is_finite() {
            Some(self.current / self.baseline)
        } else {
            None
        }
    }

    /// Recent `window` returns against all returns in the series.
    pub fn from_series(closes: &[f64], window: usize) -> Option<Self> {
        let returns = simple_returns(closes);
        if window < 2 || returns.len() <= window {
            return None;
        }
        Some(Self {
            source: VolatilitySource::RecentWindow,
            current: std_dev(&returns[returns.len() - window..]),
            baseline: std_dev(&returns),
        })
    }

    /// Returns along `[base_price, horizon...]` against an externally supplied baseline.
    pub fn from_horizon(forecast: &ForecastResult, baseline: f64) -> Option<Self> {
        let path: Vec<f64> = std::iter::once(forecast.base_price)
            .chain(forecast.horizon_prices.iter().copied())
            .collect();
        let returns = simple_returns(&path);
        if returns.len() < 2 {
            return None;
        }
        Some(Self {
            source: VolatilitySource::ForecastHorizon,
            current: std_dev(&returns),
            baseline,
        })
    }

    /// Returns between consecutive cycles' next-period predictions, oldest first.
    /// Only the last `PREDICTION_HISTORY_LEN` predictions count.
    pub fn from_predictions(predictions: &[f64], baseline: f64) -> Option<Self> {
        let tail = &predictions[predictions.len().saturating_sub(PREDICTION_HISTORY_LEN)..];
        let returns = simple_returns(tail);
        if returns.len() < 2 {
            return None;
        }
        Some(Self {
            source: VolatilitySource::PredictionHistory,
            current: std_dev(&returns),
            baseline,
        })
    }

    /// The most alarming of the recent-window, forecast-horizon and
    /// prediction-history readings. Ties keep the earlier source.
    pub fn assess(
        closes: &[f64],
        forecast: Option<&ForecastResult>,
        predictions: &[f64],
        window: usize,
    ) -> Option<Self> {
        let baseline = std_dev(&simple_returns(closes));
        [
            Self::from_series(closes, window),
            forecast.and_then(|f| Self::from_horizon(f, baseline)),
            Self::from_predictions(predictions, baseline),
        ]
        .into_iter()
        .flatten()
        .fold(None, |best: Option<Self>, reading| match best {
            Some(b) if b.ratio().unwrap_or(0.0) >= reading.ratio().unwrap_or(0.0) => Some(b),
            _ => Some(reading),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn calm_then_wild() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..30).map(|i| 100.0 + if i % 2 == 0 { 0.1 } else { -0.1 }).collect();
        for i in 0..10 {
            closes.push(if i % 2 == 0 { 110.0 } else { 95.0 });
        }
        closes
    }

    #[test]
    fn test_recent_spike_raises_ratio() {
        let reading = VolatilityReading::from_series(&calm_then_wild(), 10).unwrap();
        assert_eq!(reading.source, VolatilitySource::RecentWindow);
        assert!(reading.ratio().unwrap() > 1.5);
    }

    #[test]
    fn test_short_series_has_no_reading() {
        assert!(VolatilityReading::from_series(&[100.0, 101.0, 102.0], 10).is_none());
    }

    #[test]
    fn test_zero_baseline_has_no_ratio() {
        let flat = vec![100.0; 30];
        let reading = VolatilityReading::from_series(&flat, 10).unwrap();
        assert_eq!(reading.ratio(), None);
    }

    #[test]
    fn test_assess_prefers_wilder_horizon() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i % 3) as f64 * 0.2).collect();
        let forecast = ForecastResult {
            base_price: 100.0,
            next_period_price: 110.0,
            horizon_prices: vec![110.0, 90.0, 112.0, 88.0],
        };
        let reading = VolatilityReading::assess(&closes, Some(&forecast), &[], 10).unwrap();
        assert_eq!(reading.source, VolatilitySource::ForecastHorizon);
        assert!(reading.ratio().unwrap() > 2.5);
    }

    #[test]
    fn test_erratic_predictions_dominate() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i % 3) as f64 * 0.2).collect();
        let steady = [100.2, 100.3, 100.2, 100.4, 100.3];
        let reading = VolatilityReading::assess(&closes, None, &steady, 10).unwrap();
        assert_eq!(reading.source, VolatilitySource::RecentWindow);

        let erratic = [100.0, 120.0, 90.0, 125.0, 85.0];
        let reading = VolatilityReading::assess(&closes, None, &erratic, 10).unwrap();
        assert_eq!(reading.source, VolatilitySource::PredictionHistory);
        assert!(reading.ratio().unwrap() > 10.0);
    }

    #[test]
    fn test_prediction_history_uses_last_five() {
        // an early outlier falls outside the window
        let predictions = [500.0, 100.0, 100.1, 100.0, 100.1, 100.0];
        let reading = VolatilityReading::from_predictions(&predictions, 0.01).unwrap();
        assert!(reading.current < 0.002);
        assert!(VolatilityReading::from_predictions(&[100.0, 101.0], 0.01).is_none());
    }
}
