use signal_core::stats::{simple_returns, std_dev};
use signal_core::{FeatureVector, PriceSeries};

const SHORT_PERIOD: usize = 5;
const LONG_PERIOD: usize = 20;

/// Trailing mean of the last `period` values.
fn trailing_sma(data: &[f64], period: usize) -> Option<f64> {
    if period == 0 || data.len() < period {
        return None;
    }
    let window = &data[data.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Derive the forecast oracle's input from a price series.
///
/// Always carries the snapshot OHLCV. Derived indicators are only present
/// when the series is long enough to compute them.
pub fn build_features(series: &PriceSeries) -> FeatureVector {
    let snap = &series.snapshot;
    let mut features = FeatureVector::new();
    features.insert("close", snap.close);
    features.insert("open", snap.open);
    features.insert("high", snap.high);
    features.insert("low", snap.low);
    features.insert("volume", snap.volume);
    if snap.close > 0.0 {
        features.insert("range_pct", (snap.high - snap.low) / snap.close * 100.0);
    }

    let closes = series.closes();
    let returns = simple_returns(&closes);

    if let Some(last) = returns.last() {
        features.insert("return_1", *last);
    }
    if let Some(sma) = trailing_sma(&closes, SHORT_PERIOD) {
        features.insert("sma_5", sma);
    }
    if let Some(sma) = trailing_sma(&closes, LONG_PERIOD) {
        features.insert("sma_20", sma);
        if sma > 0.0 {
            features.insert("close_to_sma_20", snap.close / sma - 1.0);
        }
    }
    if closes.len() > SHORT_PERIOD {
        let past = closes[closes.len() - 1 - SHORT_PERIOD];
        if past > 0.0 {
            features.insert("momentum_5", (closes[closes.len() - 1] - past) / past);
        }
    }
    if returns.len() >= 2 {
        features.insert("volatility", std_dev(&returns));
    }

    features
}
