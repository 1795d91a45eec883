use serde::{Deserialize, Serialize};

use crate::{SignalError, SignalResult};

/// Inclusive plausibility band for the instrument's price.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBounds {
    pub low: f64,
    pub high: f64,
}

impl PriceBounds {
    /// True when `price` touches or crosses either bound.
    pub fn is_outside(&self, price: f64) -> bool {
        price <= self.low || price >= self.high
    }
}

/// Dispersion multiples over the historical baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityMultipliers {
    pub warning: f64,
    pub critical: f64,
}

/// Base confidence per decision-table cell plus the floor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceLevels {
    pub high: f64,   // aligned signals
    pub medium: f64, // conflicting signals
    pub low: f64,    // flat trend or neutral sentiment
    pub floor: f64,
}

impl Default for ConfidenceLevels {
    fn default() -> Self {
        Self {
            high: 0.8,
            medium: 0.5,
            low: 0.3,
            floor: 0.1,
        }
    }
}

/// Immutable thresholds shared by the recommendation and alert engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalConfig {
    pub trend_threshold_pct: f64,
    pub sentiment_threshold: f64,
    pub strong_sentiment_threshold: f64,
    pub price_bounds: PriceBounds,
    pub volatility_multiplier: VolatilityMultipliers,
    /// Number of most recent returns compared against the full-window baseline.
    pub volatility_window: usize,
    pub min_sentiment_samples: u32,
    pub confidence: ConfidenceLevels,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            trend_threshold_pct: 0.5,
            sentiment_threshold: 0.2,
            strong_sentiment_threshold: 0.6,
            price_bounds: PriceBounds {
                low: 1000.0,
                high: 5000.0,
            },
            volatility_multiplier: VolatilityMultipliers {
                warning: 1.5,
                critical: 2.5,
            },
            volatility_window: 10,
            min_sentiment_samples: 10,
            confidence: ConfidenceLevels::default(),
        }
    }
}

impl SignalConfig {
    /// Reject threshold combinations the engines cannot honor.
    pub fn validate(&self) -> SignalResult<()> {
        let invalid = |msg: String| Err(SignalError::Configuration(msg));

        if !self.trend_threshold_pct.is_finite() || self.trend_threshold_pct < 0.0 {
            return invalid(format!(
                "trend_threshold must be a non-negative percentage, got {}",
                self.trend_threshold_pct
            ));
        }
        if !(0.0..1.0).contains(&self.sentiment_threshold) {
            return invalid(format!(
                "sentiment_threshold must be in [0, 1), got {}",
                self.sentiment_threshold
            ));
        }
        if !(0.0..1.0).contains(&self.strong_sentiment_threshold) {
            return invalid(format!(
                "strong_sentiment_threshold must be in [0, 1), got {}",
                self.strong_sentiment_threshold
            ));
        }
        if self.strong_sentiment_threshold < self.sentiment_threshold {
            return invalid(format!(
                "strong_sentiment_threshold ({}) is below sentiment_threshold ({})",
                self.strong_sentiment_threshold, self.sentiment_threshold
            ));
        }

        let bounds = self.price_bounds;
        if !bounds.low.is_finite() || !bounds.high.is_finite() || bounds.low < 0.0 || bounds.low >= bounds.high {
            return invalid(format!(
                "price_bounds must satisfy 0 <= low < high, got ({}, {})",
                bounds.low, bounds.high
            ));
        }

        let vol = self.volatility_multiplier;
        if !(vol.warning >= 1.0 && vol.critical > vol.warning && vol.critical.is_finite()) {
            return invalid(format!(
                "volatility_multiplier must satisfy 1 <= warning < critical, got ({}, {})",
                vol.warning, vol.critical
            ));
        }
        if self.volatility_window < 2 {
            return invalid("volatility_window must cover at least 2 returns".to_string());
        }

        let c = self.confidence;
        let ordered = 0.0 <= c.floor && c.floor <= c.low && c.low <= c.medium && c.medium <= c.high && c.high <= 1.0;
        if !ordered {
            return invalid(format!(
                "confidence levels must satisfy 0 <= floor <= low <= medium <= high <= 1, got {c:?}"
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(SignalConfig::default().validate().is_ok());
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut config = SignalConfig::default();
        config.price_bounds = PriceBounds { low: 200.0, high: 100.0 };
        assert!(matches!(config.validate(), Err(SignalError::Configuration(_))));
    }

    #[test]
    fn test_volatility_multipliers_must_increase() {
        let mut config = SignalConfig::default();
        config.volatility_multiplier = VolatilityMultipliers { warning: 3.0, critical: 2.0 };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_negative_trend_threshold_rejected() {
        let config = SignalConfig {
            trend_threshold_pct: -0.5,
            ..SignalConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bounds_are_inclusive() {
        let bounds = PriceBounds { low: 100.0, high: 200.0 };
        assert!(!bounds.is_outside(150.0));
        assert!(bounds.is_outside(100.0));
        assert!(bounds.is_outside(200.0));
        assert!(bounds.is_outside(250.0));
    }
}
