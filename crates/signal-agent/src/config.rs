use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use signal_core::{
    BarInterval, ConfidenceLevels, LookbackWindow, PriceBounds, SignalConfig, SignalError,
    SignalResult, VolatilityMultipliers,
};
use std::env;
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    // Instrument
    pub symbol: String,          // GC=F (gold futures)
    pub sentiment_topic: String, // gold
    pub lookback_periods: usize,
    pub bar_interval: String, // 1d, 1h, 15m, 5m, 1m
    pub forecast_horizon: usize,
    pub sentiment_window_hours: i64,

    // Decision thresholds
    pub trend_threshold_pct: f64,
    pub sentiment_threshold: f64,
    pub strong_sentiment_threshold: f64,
    pub min_sentiment_samples: u32,

    // Alert thresholds
    pub price_bound_low: f64,
    pub price_bound_high: f64,
    pub volatility_warning_multiplier: f64,
    pub volatility_critical_multiplier: f64,
    pub volatility_window: usize,

    // Scheduling (seconds)
    pub market_refresh_interval: u64,
    pub prediction_interval: u64,
    pub sentiment_refresh_interval: u64,
    pub stale_after_seconds: u64,
    pub oracle_timeout_seconds: u64,

    // History
    pub history_retention: usize,
    pub persist_max_retries: usize,
    pub database_url: String,

    // Dashboard
    pub dashboard_bind: String,
    pub alert_window_minutes: i64,

    // Oracles
    pub forecast_service_url: Option<String>,
    pub sentiment_service_url: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
    pub alpha_vantage_symbol: Option<String>,

    // Notifications
    pub discord_webhook_url: String,
    pub metrics_log_interval_cycles: u64,
}

fn var_or(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn optional_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

impl AgentConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            symbol: var_or("SIGNAL_SYMBOL", "GC=F"),
            sentiment_topic: var_or("SENTIMENT_TOPIC", "gold"),
            lookback_periods: var_or("LOOKBACK_PERIODS", "60")
                .parse()
                .context("LOOKBACK_PERIODS must be an integer")?,
            bar_interval: var_or("BAR_INTERVAL", "1d"),
            forecast_horizon: var_or("FORECAST_HORIZON", "5")
                .parse()
                .context("FORECAST_HORIZON must be an integer")?,
            sentiment_window_hours: var_or("SENTIMENT_WINDOW_HOURS", "24")
                .parse()
                .context("SENTIMENT_WINDOW_HOURS must be an integer")?,

            trend_threshold_pct: var_or("TREND_THRESHOLD_PCT", "0.5")
                .parse()
                .context("TREND_THRESHOLD_PCT must be a number")?,
            sentiment_threshold: var_or("SENTIMENT_THRESHOLD", "0.2")
                .parse()
                .context("SENTIMENT_THRESHOLD must be a number")?,
            strong_sentiment_threshold: var_or("STRONG_SENTIMENT_THRESHOLD", "0.6")
                .parse()
                .context("STRONG_SENTIMENT_THRESHOLD must be a number")?,
            min_sentiment_samples: var_or("MIN_SENTIMENT_SAMPLES", "10")
                .parse()
                .context("MIN_SENTIMENT_SAMPLES must be an integer")?,

            price_bound_low: var_or("PRICE_BOUND_LOW", "1000")
                .parse()
                .context("PRICE_BOUND_LOW must be a number")?,
            price_bound_high: var_or("PRICE_BOUND_HIGH", "5000")
                .parse()
                .context("PRICE_BOUND_HIGH must be a number")?,
            volatility_warning_multiplier: var_or("VOLATILITY_WARNING_MULTIPLIER", "1.5")
                .parse()
                .context("VOLATILITY_WARNING_MULTIPLIER must be a number")?,
            volatility_critical_multiplier: var_or("VOLATILITY_CRITICAL_MULTIPLIER", "2.5")
                .parse()
                .context("VOLATILITY_CRITICAL_MULTIPLIER must be a number")?,
            volatility_window: var_or("VOLATILITY_WINDOW", "10")
                .parse()
                .context("VOLATILITY_WINDOW must be an integer")?,

            market_refresh_interval: var_or("MARKET_REFRESH_INTERVAL", "120")
                .parse()
                .context("MARKET_REFRESH_INTERVAL must be an integer")?,
            prediction_interval: var_or("PREDICTION_INTERVAL", "300")
                .parse()
                .context("PREDICTION_INTERVAL must be an integer")?,
            sentiment_refresh_interval: var_or("SENTIMENT_REFRESH_INTERVAL", "600")
                .parse()
                .context("SENTIMENT_REFRESH_INTERVAL must be an integer")?,
            stale_after_seconds: var_or("STALE_AFTER_SECONDS", "900")
                .parse()
                .context("STALE_AFTER_SECONDS must be an integer")?,
            oracle_timeout_seconds: var_or("ORACLE_TIMEOUT_SECONDS", "10")
                .parse()
                .context("ORACLE_TIMEOUT_SECONDS must be an integer")?,

            history_retention: var_or("HISTORY_RETENTION", "500")
                .parse()
                .context("HISTORY_RETENTION must be an integer")?,
            persist_max_retries: var_or("PERSIST_MAX_RETRIES", "3")
                .parse()
                .context("PERSIST_MAX_RETRIES must be an integer")?,
            database_url: var_or("DATABASE_URL", "sqlite:signal_history.db"),

            dashboard_bind: var_or("DASHBOARD_BIND", "127.0.0.1:8050"),
            alert_window_minutes: var_or("ALERT_WINDOW_MINUTES", "60")
                .parse()
                .context("ALERT_WINDOW_MINUTES must be an integer")?,

            forecast_service_url: optional_var("FORECAST_SERVICE_URL"),
            sentiment_service_url: optional_var("SENTIMENT_SERVICE_URL"),
            alpha_vantage_api_key: optional_var("ALPHA_VANTAGE_API_KEY"),
            alpha_vantage_symbol: optional_var("ALPHA_VANTAGE_SYMBOL"),

            discord_webhook_url: var_or("DISCORD_WEBHOOK_URL", ""),
            metrics_log_interval_cycles: var_or("METRICS_LOG_INTERVAL_CYCLES", "12")
                .parse()
                .context("METRICS_LOG_INTERVAL_CYCLES must be an integer")?,
        };

        Ok(config)
    }

    /// Thresholds handed to the engines.
    pub fn signal_config(&self) -> SignalConfig {
        SignalConfig {
            trend_threshold_pct: self.trend_threshold_pct,
            sentiment_threshold: self.sentiment_threshold,
            strong_sentiment_threshold: self.strong_sentiment_threshold,
            price_bounds: PriceBounds {
                low: self.price_bound_low,
                high: self.price_bound_high,
            },
            volatility_multiplier: VolatilityMultipliers {
                warning: self.volatility_warning_multiplier,
                critical: self.volatility_critical_multiplier,
            },
            volatility_window: self.volatility_window,
            min_sentiment_samples: self.min_sentiment_samples,
            confidence: ConfidenceLevels::default(),
        }
    }

    pub fn lookback(&self) -> SignalResult<LookbackWindow> {
        let interval = BarInterval::parse(&self.bar_interval).ok_or_else(|| {
            SignalError::Configuration(format!("unknown BAR_INTERVAL '{}'", self.bar_interval))
        })?;
        Ok(LookbackWindow::new(self.lookback_periods, interval))
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.oracle_timeout_seconds)
    }

    pub fn dashboard_addr(&self) -> SignalResult<SocketAddr> {
        self.dashboard_bind.parse().map_err(|e| {
            SignalError::Configuration(format!("DASHBOARD_BIND '{}': {}", self.dashboard_bind, e))
        })
    }

    /// Fatal at startup: the scheduler never starts on a bad config.
    pub fn validate(&self) -> SignalResult<()> {
        self.signal_config().validate()?;
        self.lookback()?;
        self.dashboard_addr()?;

        let invalid = |msg: &str| Err(SignalError::Configuration(msg.to_string()));
        if self.symbol.trim().is_empty() {
            return invalid("SIGNAL_SYMBOL must not be empty");
        }
        if self.lookback_periods <= self.volatility_window {
            return invalid("LOOKBACK_PERIODS must exceed VOLATILITY_WINDOW");
        }
        if self.market_refresh_interval == 0
            || self.prediction_interval == 0
            || self.sentiment_refresh_interval == 0
        {
            return invalid("task intervals must be at least 1 second");
        }
        if self.oracle_timeout_seconds == 0 {
            return invalid("ORACLE_TIMEOUT_SECONDS must be at least 1");
        }
        if self.history_retention == 0 {
            return invalid("HISTORY_RETENTION must be at least 1");
        }
        if self.sentiment_window_hours <= 0 || self.alert_window_minutes <= 0 {
            return invalid("SENTIMENT_WINDOW_HOURS and ALERT_WINDOW_MINUTES must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> AgentConfig {
        AgentConfig {
            symbol: "GC=F".to_string(),
            sentiment_topic: "gold".to_string(),
            lookback_periods: 60,
            bar_interval: "1d".to_string(),
            forecast_horizon: 5,
            sentiment_window_hours: 24,
            trend_threshold_pct: 0.5,
            sentiment_threshold: 0.2,
            strong_sentiment_threshold: 0.6,
            min_sentiment_samples: 10,
            price_bound_low: 1000.0,
            price_bound_high: 5000.0,
            volatility_warning_multiplier: 1.5,
            volatility_critical_multiplier: 2.5,
            volatility_window: 10,
            market_refresh_interval: 120,
            prediction_interval: 300,
            sentiment_refresh_interval: 600,
            stale_after_seconds: 900,
            oracle_timeout_seconds: 10,
            history_retention: 500,
            persist_max_retries: 3,
            database_url: "sqlite::memory:".to_string(),
            dashboard_bind: "127.0.0.1:8050".to_string(),
            alert_window_minutes: 60,
            forecast_service_url: None,
            sentiment_service_url: None,
            alpha_vantage_api_key: None,
            alpha_vantage_symbol: None,
            discord_webhook_url: String::new(),
            metrics_log_interval_cycles: 12,
        }
    }

    #[test]
    fn test_defaults_validate() {
        assert!(base().validate().is_ok());
        assert_eq!(base().signal_config(), SignalConfig::default());
    }

    #[test]
    fn test_bad_interval_is_configuration_error() {
        let mut config = base();
        config.bar_interval = "3w".to_string();
        assert!(matches!(config.validate(), Err(SignalError::Configuration(_))));
    }

    #[test]
    fn test_inverted_price_bounds_rejected() {
        let mut config = base();
        config.price_bound_low = 6000.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let mut config = base();
        config.prediction_interval = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_bad_bind_rejected() {
        let mut config = base();
        config.dashboard_bind = "localhost".to_string();
        assert!(config.validate().is_err());
    }
}
