use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, TimeZone, Utc};
use signal_core::{BarInterval, LookbackWindow, PricePoint, PriceOracle, PriceSeries, PriceSnapshot, SignalResult};
use std::time::Duration;

use crate::error::{OracleError, OracleResult};
use crate::http::{build_client, check_status, RateLimiter};

const BASE_URL: &str = "https://www.alphavantage.co/query";

fn series_key(interval: BarInterval) -> &'static str {
    match interval {
        BarInterval::Minute1 => "Time Series (1min)",
        BarInterval::Minute5 => "Time Series (5min)",
        BarInterval::Minute15 => "Time Series (15min)",
        BarInterval::Hour1 => "Time Series (60min)",
        BarInterval::Day1 => "Time Series (Daily)",
    }
}

fn bar_value(bar: &serde_json::Value, name: &str) -> Option<f64> {
    bar.get(name).and_then(|v| v.as_str()).and_then(|s| s.parse::<f64>().ok())
}

fn parse_bar_time(raw: &str) -> Option<chrono::DateTime<Utc>> {
    if let Ok(ts) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&ts));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Parse a `TIME_SERIES_*` payload. Bars are keyed by timestamp string and
/// values are quoted decimals.
pub fn parse_time_series(
    symbol: &str,
    json: &serde_json::Value,
    window: LookbackWindow,
) -> OracleResult<PriceSeries> {
    if let Some(error) = json.get("Error Message") {
        return Err(OracleError::NoData(format!("Alpha Vantage error: {error}")));
    }
    if let Some(note) = json.get("Note").or_else(|| json.get("Information")) {
        return Err(OracleError::RateLimited(format!("Alpha Vantage rate limit: {note}")));
    }

    let bars = json
        .get(series_key(window.interval))
        .and_then(|v| v.as_object())
        .ok_or_else(|| OracleError::NoData(format!("No time series found for {symbol}")))?;

    let mut snapshots = Vec::with_capacity(bars.len());
    for (raw_ts, bar) in bars {
        let Some(timestamp) = parse_bar_time(raw_ts) else {
            continue;
        };
        if let (Some(open), Some(high), Some(low), Some(close)) = (
            bar_value(bar, "1. open"),
            bar_value(bar, "2. high"),
            bar_value(bar, "3. low"),
            bar_value(bar, "4. close"),
        ) {
            snapshots.push(PriceSnapshot {
                symbol: symbol.to_string(),
                timestamp,
                open,
                high,
                low,
                close,
                volume: bar_value(bar, "5. volume").unwrap_or(0.0),
            });
        }
    }

    snapshots.sort_by_key(|s| s.timestamp);
    if snapshots.len() > window.periods {
        snapshots.drain(..snapshots.len() - window.periods);
    }

    let points = snapshots
        .iter()
        .map(|s| PricePoint {
            timestamp: s.timestamp,
            close: s.close,
        })
        .collect();
    let snapshot = snapshots
        .pop()
        .ok_or_else(|| OracleError::NoData(format!("Empty time series for {symbol}")))?;

    let series = PriceSeries { snapshot, points };
    series
        .validate()
        .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
    Ok(series)
}

/// Alpha Vantage time series. Keyed API, used as a fallback source.
///
/// Alpha Vantage does not list futures tickers, so the oracle can be pinned
/// to a different symbol (e.g. a spot proxy) than the one requested.
#[derive(Clone)]
pub struct AlphaVantagePriceOracle {
    api_key: String,
    symbol_override: Option<String>,
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl AlphaVantagePriceOracle {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> OracleResult<Self> {
        Ok(Self {
            api_key: api_key.into(),
            symbol_override: None,
            client: build_client(timeout)?,
            // Free tier: 5 calls per minute.
            limiter: RateLimiter::new("alpha vantage", 5, Duration::from_secs(60)),
        })
    }

    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol_override = Some(symbol.into());
        self
    }

    async fn request(&self, symbol: &str, window: LookbackWindow) -> OracleResult<PriceSeries> {
        let symbol = self.symbol_override.as_deref().unwrap_or(symbol);
        let outputsize = if window.periods > 100 { "full" } else { "compact" };
        let url = match window.interval {
            BarInterval::Day1 => format!(
                "{}?function=TIME_SERIES_DAILY&symbol={}&outputsize={}&apikey={}",
                BASE_URL, symbol, outputsize, self.api_key
            ),
            intraday => format!(
                "{}?function=TIME_SERIES_INTRADAY&symbol={}&interval={}min&outputsize={}&apikey={}",
                BASE_URL,
                symbol,
                intraday.to_minutes(),
                outputsize,
                self.api_key
            ),
        };

        self.limiter.acquire().await;
        let response = self.client.get(&url).send().await?;
        check_status("alpha vantage", response.status())?;

        let json: serde_json::Value = response.json().await?;
        parse_time_series(symbol, &json, window)
    }
}

#[async_trait]
impl PriceOracle for AlphaVantagePriceOracle {
    fn name(&self) -> &str {
        "alpha-vantage"
    }

    async fn fetch(&self, symbol: &str, window: LookbackWindow) -> SignalResult<PriceSeries> {
        Ok(self.request(symbol, window).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn daily() -> serde_json::Value {
        json!({
            "Meta Data": {"2. Symbol": "GLD"},
            "Time Series (Daily)": {
                "2024-01-04": {"1. open": "189.10", "2. high": "190.00", "3. low": "188.50", "4. close": "189.70", "5. volume": "5000"},
                "2024-01-02": {"1. open": "190.00", "2. high": "191.20", "3. low": "189.00", "4. close": "190.80", "5. volume": "7000"},
                "2024-01-03": {"1. open": "190.80", "2. high": "191.00", "3. low": "188.90", "4. close": "189.20", "5. volume": "6500"}
            }
        })
    }

    #[test]
    fn test_parse_daily_orders_oldest_first() {
        let window = LookbackWindow::new(10, BarInterval::Day1);
        let series = parse_time_series("GLD", &daily(), window).unwrap();
        assert_eq!(series.closes(), vec![190.80, 189.20, 189.70]);
        assert_eq!(series.snapshot.close, 189.70);
        assert_eq!(series.snapshot.volume, 5000.0);
    }

    #[test]
    fn test_parse_daily_truncates_to_window() {
        let window = LookbackWindow::new(2, BarInterval::Day1);
        let series = parse_time_series("GLD", &daily(), window).unwrap();
        assert_eq!(series.points.len(), 2);
        assert_eq!(series.points[0].close, 189.20);
    }

    #[test]
    fn test_rate_limit_note() {
        let payload = json!({"Note": "Thank you for using Alpha Vantage! Our standard API call frequency is 5 calls per minute"});
        let window = LookbackWindow::new(10, BarInterval::Day1);
        assert!(matches!(
            parse_time_series("GLD", &payload, window),
            Err(OracleError::RateLimited(_))
        ));
    }

    #[test]
    fn test_intraday_timestamps() {
        let payload = json!({
            "Time Series (5min)": {
                "2024-01-04 15:55:00": {"1. open": "189.1", "2. high": "189.3", "3. low": "189.0", "4. close": "189.2", "5. volume": "100"}
            }
        });
        let window = LookbackWindow::new(10, BarInterval::Minute5);
        let series = parse_time_series("GLD", &payload, window).unwrap();
        assert_eq!(series.snapshot.timestamp.to_rfc3339(), "2024-01-04T15:55:00+00:00");
    }
}
