use async_trait::async_trait;
use chrono::{DateTime, Utc};
use signal_core::{BarInterval, LookbackWindow, PricePoint, PriceOracle, PriceSeries, PriceSnapshot, SignalResult};
use std::time::Duration;

use crate::error::{OracleError, OracleResult};
use crate::http::{build_client, check_status, RateLimiter};

const CHART_URL: &str = "https://query2.finance.yahoo.com/v8/finance/chart";

fn interval_code(interval: BarInterval) -> &'static str {
    match interval {
        BarInterval::Minute1 => "1m",
        BarInterval::Minute5 => "5m",
        BarInterval::Minute15 => "15m",
        BarInterval::Hour1 => "60m",
        BarInterval::Day1 => "1d",
    }
}

fn field<'a>(quote: &'a serde_json::Value, name: &str) -> OracleResult<&'a Vec<serde_json::Value>> {
    quote
        .get(name)
        .and_then(|v| v.as_array())
        .ok_or_else(|| OracleError::InvalidResponse(format!("chart has no {name} series")))
}

/// Parse a v8 chart payload into a series of at most `periods` bars.
/// Bars with a missing close are skipped; the snapshot is the newest bar
/// with complete OHLC and closes newer than it are dropped.
pub fn parse_chart(symbol: &str, json: &serde_json::Value, periods: usize) -> OracleResult<PriceSeries> {
    if let Some(error) = json.pointer("/chart/error").filter(|e| !e.is_null()) {
        return Err(OracleError::NoData(format!("Yahoo chart error for {symbol}: {error}")));
    }

    let chart = json
        .get("chart")
        .and_then(|v| v.get("result"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| OracleError::NoData(format!("No chart data found for {symbol}")))?;

    let timestamps = chart
        .get("timestamp")
        .and_then(|v| v.as_array())
        .ok_or_else(|| OracleError::NoData(format!("No timestamps found for {symbol}")))?;

    let quote = chart
        .get("indicators")
        .and_then(|v| v.get("quote"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .ok_or_else(|| OracleError::InvalidResponse("No quote data found".to_string()))?;

    let opens = field(quote, "open")?;
    let highs = field(quote, "high")?;
    let lows = field(quote, "low")?;
    let closes = field(quote, "close")?;
    let volumes = quote.get("volume").and_then(|v| v.as_array());

    let mut points = Vec::new();
    let mut snapshot = None;
    for (i, ts) in timestamps.iter().enumerate() {
        let Some(timestamp) = ts.as_i64().and_then(|t| DateTime::<Utc>::from_timestamp(t, 0)) else {
            continue;
        };
        let Some(close) = closes.get(i).and_then(|v| v.as_f64()) else {
            continue;
        };
        points.push(PricePoint { timestamp, close });

        if let (Some(open), Some(high), Some(low)) = (
            opens.get(i).and_then(|v| v.as_f64()),
            highs.get(i).and_then(|v| v.as_f64()),
            lows.get(i).and_then(|v| v.as_f64()),
        ) {
            let volume = volumes
                .and_then(|v| v.get(i))
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            snapshot = Some(PriceSnapshot {
                symbol: symbol.to_string(),
                timestamp,
                open,
                high,
                low,
                close,
                volume,
            });
        }
    }

    let snapshot = snapshot.ok_or_else(|| OracleError::NoData(format!("No complete bar for {symbol}")))?;
    // The series ends at the snapshot bar.
    points.retain(|p| p.timestamp <= snapshot.timestamp);
    let keep = periods.max(1);
    if points.len() > keep {
        points.drain(..points.len() - keep);
    }

    let series = PriceSeries { snapshot, points };
    series
        .validate()
        .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
    Ok(series)
}

/// Yahoo Finance chart endpoint. No API key; the primary price source.
#[derive(Clone)]
pub struct YahooPriceOracle {
    client: reqwest::Client,
    limiter: RateLimiter,
}

impl YahooPriceOracle {
    pub fn new(timeout: Duration) -> OracleResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            limiter: RateLimiter::new("yahoo chart", 1, Duration::from_secs(1)),
        })
    }

    async fn request(&self, symbol: &str, window: LookbackWindow) -> OracleResult<PriceSeries> {
        let period2 = Utc::now();
        // Double the span so weekends and holidays still yield enough bars.
        let period1 = period2 - window.span() * 2;
        let url = format!(
            "{}/{}?period1={}&period2={}&interval={}",
            CHART_URL,
            symbol,
            period1.timestamp(),
            period2.timestamp(),
            interval_code(window.interval)
        );

        self.limiter.acquire().await;
        let response = self.client.get(&url).send().await?;
        check_status("yahoo chart", response.status())?;

        let json: serde_json::Value = response.json().await?;
        parse_chart(symbol, &json, window.periods)
    }
}

#[async_trait]
impl PriceOracle for YahooPriceOracle {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch(&self, symbol: &str, window: LookbackWindow) -> SignalResult<PriceSeries> {
        Ok(self.request(symbol, window).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chart() -> serde_json::Value {
        json!({
            "chart": {
                "result": [{
                    "timestamp": [1704153600, 1704240000, 1704326400, 1704412800],
                    "indicators": {
                        "quote": [{
                            "open":   [2060.0, 2070.0, null, 2045.0],
                            "high":   [2075.0, 2080.0, null, 2055.0],
                            "low":    [2055.0, 2040.0, null, 2038.0],
                            "close":  [2070.0, 2045.0, 2042.0, 2050.0],
                            "volume": [1200, 1500, null, null]
                        }]
                    }
                }],
                "error": null
            }
        })
    }

    #[test]
    fn test_parse_chart_builds_series_and_snapshot() {
        let series = parse_chart("GC=F", &chart(), 60).unwrap();
        assert_eq!(series.points.len(), 4);
        assert_eq!(series.snapshot.close, 2050.0);
        assert_eq!(series.snapshot.volume, 0.0);
        assert_eq!(series.snapshot.symbol, "GC=F");
    }

    #[test]
    fn test_parse_chart_keeps_newest_periods() {
        let series = parse_chart("GC=F", &chart(), 2).unwrap();
        let closes = series.closes();
        assert_eq!(closes, vec![2042.0, 2050.0]);
    }

    #[test]
    fn test_trailing_close_only_bar_dropped() {
        let mut payload = chart();
        let quote = &mut payload["chart"]["result"][0];
        quote["timestamp"].as_array_mut().unwrap().push(json!(1704499200));
        let bars = &mut quote["indicators"]["quote"][0];
        bars["open"].as_array_mut().unwrap().push(json!(null));
        bars["high"].as_array_mut().unwrap().push(json!(null));
        bars["low"].as_array_mut().unwrap().push(json!(null));
        bars["close"].as_array_mut().unwrap().push(json!(2061.0));
        bars["volume"].as_array_mut().unwrap().push(json!(null));

        let series = parse_chart("GC=F", &payload, 2).unwrap();
        assert_eq!(series.snapshot.close, 2050.0);
        assert_eq!(series.closes(), vec![2042.0, 2050.0]);
        assert_eq!(series.points.last().unwrap().timestamp, series.snapshot.timestamp);
    }

    #[test]
    fn test_chart_error_is_no_data() {
        let payload = json!({
            "chart": {"result": null, "error": {"code": "Not Found", "description": "No data found"}}
        });
        assert!(matches!(parse_chart("XXX", &payload, 10), Err(OracleError::NoData(_))));
    }

    #[test]
    fn test_inverted_bar_is_invalid() {
        let payload = json!({
            "chart": {
                "result": [{
                    "timestamp": [1704153600],
                    "indicators": {"quote": [{
                        "open": [2060.0], "high": [2000.0], "low": [2055.0], "close": [2070.0], "volume": [1]
                    }]}
                }],
                "error": null
            }
        });
        assert!(matches!(parse_chart("GC=F", &payload, 10), Err(OracleError::InvalidResponse(_))));
    }
}
