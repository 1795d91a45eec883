use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use signal_core::{FeatureVector, ForecastOracle, ForecastResult, SignalResult};
use std::time::Duration;

use crate::error::{OracleError, OracleResult};
use crate::http::{build_client, check_status};

#[derive(Debug, Clone, Serialize)]
struct PredictionRequest<'a> {
    symbol: &'a str,
    features: &'a FeatureVector,
    horizon_steps: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct PredictionResponse {
    base_price: f64,
    next_period_price: Option<f64>,
    #[serde(default)]
    predicted_prices: Vec<f64>,
}

/// Convert the service payload, validating before it reaches the engines.
fn into_forecast(response: PredictionResponse) -> OracleResult<ForecastResult> {
    let next = response
        .next_period_price
        .or_else(|| response.predicted_prices.first().copied())
        .ok_or_else(|| OracleError::NoData("forecast carried no predicted prices".to_string()))?;

    let forecast = ForecastResult {
        base_price: response.base_price,
        next_period_price: next,
        horizon_prices: response.predicted_prices,
    };
    forecast
        .validate()
        .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
    Ok(forecast)
}

/// Forecast model served over HTTP (`POST {base_url}/predict`).
#[derive(Clone)]
pub struct HttpForecastOracle {
    client: reqwest::Client,
    base_url: String,
    symbol: String,
    horizon_steps: usize,
}

impl HttpForecastOracle {
    pub fn new(
        base_url: impl Into<String>,
        symbol: impl Into<String>,
        horizon_steps: usize,
        timeout: Duration,
    ) -> OracleResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            symbol: symbol.into(),
            horizon_steps,
        })
    }

    async fn request(&self, features: &FeatureVector) -> OracleResult<ForecastResult> {
        let request = PredictionRequest {
            symbol: &self.symbol,
            features,
            horizon_steps: self.horizon_steps,
        };

        let response = self
            .client
            .post(format!("{}/predict", self.base_url))
            .json(&request)
            .send()
            .await?;

        check_status("forecast service", response.status())?;

        let body = response.json::<PredictionResponse>().await?;
        into_forecast(body)
    }

    /// Check service health
    pub async fn health(&self) -> OracleResult<bool> {
        let response = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        Ok(response.status().is_success())
    }
}

#[async_trait]
impl ForecastOracle for HttpForecastOracle {
    fn name(&self) -> &str {
        "http-forecast"
    }

    async fn predict(&self, features: &FeatureVector) -> SignalResult<ForecastResult> {
        tracing::debug!("Requesting forecast for {} ({} features)", self.symbol, features.len());
        Ok(self.request(features).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_price_defaults_to_first_horizon_step() {
        let body: PredictionResponse = serde_json::from_str(
            r#"{"base_price": 1800.0, "predicted_prices": [1810.0, 1820.0, 1815.0]}"#,
        )
        .unwrap();
        let forecast = into_forecast(body).unwrap();
        assert_eq!(forecast.next_period_price, 1810.0);
        assert_eq!(forecast.horizon_prices.len(), 3);
    }

    #[test]
    fn test_empty_prediction_is_no_data() {
        let body: PredictionResponse = serde_json::from_str(r#"{"base_price": 1800.0}"#).unwrap();
        assert!(matches!(into_forecast(body), Err(OracleError::NoData(_))));
    }

    #[test]
    fn test_negative_price_is_invalid() {
        let body: PredictionResponse =
            serde_json::from_str(r#"{"base_price": 1800.0, "next_period_price": -3.0}"#).unwrap();
        assert!(matches!(into_forecast(body), Err(OracleError::InvalidResponse(_))));
    }

    #[test]
    fn test_request_serializes_features_as_map() {
        let mut features = FeatureVector::new();
        features.insert("close", 1800.0);
        let request = PredictionRequest {
            symbol: "GC=F",
            features: &features,
            horizon_steps: 5,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["features"]["close"], 1800.0);
        assert_eq!(json["horizon_steps"], 5);
    }
}
