use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use signal_core::{SentimentItem, SentimentLabel, SentimentOracle, SentimentResult, SignalResult};
use std::time::Duration;

use crate::error::{OracleError, OracleResult};
use crate::http::{build_client, check_status};

#[derive(Debug, Clone, Serialize)]
struct AggregateRequest<'a> {
    topic: &'a str,
    window_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
struct ScoredHeadline {
    text: String,
    label: String,
    #[serde(default = "unit_weight")]
    weight: f64,
}

fn unit_weight() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
struct AggregateResponse {
    score: f64,
    article_count: u32,
    #[serde(default)]
    headlines: Vec<ScoredHeadline>,
}

fn parse_label(label: &str) -> Option<SentimentLabel> {
    match label.to_ascii_lowercase().as_str() {
        "positive" | "bullish" => Some(SentimentLabel::Positive),
        "negative" | "bearish" => Some(SentimentLabel::Negative),
        "neutral" => Some(SentimentLabel::Neutral),
        _ => None,
    }
}

fn into_sentiment(response: AggregateResponse) -> OracleResult<SentimentResult> {
    // An empty window is a valid answer, not an error.
    if response.article_count == 0 {
        return Ok(SentimentResult::no_data());
    }

    let contributing_items = response
        .headlines
        .into_iter()
        .filter_map(|h| {
            let label = parse_label(&h.label)?;
            Some(SentimentItem {
                text: h.text,
                label,
                weight: h.weight,
            })
        })
        .collect();

    let result = SentimentResult {
        score: response.score,
        sample_count: response.article_count,
        contributing_items,
    };
    result
        .validate()
        .map_err(|e| OracleError::InvalidResponse(e.to_string()))?;
    Ok(result)
}

/// News sentiment aggregator served over HTTP (`POST {base_url}/aggregate`).
#[derive(Clone)]
pub struct HttpSentimentOracle {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSentimentOracle {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> OracleResult<Self> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn request(&self, topic: &str, window: chrono::Duration) -> OracleResult<SentimentResult> {
        let request = AggregateRequest {
            topic,
            window_hours: window.num_hours().max(1),
        };

        let response = self
            .client
            .post(format!("{}/aggregate", self.base_url))
            .json(&request)
            .send()
            .await?;

        check_status("sentiment service", response.status())?;

        let body = response.json::<AggregateResponse>().await?;
        into_sentiment(body)
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
impl SentimentOracle for HttpSentimentOracle {
    fn name(&self) -> &str {
        "http-sentiment"
    }

    async fn aggregate(&self, topic: &str, window: chrono::Duration) -> SignalResult<SentimentResult> {
        let result = self.request(topic, window).await?;
        tracing::debug!(
            "Sentiment for '{}': score {:.3} over {} samples",
            topic,
            result.score,
            result.sample_count
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_aggregate_response() {
        let body: AggregateResponse = serde_json::from_str(
            r#"{
                "score": 0.42,
                "article_count": 3,
                "headlines": [
                    {"text": "Gold rallies on rate cut bets", "label": "POSITIVE", "weight": 0.9},
                    {"text": "Dollar firms", "label": "negative"},
                    {"text": "Unknown", "label": "mixed"}
                ]
            }"#,
        )
        .unwrap();

        let result = into_sentiment(body).unwrap();
        assert_eq!(result.sample_count, 3);
        assert_eq!(result.contributing_items.len(), 2);
        assert_eq!(result.contributing_items[0].label, SentimentLabel::Positive);
        assert_eq!(result.contributing_items[1].weight, 1.0);
    }

    #[test]
    fn test_zero_articles_is_empty_result() {
        let body: AggregateResponse =
            serde_json::from_str(r#"{"score": 0.8, "article_count": 0}"#).unwrap();
        let result = into_sentiment(body).unwrap();
        assert_eq!(result.sample_count, 0);
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn test_out_of_range_score_is_invalid() {
        let body: AggregateResponse =
            serde_json::from_str(r#"{"score": 3.5, "article_count": 10}"#).unwrap();
        assert!(matches!(into_sentiment(body), Err(OracleError::InvalidResponse(_))));
    }
}
