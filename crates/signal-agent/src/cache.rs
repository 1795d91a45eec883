use std::time::Duration;

use signal_core::{PriceSeries, SentimentResult};
use tokio::sync::RwLock;
use tokio::time::Instant;

/// A value plus when it was fetched.
#[derive(Debug, Clone)]
pub struct Stamped<T> {
    pub value: T,
    pub fetched_at: Instant,
}

impl<T> Stamped<T> {
    pub fn now(value: T) -> Self {
        Self {
            value,
            fetched_at: Instant::now(),
        }
    }

    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }

    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.age() <= max_age
    }
}

/// Latest refresh-task results, read by the prediction cycle.
#[derive(Default)]
pub struct SharedInputs {
    price: RwLock<Option<Stamped<PriceSeries>>>,
    sentiment: RwLock<Option<Stamped<SentimentResult>>>,
}

impl SharedInputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn store_price(&self, series: PriceSeries) {
        *self.price.write().await = Some(Stamped::now(series));
    }

    pub async fn store_sentiment(&self, sentiment: SentimentResult) {
        *self.sentiment.write().await = Some(Stamped::now(sentiment));
    }

    /// Cached price series no older than `max_age`.
    pub async fn fresh_price(&self, max_age: Duration) -> Option<PriceSeries> {
        self.price
            .read()
            .await
            .as_ref()
            .filter(|s| s.is_fresh(max_age))
            .map(|s| s.value.clone())
    }

    pub async fn fresh_sentiment(&self, max_age: Duration) -> Option<SentimentResult> {
        self.sentiment
            .read()
            .await
            .as_ref()
            .filter(|s| s.is_fresh(max_age))
            .map(|s| s.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sentiment_expires() {
        let inputs = SharedInputs::new();
        inputs.store_sentiment(SentimentResult::no_data()).await;
        assert!(inputs.fresh_sentiment(Duration::from_secs(60)).await.is_some());

        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(inputs.fresh_sentiment(Duration::from_secs(60)).await.is_none());
    }

    #[tokio::test]
    async fn test_empty_cache() {
        let inputs = SharedInputs::new();
        assert!(inputs.fresh_price(Duration::from_secs(60)).await.is_none());
    }
}
