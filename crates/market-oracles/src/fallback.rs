use async_trait::async_trait;
use signal_core::{LookbackWindow, PriceOracle, PriceSeries, SignalError, SignalResult};
use std::sync::Arc;
use std::time::Duration;

/// Tries price sources in priority order and returns the first valid series.
pub struct FallbackPriceOracle {
    sources: Vec<Arc<dyn PriceOracle>>,
    source_timeout: Option<Duration>,
}

impl FallbackPriceOracle {
    pub fn new(sources: Vec<Arc<dyn PriceOracle>>) -> SignalResult<Self> {
        if sources.is_empty() {
            return Err(SignalError::Configuration(
                "at least one price source is required".to_string(),
            ));
        }
        Ok(Self {
            sources,
            source_timeout: None,
        })
    }

    /// Bound each source separately so a hung primary leaves time for the rest.
    pub fn with_source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = Some(timeout);
        self
    }

    /// Even share of `total` per source, for callers that time-box the whole chain.
    pub fn split_budget(total: Duration, sources: usize) -> Duration {
        total / sources.max(1) as u32
    }

    async fn fetch_one(
        &self,
        source: &dyn PriceOracle,
        symbol: &str,
        window: LookbackWindow,
    ) -> SignalResult<PriceSeries> {
        let call = source.fetch(symbol, window);
        let series = match self.source_timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| SignalError::Transient(format!("timed out after {limit:?}")))??,
            None => call.await?,
        };
        series.validate()?;
        Ok(series)
    }

    pub fn source_names(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.name().to_string()).collect()
    }
}

#[async_trait]
impl PriceOracle for FallbackPriceOracle {
    fn name(&self) -> &str {
        "fallback"
    }

    async fn fetch(&self, symbol: &str, window: LookbackWindow) -> SignalResult<PriceSeries> {
        let mut errors: Vec<(String, SignalError)> = Vec::new();

        for source in &self.sources {
            match self.fetch_one(source.as_ref(), symbol, window).await {
                Ok(series) => {
                    if !errors.is_empty() {
                        tracing::info!("Price for {} served by fallback source {}", symbol, source.name());
                    }
                    return Ok(series);
                }
                Err(e) => {
                    tracing::warn!("Price source {} failed for {}: {}", source.name(), symbol, e);
                    errors.push((source.name().to_string(), e));
                }
            }
        }

        let detail = errors
            .iter()
            .map(|(name, e)| format!("{name}: {e}"))
            .collect::<Vec<_>>()
            .join("; ");

        // Report the most recoverable kind so the cycle records it faithfully.
        let any_transient = errors.iter().any(|(_, e)| matches!(e, SignalError::Transient(_)));
        let all_no_data = errors.iter().all(|(_, e)| matches!(e, SignalError::NoData(_)));
        Err(if any_transient {
            SignalError::Transient(detail)
        } else if all_no_data {
            SignalError::NoData(detail)
        } else {
            SignalError::InvalidData(detail)
        })
    }
}
