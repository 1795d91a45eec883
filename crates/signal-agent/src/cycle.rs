use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use history_store::HistoryStore;
use signal_core::{
    Alert, AlertKind, CycleRecord, CycleTrigger, FailureKind, ForecastOracle, ForecastResult,
    LookbackWindow, OracleFailure, OracleSource, PendingCycle, PriceOracle, PriceSeries,
    SentimentOracle, SentimentResult, Severity, SignalConfig, SignalError, SignalResult,
};
use signal_engine::{
    build_features, AlertEngine, AlertInputs, RecommendationEngine, VolatilityReading,
    PREDICTION_HISTORY_LEN,
};

use crate::cache::SharedInputs;
use crate::discord_notifier::DiscordNotifier;
use crate::metrics::AgentMetrics;

/// Where a cycle's inputs come from.
#[derive(Clone)]
pub struct Oracles {
    pub price: Arc<dyn PriceOracle>,
    pub forecast: Option<Arc<dyn ForecastOracle>>,
    pub sentiment: Option<Arc<dyn SentimentOracle>>,
}

#[derive(Debug, Clone)]
pub struct CycleSettings {
    pub symbol: String,
    pub sentiment_topic: String,
    pub lookback: LookbackWindow,
    pub sentiment_window: chrono::Duration,
    pub oracle_timeout: Duration,
    pub stale_after: Duration,
}

/// One prediction cycle end to end: gather inputs, decide, alert, persist.
pub struct CycleRunner {
    settings: CycleSettings,
    oracles: Oracles,
    recommender: RecommendationEngine,
    alerter: AlertEngine,
    store: Arc<HistoryStore>,
    inputs: Arc<SharedInputs>,
    metrics: Arc<AgentMetrics>,
    notifier: Option<Arc<DiscordNotifier>>,
}

impl CycleRunner {
    pub fn new(
        settings: CycleSettings,
        oracles: Oracles,
        config: SignalConfig,
        store: Arc<HistoryStore>,
        metrics: Arc<AgentMetrics>,
    ) -> Self {
        Self {
            settings,
            oracles,
            recommender: RecommendationEngine::new(config.clone()),
            alerter: AlertEngine::new(config),
            store,
            inputs: Arc::new(SharedInputs::new()),
            metrics,
            notifier: None,
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<DiscordNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    /// Time-box an oracle call and turn any error into an `OracleFailure`.
    async fn call_oracle<T, F>(&self, source: OracleSource, call: F) -> Result<T, OracleFailure>
    where
        F: Future<Output = SignalResult<T>>,
    {
        let failure = match tokio::time::timeout(self.settings.oracle_timeout, call).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                let kind = e.failure_kind().unwrap_or(FailureKind::Transient);
                OracleFailure::new(source, kind, e.to_string())
            }
            Err(_) => OracleFailure::new(
                source,
                FailureKind::Transient,
                format!("timed out after {:?}", self.settings.oracle_timeout),
            ),
        };
        tracing::warn!(
            "{} oracle unavailable ({:?}): {}",
            source.as_str(),
            failure.kind,
            failure.detail
        );
        Err(failure)
    }

    async fn fetch_price(&self) -> Result<PriceSeries, OracleFailure> {
        let oracle = &self.oracles.price;
        let series = self
            .call_oracle(
                OracleSource::Price,
                oracle.fetch(&self.settings.symbol, self.settings.lookback),
            )
            .await?;
        series
            .validate()
            .map_err(|e| OracleFailure::new(OracleSource::Price, FailureKind::Invalid, e.to_string()))?;
        Ok(series)
    }

    async fn fetch_sentiment(&self) -> Result<SentimentResult, OracleFailure> {
        let Some(oracle) = &self.oracles.sentiment else {
            return Err(OracleFailure::new(
                OracleSource::Sentiment,
                FailureKind::NoData,
                "sentiment oracle not configured",
            ));
        };
        let result = self
            .call_oracle(
                OracleSource::Sentiment,
                oracle.aggregate(&self.settings.sentiment_topic, self.settings.sentiment_window),
            )
            .await?;
        result
            .validate()
            .map_err(|e| OracleFailure::new(OracleSource::Sentiment, FailureKind::Invalid, e.to_string()))?;
        Ok(result)
    }

    async fn fetch_forecast(&self, series: &PriceSeries) -> Result<ForecastResult, OracleFailure> {
        let Some(oracle) = &self.oracles.forecast else {
            return Err(OracleFailure::new(
                OracleSource::Forecast,
                FailureKind::NoData,
                "forecast oracle not configured",
            ));
        };
        let features = build_features(series);
        let forecast = self
            .call_oracle(OracleSource::Forecast, oracle.predict(&features))
            .await?;
        forecast
            .validate()
            .map_err(|e| OracleFailure::new(OracleSource::Forecast, FailureKind::Invalid, e.to_string()))?;
        Ok(forecast)
    }

    /// Market refresh task body: keep the price cache warm.
    pub async fn refresh_market(&self) -> SignalResult<()> {
        let series = self.fetch_price().await.map_err(failure_error)?;
        tracing::debug!(
            "Market refresh: {} close {:.2} ({} bars)",
            self.settings.symbol,
            series.snapshot.close,
            series.points.len()
        );
        self.inputs.store_price(series).await;
        Ok(())
    }

    /// Sentiment refresh task body.
    pub async fn refresh_sentiment(&self) -> SignalResult<()> {
        let sentiment = self.fetch_sentiment().await.map_err(failure_error)?;
        tracing::debug!(
            "Sentiment refresh: score {:.3} from {} samples",
            sentiment.score,
            sentiment.sample_count
        );
        self.inputs.store_sentiment(sentiment).await;
        Ok(())
    }

    /// Fresh price, else a cached series younger than `stale_after`.
    async fn gather_price(&self, pending: &mut PendingCycle) -> Option<PriceSeries> {
        match self.fetch_price().await {
            Ok(series) => {
                self.inputs.store_price(series.clone()).await;
                Some(series)
            }
            Err(failure) => match self.inputs.fresh_price(self.settings.stale_after).await {
                Some(cached) => {
                    tracing::warn!(
                        "Using cached price series for cycle {} ({})",
                        pending.cycle_id,
                        failure.detail
                    );
                    pending.stale_inputs.push(OracleSource::Price);
                    Some(cached)
                }
                None => {
                    pending.record_failure(failure);
                    None
                }
            },
        }
    }

    /// Cached sentiment when fresh, else a direct oracle call.
    async fn gather_sentiment(&self, pending: &mut PendingCycle) -> Option<SentimentResult> {
        let sentiment = match self.inputs.fresh_sentiment(self.settings.stale_after).await {
            Some(cached) => cached,
            None => match self.fetch_sentiment().await {
                Ok(fresh) => {
                    self.inputs.store_sentiment(fresh.clone()).await;
                    fresh
                }
                Err(failure) => {
                    pending.record_failure(failure);
                    return None;
                }
            },
        };

        if !sentiment.has_samples() {
            pending.record_failure(OracleFailure::new(
                OracleSource::Sentiment,
                FailureKind::NoData,
                "no sentiment samples in window",
            ));
        }
        Some(sentiment)
    }

    /// Next-period predictions of recent cycles plus this one, oldest first.
    /// Empty when this cycle has no forecast.
    async fn prediction_history(&self, forecast: Option<&ForecastResult>) -> Vec<f64> {
        let Some(current) = forecast else {
            return Vec::new();
        };
        let mut predictions: Vec<f64> = self
            .store
            .recent(PREDICTION_HISTORY_LEN - 1)
            .await
            .iter()
            .rev()
            .filter_map(|record| record.forecast.as_ref().map(|f| f.next_period_price))
            .collect();
        predictions.push(current.next_period_price);
        predictions
    }

    /// Run one cycle. Oracle failures degrade the record; they never abort it.
    pub async fn run_once(&self, trigger: CycleTrigger) -> CycleRecord {
        let started = AgentMetrics::start_timer();
        let mut pending = PendingCycle::start(self.store.next_cycle_id(), Utc::now(), trigger);
        tracing::info!("Cycle {} started ({:?})", pending.cycle_id, trigger);

        let series = self.gather_price(&mut pending).await;

        let forecast = match &series {
            Some(series) => match self.fetch_forecast(series).await {
                Ok(forecast) => Some(forecast),
                Err(failure) => {
                    pending.record_failure(failure);
                    None
                }
            },
            // Not called, so not a failed source.
            None => {
                tracing::debug!("Cycle {}: forecast skipped, no price series", pending.cycle_id);
                None
            }
        };

        let sentiment = self.gather_sentiment(&mut pending).await;

        pending.price_snapshot = series.as_ref().map(|s| s.snapshot.clone());
        pending.forecast = forecast;
        pending.sentiment = sentiment;

        pending.recommendation = pending.current_price().map(|price| {
            self.recommender
                .recommend(price, pending.forecast.as_ref(), pending.sentiment.as_ref())
        });

        let closes = series.as_ref().map(|s| s.closes()).unwrap_or_default();
        let predictions = self.prediction_history(pending.forecast.as_ref()).await;
        let volatility = VolatilityReading::assess(
            &closes,
            pending.forecast.as_ref(),
            &predictions,
            self.recommender.config().volatility_window,
        );

        pending.alerts = self.alerter.evaluate(&AlertInputs {
            snapshot: pending.price_snapshot.as_ref(),
            forecast: pending.forecast.as_ref(),
            sentiment: pending.sentiment.as_ref(),
            recommendation: pending.recommendation.as_ref(),
            volatility,
            failures: &pending.failures,
            stale_inputs: &pending.stale_inputs,
            timestamp: pending.timestamp,
        });

        let record = self.persist(pending.finalize()).await;
        self.metrics.finish_cycle(&record, started);

        match &record.recommendation {
            Some(rec) => tracing::info!(
                "Cycle {} {:?}: {} at {:.0}% confidence, {} alerts",
                record.cycle_id,
                record.status,
                rec.decision.as_str(),
                rec.confidence * 100.0,
                record.alerts.len()
            ),
            None => tracing::warn!(
                "Cycle {} FAILED: no current price, {} alerts",
                record.cycle_id,
                record.alerts.len()
            ),
        }

        if let Some(notifier) = &self.notifier {
            let notifier = notifier.clone();
            let record = record.clone();
            tokio::spawn(async move { notifier.notify_cycle(&record).await });
        }

        record
    }

    /// Append, or on exhausted retries keep the record readable in memory
    /// with a CRITICAL data-quality alert attached.
    async fn persist(&self, record: CycleRecord) -> CycleRecord {
        match self.store.append(record.clone()).await {
            Ok(()) => record,
            Err(e) => {
                tracing::error!("Cycle {} could not be persisted: {}", record.cycle_id, e);
                self.metrics.record_persist_failure();
                let timestamp = record.timestamp;
                let record = record.with_alert(Alert::new(
                    AlertKind::DataQuality,
                    Severity::Critical,
                    format!("History persistence failed: {e}"),
                    timestamp,
                ));
                self.store.publish_unpersisted(record.clone()).await;
                record
            }
        }
    }
}

fn failure_error(failure: OracleFailure) -> SignalError {
    let detail = format!("{}: {}", failure.source.as_str(), failure.detail);
    match failure.kind {
        FailureKind::Transient => SignalError::Transient(detail),
        FailureKind::Invalid => SignalError::InvalidData(detail),
        FailureKind::NoData => SignalError::NoData(detail),
    }
}
