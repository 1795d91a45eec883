use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dashboard_api::AppState;
use history_store::{HistoryDb, HistoryStore};
use market_oracles::{
    AlphaVantagePriceOracle, FallbackPriceOracle, HttpForecastOracle, HttpSentimentOracle,
    YahooPriceOracle,
};
use signal_core::{ForecastOracle, PriceOracle, SentimentOracle};
use tokio::signal::unix::SignalKind;
use tokio::sync::watch;

mod cache;
mod config;
mod control;
mod cycle;
mod discord_notifier;
mod metrics;
mod scheduler;
mod tasks;

use config::AgentConfig;
use control::AgentControl;
use cycle::{CycleRunner, CycleSettings, Oracles};
use discord_notifier::DiscordNotifier;
use metrics::AgentMetrics;
use scheduler::TaskScheduler;
use tasks::{MarketRefreshTask, PredictionTask, SentimentRefreshTask};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    tracing::info!("Starting Gold Signal Agent");

    // 2. Configuration. A bad config stops us before any task starts.
    let config = AgentConfig::from_env()?;
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        return Err(e.into());
    }
    let lookback = config.lookback()?;
    let dashboard_addr = config.dashboard_addr()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Symbol: {} (sentiment topic '{}')", config.symbol, config.sentiment_topic);
    tracing::info!(
        "  Lookback: {} x {} bars, forecast horizon {}",
        config.lookback_periods,
        config.bar_interval,
        config.forecast_horizon
    );
    tracing::info!(
        "  Intervals: market {}s | prediction {}s | sentiment {}s",
        config.market_refresh_interval,
        config.prediction_interval,
        config.sentiment_refresh_interval
    );
    tracing::info!(
        "  Price bounds: [{:.0}, {:.0}] | oracle timeout {}s",
        config.price_bound_low,
        config.price_bound_high,
        config.oracle_timeout_seconds
    );

    // 3. History store
    if !HistoryDb::exists(&config.database_url) {
        tracing::info!("Creating new history database at {}", config.database_url);
    }
    let store = Arc::new(
        HistoryStore::open(
            &config.database_url,
            config.history_retention,
            config.persist_max_retries,
        )
        .await?,
    );

    // 4. Oracles
    let oracles = build_oracles(&config).await?;

    // 5. Cycle runner and tasks
    let metrics = Arc::new(AgentMetrics::new(config.metrics_log_interval_cycles));
    let notifier = Arc::new(DiscordNotifier::new(config.discord_webhook_url.clone()));
    let settings = CycleSettings {
        symbol: config.symbol.clone(),
        sentiment_topic: config.sentiment_topic.clone(),
        lookback,
        sentiment_window: chrono::Duration::hours(config.sentiment_window_hours),
        oracle_timeout: config.oracle_timeout(),
        stale_after: Duration::from_secs(config.stale_after_seconds),
    };
    let runner = Arc::new(
        CycleRunner::new(
            settings,
            oracles,
            config.signal_config(),
            store.clone(),
            metrics.clone(),
        )
        .with_notifier(notifier.clone()),
    );

    let mut scheduler = TaskScheduler::new(metrics.clone());
    scheduler.register(
        Arc::new(MarketRefreshTask::new(runner.clone())),
        Duration::from_secs(config.market_refresh_interval),
    );
    scheduler.register(
        Arc::new(SentimentRefreshTask::new(runner.clone())),
        Duration::from_secs(config.sentiment_refresh_interval),
    );
    let prediction = scheduler.register(
        Arc::new(PredictionTask::new(runner.clone())),
        Duration::from_secs(config.prediction_interval),
    );
    let scheduler = Arc::new(scheduler);

    // 6. Start ticking and serve the dashboard
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let drivers = scheduler.start(shutdown_rx.clone());

    let control = Arc::new(AgentControl::new(
        config.symbol.clone(),
        prediction,
        scheduler.clone(),
        metrics.clone(),
    ));
    let state = AppState {
        store: store.clone(),
        control,
        alert_window: chrono::Duration::minutes(config.alert_window_minutes),
    };
    let mut dashboard_shutdown = shutdown_rx.clone();
    let mut dashboard = tokio::spawn(dashboard_api::serve(dashboard_addr, state, async move {
        let _ = dashboard_shutdown.wait_for(|stop| *stop).await;
    }));

    if let Err(e) = notifier
        .send_message(&format!(
            "**Gold Signal Agent Started** | {} | prediction every {}s",
            config.symbol, config.prediction_interval
        ))
        .await
    {
        tracing::warn!("Startup notification failed: {}", e);
    }

    // 7. Run until SIGINT/SIGTERM or the dashboard dies
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let mut dashboard_result = None;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT");
        }
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        result = &mut dashboard => {
            tracing::error!("Dashboard exited unexpectedly");
            dashboard_result = Some(result);
        }
    }

    tracing::info!("Shutting down: stopping schedulers and aborting in-flight runs");
    shutdown_tx.send(true).ok();
    for driver in drivers {
        driver.await.ok();
    }
    let dashboard_result = match dashboard_result {
        Some(result) => result,
        None => dashboard.await,
    };

    metrics.log_metrics();
    store.close().await;
    if let Err(e) = notifier
        .send_message("**Gold Signal Agent Stopped** | graceful shutdown")
        .await
    {
        tracing::debug!("Shutdown notification failed: {}", e);
    }

    dashboard_result??;
    tracing::info!("Gold Signal Agent stopped");
    Ok(())
}

async fn build_oracles(config: &AgentConfig) -> Result<Oracles> {
    let timeout = config.oracle_timeout();

    // The cycle time-boxes the whole chain, so each price source gets a share.
    let source_count = 1 + usize::from(config.alpha_vantage_api_key.is_some());
    let source_timeout = FallbackPriceOracle::split_budget(timeout, source_count);
    let mut sources: Vec<Arc<dyn PriceOracle>> =
        vec![Arc::new(YahooPriceOracle::new(source_timeout)?)];
    if let Some(api_key) = &config.alpha_vantage_api_key {
        let mut alpha_vantage = AlphaVantagePriceOracle::new(api_key.clone(), source_timeout)?;
        if let Some(symbol) = &config.alpha_vantage_symbol {
            alpha_vantage = alpha_vantage.with_symbol(symbol.clone());
        }
        sources.push(Arc::new(alpha_vantage));
    }
    let price = FallbackPriceOracle::new(sources)?.with_source_timeout(source_timeout);
    tracing::info!(
        "Price sources: {} ({:?} each)",
        price.source_names().join(" -> "),
        source_timeout
    );

    // Health checks are warn-only; a missing service just degrades cycles.
    let forecast = match &config.forecast_service_url {
        Some(url) => {
            let oracle = HttpForecastOracle::new(
                url.clone(),
                config.symbol.clone(),
                config.forecast_horizon,
                timeout,
            )?;
            match oracle.health().await {
                Ok(true) => tracing::info!("Startup check: forecast service OK ({})", url),
                Ok(false) => tracing::warn!("Startup check: forecast service unhealthy ({})", url),
                Err(e) => tracing::warn!("Startup check: forecast service unreachable ({})", e),
            }
            Some(Arc::new(oracle) as Arc<dyn ForecastOracle>)
        }
        None => {
            tracing::warn!("FORECAST_SERVICE_URL not set; cycles will run without a forecast");
            None
        }
    };

    let sentiment = match &config.sentiment_service_url {
        Some(url) => {
            let oracle = HttpSentimentOracle::new(url.clone(), timeout)?;
            match oracle.health().await {
                Ok(true) => tracing::info!("Startup check: sentiment service OK ({})", url),
                Ok(false) => tracing::warn!("Startup check: sentiment service unhealthy ({})", url),
                Err(e) => tracing::warn!("Startup check: sentiment service unreachable ({})", e),
            }
            Some(Arc::new(oracle) as Arc<dyn SentimentOracle>)
        }
        None => {
            tracing::warn!("SENTIMENT_SERVICE_URL not set; cycles will run without sentiment");
            None
        }
    };

    Ok(Oracles {
        price: Arc::new(price),
        forecast,
        sentiment,
    })
}
