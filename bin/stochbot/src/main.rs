use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, LogNotifier, Notifier};
use engine::{BinanceClient, Engine, EngineSettings, ExecutionConfig, Journal, TradingSessionState};
use strategy::{StochRsiPipeline, StrategyFileConfig};
use telegram_notify::TelegramNotifier;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env().context("loading configuration")?;
    let strategy_file = StrategyFileConfig::load(&cfg.strategy_config_path)
        .with_context(|| format!("loading {}", cfg.strategy_config_path))?;
    info!(
        pair = %cfg.pair,
        interval = %cfg.interval,
        mode = ?strategy_file.mode,
        notification_only = cfg.notification_only,
        "StochBot starting"
    );

    // ── Order journal ─────────────────────────────────────────────────────────
    let journal = Journal::connect(&cfg.database_url)
        .await
        .context("opening order journal")?;

    // ── Exchange and alerts ───────────────────────────────────────────────────
    let client = Arc::new(
        BinanceClient::new(&cfg.binance_api_key, &cfg.binance_secret, &cfg.binance_tld)
            .context("building Binance client")?,
    );
    let notifier: Arc<dyn Notifier> = match (&cfg.telegram_token, cfg.telegram_chat_id) {
        (Some(token), Some(chat_id)) => Arc::new(TelegramNotifier::spawn(token.clone(), chat_id)),
        _ => {
            warn!("Telegram not configured, alerts are only logged");
            Arc::new(LogNotifier)
        }
    };

    // ── Engine ────────────────────────────────────────────────────────────────
    let pipeline = StochRsiPipeline::from_config(&strategy_file);
    let upper_pipeline = pipeline.oscillators_only();
    let settings = EngineSettings {
        pair: cfg.pair.clone(),
        interval: cfg.interval.clone(),
        balance_limit: cfg.balance_limit,
        notification_only: cfg.notification_only,
        poll_interval: cfg.poll_interval,
    };
    let execution = ExecutionConfig {
        order_type: cfg.order_type,
        confirm_timeout: cfg.confirm_timeout,
        ..ExecutionConfig::default()
    };

    let mut engine = Engine::new(
        settings,
        strategy_file.mode,
        Arc::new(pipeline),
        client,
        notifier,
        execution,
        Some(journal.clone()),
    );
    if let Some(upper) = &cfg.upper_interval {
        info!(interval = %upper, "Buys require upper timeframe confirmation");
        engine = engine.with_upper_timeframe(upper.clone(), Arc::new(upper_pipeline));
    }

    let state = TradingSessionState::restore(Some(&journal), cfg.initial_position)
        .await
        .context("restoring session state")?;

    tokio::select! {
        _ = engine.run(state) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            info!("Shutdown signal received. Exiting.");
        }
    }
    Ok(())
}
