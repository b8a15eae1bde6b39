use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use common::{Config, EngineCommand, MarketData, ParamStore, Settings};
use engine::{BinanceMarketData, Engine, EngineParts};
use optimizer::{OptimizerConfig, ParameterOptimizer, ReplayBacktester};
use risk::{ArbiterConfig, DecisionArbiter};
use sentiment::{Cadence, RelevanceFilter, SourcesFileConfig};
use telegram_ctrl::{run_alerts, start_bot, BotDeps};

/// Kline width the live candle buffer is warm-started with.
const LIVE_INTERVAL: &str = "1m";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── Logging ──────────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Config ────────────────────────────────────────────────────────────────
    let cfg = Config::from_env();
    info!(pair = %cfg.market_pair, "Aurum advisor starting");

    let settings = Settings::load(&cfg.settings_path);
    let sources = SourcesFileConfig::load(&cfg.sources_config_path);
    let arbiter_cfg: ArbiterConfig = settings.section("arbiter").unwrap_or_default();
    let optimizer_cfg: OptimizerConfig = settings.section("optimizer").unwrap_or_default();

    // ── Shared state ──────────────────────────────────────────────────────────
    let params = ParamStore::new(settings.strategy_params.clone());

    // ── Collaborators ─────────────────────────────────────────────────────────
    let market: Arc<dyn MarketData> = Arc::new(
        BinanceMarketData::new(&cfg.market_pair, LIVE_INTERVAL)
            .context("building live market client")?,
    );
    let history: Arc<dyn MarketData> = Arc::new(
        BinanceMarketData::new(&cfg.market_pair, &cfg.history_interval)
            .context("building history market client")?,
    );
    let feeds = sources.build_feeds();
    let estimators = sources.build_estimators();
    if estimators.is_empty() {
        warn!("No sentiment estimators configured — sentiment will report unavailable");
    }
    let relevance = sources
        .relevance
        .enabled
        .then(|| RelevanceFilter::new(&sources.relevance.keywords));
    let cadence = Cadence::from_config(&sources.cadence).context("invalid [cadence] block")?;

    // ── Engine ────────────────────────────────────────────────────────────────
    let parts = EngineParts {
        market,
        history,
        candle_capacity: cfg.candle_capacity,
        tick_interval: Duration::from_secs(cfg.tick_interval_secs.max(1)),
        feeds,
        estimators,
        relevance,
        call_timeout: Duration::from_secs(sources.call_timeout_secs),
        cadence,
        optimizer: ParameterOptimizer::new(
            Arc::new(ReplayBacktester::for_interval(&cfg.history_interval)),
            optimizer_cfg,
        ),
        arbiter: DecisionArbiter::new(arbiter_cfg),
    };
    let (engine, engine_handle) = Engine::new(parts, params.clone(), settings.assets);
    let engine_task = tokio::spawn(engine.run());

    // ── Telegram ──────────────────────────────────────────────────────────────
    let mut telegram_tasks = Vec::new();
    match cfg.telegram_token.clone() {
        Some(token) => {
            let bot = teloxide::Bot::new(token);
            let chat_ids: Vec<teloxide::types::ChatId> = cfg
                .telegram_allowed_user_ids
                .iter()
                .map(|&id| teloxide::types::ChatId(id))
                .collect();
            let deps = BotDeps {
                engine: engine_handle.clone(),
                allowed_user_ids: Arc::new(cfg.telegram_allowed_user_ids.clone()),
            };
            telegram_tasks.push(tokio::spawn(run_alerts(
                bot.clone(),
                chat_ids,
                engine_handle.subscribe(),
            )));
            telegram_tasks.push(tokio::spawn(start_bot(bot, deps)));
        }
        None => info!("TELEGRAM_TOKEN not set — Telegram disabled"),
    }

    // ── Dashboard API ─────────────────────────────────────────────────────────
    let api_state = api::AppState::new(engine_handle.clone(), cfg.dashboard_token.clone());
    let port = cfg.dashboard_port;
    let api_task = tokio::spawn(async move {
        if let Err(e) = api::serve(api_state, port).await {
            warn!(error = %e, "Dashboard API stopped");
        }
    });

    // ── Start ─────────────────────────────────────────────────────────────────
    engine_handle.send(EngineCommand::Start).await;
    if cfg.optimize_on_start {
        engine_handle.send(EngineCommand::Optimize).await;
    }

    info!("All subsystems started. Waiting for shutdown signal.");
    tokio::signal::ctrl_c()
        .await
        .context("listening for shutdown signal")?;
    info!("Shutdown signal received");

    // ── Shutdown ──────────────────────────────────────────────────────────────
    engine_handle.send(EngineCommand::Shutdown).await;
    if let Err(e) = engine_task.await {
        warn!(error = %e, "Engine task ended abnormally");
    }
    for task in telegram_tasks {
        task.abort();
    }
    api_task.abort();

    let snapshot = engine_handle.snapshot().await;
    let final_settings = Settings {
        assets: snapshot.portfolio,
        strategy_params: (*params.snapshot()).clone(),
        extra: settings.extra,
    };
    final_settings
        .save(&cfg.settings_path)
        .context("writing settings on shutdown")?;

    info!("Aurum advisor stopped");
    Ok(())
}
