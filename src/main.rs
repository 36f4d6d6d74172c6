//! MATCHDAY: live-fixture checkpoint tracker and simulated bet reconciler.
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the feed, store and notifier once, and runs the poll cycle on
//! a fixed interval with graceful shutdown.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use matchday::config::AppConfig;
use matchday::engine::cycle::CycleRunner;
use matchday::engine::resolver::Resolver;
use matchday::engine::tracker::MatchTracker;
use matchday::feed::api_football::ApiFootballClient;
use matchday::feed::ScoreFeed;
use matchday::notify::{LogNotifier, Notifier, TelegramNotifier};
use matchday::storage::{DecisionStore, MemoryStore, SqliteStore};

const BANNER: &str = r#"
 __  __    _  _____ ____ _   _ ____    _ __   __
|  \/  |  / \|_   _/ ___| | | |  _ \  / \\ \ / /
| |\/| | / _ \ | || |   | |_| | | | |/ _ \\ V /
| |  | |/ ___ \| || |___|  _  | |_| / ___ \| |
|_|  |_/_/   \_\_| \____|_| |_|____/_/   \_\_|

  Live checkpoint tracker & bet reconciler
  v0.1.0
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let cfg = AppConfig::load("config.toml")?;

    init_logging();

    println!("{BANNER}");
    info!(
        agent_name = %cfg.agent.name,
        poll_interval_secs = cfg.agent.poll_interval_secs,
        grace_minutes = cfg.resolution.grace_minutes,
        "MATCHDAY starting up"
    );

    // -- Initialise components -------------------------------------------

    let store = build_store(&cfg).await?;
    let feed = build_feed(&cfg)?;
    let notifier = build_notifier(&cfg)?;

    let windows = cfg.checkpoints.windows();
    info!(
        checkpoint1 = format!("{}..={}", windows.first.start, windows.first.end),
        checkpoint2 = format!("{}..={}", windows.second.start, windows.second.end),
        "Checkpoint windows"
    );

    let tracker = MatchTracker::new(store.clone(), notifier.clone(), windows);
    let resolver = Resolver::new(
        feed.clone(),
        store,
        notifier.clone(),
        cfg.feed.effective_batch_size(),
        chrono::Duration::minutes(cfg.resolution.grace_minutes),
    );
    let mut runner = CycleRunner::new(
        feed,
        notifier,
        tracker,
        resolver,
        cfg.agent.name.clone(),
        cfg.agent.failure_alert_threshold,
    );

    // -- Main loop -------------------------------------------------------

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.agent.poll_interval_secs));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    info!(
        interval_secs = cfg.agent.poll_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    loop {
        tokio::select! {
            _ = interval.tick() => {
                runner.run_cycle(chrono::Utc::now()).await;
            }
            _ = &mut shutdown => {
                info!("Shutdown signal received.");
                break;
            }
        }
    }

    info!("MATCHDAY shut down cleanly.");
    Ok(())
}

async fn build_store(cfg: &AppConfig) -> Result<Arc<dyn DecisionStore>> {
    if cfg.storage.in_memory {
        warn!("Using in-memory store: nothing survives a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = SqliteStore::connect(&cfg.storage.database_url)
        .await
        .with_context(|| format!("Failed to open store at {}", cfg.storage.database_url))?;
    info!(url = %cfg.storage.database_url, "Store ready");
    Ok(Arc::new(store))
}

fn build_feed(cfg: &AppConfig) -> Result<Arc<dyn ScoreFeed>> {
    let api_key = AppConfig::resolve_secret(Some(cfg.feed.api_key_env.as_str()))
        .with_context(|| format!("Feed API key not set: {}", cfg.feed.api_key_env))?;
    let client = ApiFootballClient::new(
        &cfg.feed.base_url,
        api_key,
        Duration::from_secs(cfg.feed.timeout_secs),
        cfg.feed.retry_policy(),
    )?;
    Ok(Arc::new(client))
}

fn build_notifier(cfg: &AppConfig) -> Result<Arc<dyn Notifier>> {
    let token = AppConfig::resolve_secret(cfg.alerts.telegram_bot_token_env.as_deref());
    let chat_id = cfg
        .alerts
        .telegram_chat_id_env
        .as_deref()
        .and_then(|name| AppConfig::resolve_env(name).ok())
        .filter(|v| !v.trim().is_empty());

    match (token, chat_id) {
        (Some(token), Some(chat_id)) => {
            info!("Telegram notifications enabled");
            Ok(Arc::new(TelegramNotifier::new(
                token,
                chat_id,
                cfg.alerts.max_attempts,
                Duration::from_millis(cfg.alerts.retry_delay_ms),
            )?))
        }
        _ => {
            warn!("No Telegram credentials configured, running in dry-run notification mode");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("matchday=info"));

    let json_logging = std::env::var("MATCHDAY_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
