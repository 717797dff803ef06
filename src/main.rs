use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use stashbot::bot::{self, TelegramMediaFetcher};
use stashbot::config::{AppConfig, BotMode};
use stashbot::flow::{CutoutCoordinator, EventHandler, FlowContext, StorageCoordinator};
use stashbot::localization;
use stashbot::observability;
use stashbot::rate_limiter::RateLimiter;
use stashbot::reaper;
use stashbot::removal_api::RemovalClient;
use stashbot::session::SessionStore;
use stashbot::store::{connect_pool, PgFileStore};
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();

    // Invalid or missing required settings stop the bot before it connects anywhere
    let config = AppConfig::from_env()?;

    observability::init_observability(&config.observability).await?;
    info!("{}", config.summary());

    let localization_manager = localization::create_localization_manager()?;
    let sessions = Arc::new(SessionStore::new());
    let limiter = Arc::new(RateLimiter::new(
        config.limits.rate_limit,
        config.limits.rate_window(),
    ));

    let shutdown = CancellationToken::new();
    let reaper_handle = reaper::spawn_session_reaper(
        Arc::clone(&sessions),
        Arc::clone(&limiter),
        config.session.clone(),
        shutdown.clone(),
    );

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.bot.http_timeout_secs))
        .build()?;
    let bot = Bot::with_client(config.bot.token.clone(), client.clone());

    let ctx = FlowContext::new(
        Arc::clone(&sessions),
        Arc::clone(&limiter),
        Arc::clone(&localization_manager),
        config.limits.max_file_size,
    );

    let handler: Arc<dyn EventHandler> = match config.bot.mode {
        BotMode::FileStorage => {
            info!("Initializing database connection");
            let pool = connect_pool(&config.database).await?;
            let store = PgFileStore::new(pool, config.database.files_table.clone());
            store.init_database_schema().await?;
            Arc::new(StorageCoordinator::new(ctx, store))
        }
        BotMode::BackgroundRemoval => {
            let remover = RemovalClient::new(&config.removal)?;
            let fetcher =
                TelegramMediaFetcher::new(bot.clone(), client, config.limits.max_file_size);
            Arc::new(CutoutCoordinator::new(
                ctx,
                remover,
                fetcher,
                config.removal.timeout(),
            ))
        }
    };

    info!(mode = %config.bot.mode, "Bot initialized, starting dispatcher");
    bot::run_dispatcher(bot, handler).await;

    shutdown.cancel();
    if let Err(e) = reaper_handle.await {
        tracing::warn!(error = %e, "Session reaper task ended abnormally");
    }
    let dropped = sessions.clear();
    limiter.clear();
    info!(dropped_sessions = dropped, "Shutdown complete");

    Ok(())
}
