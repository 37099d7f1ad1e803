use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use teloxide::Bot;
use tracing::{error, info, warn};

use cita_watcher::bot;
use cita_watcher::booking::run_booking;
use cita_watcher::plugins::fetchers;
use cita_watcher::plugins::notifiers::{LogNotifier, TelegramNotifier};
use cita_watcher::plugins::traits::Notifier;
use cita_watcher::scheduler::PollScheduler;
use cita_watcher::{AppConfig, AvailabilityWatcher, SubscriberStore, logging};

#[derive(Parser, Debug)]
#[command(
    name = "cita-watcher",
    version,
    about = "Watches the appointment site and notifies Telegram subscribers"
)]
struct Cli {
    /// Extra configuration file (TOML, JSON, YAML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the bot and the polling scheduler (default)
    Watch,
    /// Run a single availability check and print the report
    Check {
        /// Deliver the result to subscribers instead of logging it
        #[arg(long)]
        notify: bool,
    },
    /// Fill in and submit the appointment form once
    Book,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let _log_guard = logging::init(&config.logging)?;
    logging::install_panic_hook();

    let result = match cli.command.unwrap_or(Command::Watch) {
        Command::Watch => watch(config).await,
        Command::Check { notify } => check(config, notify).await,
        Command::Book => book(config).await,
    };

    if let Err(e) = &result {
        error!("Fatal: {:#}", e);
    }
    result
}

async fn watch(config: AppConfig) -> Result<()> {
    config.validate_for_watch()?;
    info!("Starting cita-watcher...");

    let store = Arc::new(
        SubscriberStore::load(&config.storage.subscribers_file)
            .await
            .context("failed to load subscribers")?,
    );
    let bot = Bot::new(&config.telegram.token);
    let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(bot.clone()));
    let fetcher = fetchers::from_config(&config.scraper)?;
    info!("Using {} fetcher for {}", fetcher.name(), config.target.url);

    let watcher = Arc::new(AvailabilityWatcher::new(
        &config,
        fetcher,
        notifier,
        Arc::clone(&store),
    )?);
    let mut scheduler = PollScheduler::new(watcher, config.scheduler.clone()).await?;
    scheduler.start().await?;

    let mut dispatcher = bot::dispatcher(bot, store);
    let shutdown_token = dispatcher.shutdown_token();
    let bot_task = tokio::spawn(async move { dispatcher.dispatch().await });

    shutdown_signal().await;
    info!("Shutting down...");

    scheduler.shutdown().await?;
    match shutdown_token.shutdown() {
        Ok(done) => done.await,
        Err(e) => warn!("Bot dispatcher was not running: {}", e),
    }
    if let Err(e) = bot_task.await {
        warn!("Bot task ended abnormally: {}", e);
    }

    info!("Stopped");
    Ok(())
}

async fn check(config: AppConfig, notify: bool) -> Result<()> {
    let store = Arc::new(SubscriberStore::load(&config.storage.subscribers_file).await?);
    let notifier: Arc<dyn Notifier> = if notify {
        config.validate_for_watch()?;
        Arc::new(TelegramNotifier::new(Bot::new(&config.telegram.token)))
    } else {
        Arc::new(LogNotifier)
    };

    let fetcher = fetchers::from_config(&config.scraper)?;
    let watcher = AvailabilityWatcher::new(&config, fetcher, notifier, store)?;

    let report = watcher.run_cycle().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn book(config: AppConfig) -> Result<()> {
    let report = run_booking(&config).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(e) = report.error {
        anyhow::bail!("booking aborted after {:?}: {}", report.stage, e);
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
