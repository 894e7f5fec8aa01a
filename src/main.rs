//! instrelay Binary Entry Point
//!
//! Runs one-shot collection, delivery or retention cycles, or the full
//! service with all three triggers scheduled.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use instrelay::{
    AppConfig, BackendRegistry, CollectionScheduler, DeliveryDispatcher, RetentionReaper,
    SqliteStagingStore, StagingStore, StorageBuilder, TaskRunner, TriggerRegistry,
    config::DEFAULT_CONFIG_PATH,
    trigger::{CleanTrigger, CollectTrigger, SendTrigger},
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// instrelay - Instrument Reading Relay
#[derive(Parser, Debug)]
#[command(name = "instrelay", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = DEFAULT_CONFIG_PATH,
        env = "INSTRELAY_CONFIG"
    )]
    config: String,

    /// Database URL (overrides config file)
    #[arg(long, env = "INSTRELAY_DB_URL")]
    db_url: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one collection cycle over all active instruments
    Collect,

    /// Run one delivery cycle
    Send {
        /// Aggregator endpoint URL
        #[arg(long, env = "INSTRELAY_DELIVERY_URL")]
        url: Option<String>,

        /// Basic auth username
        #[arg(long, env = "INSTRELAY_DELIVERY_USERNAME")]
        username: Option<String>,

        /// Basic auth password
        #[arg(long, env = "INSTRELAY_DELIVERY_PASSWORD", hide_env_values = true)]
        password: Option<String>,

        /// Readings per POST
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Delete staged readings older than the retention interval
    Clean {
        /// Retention interval in minutes
        #[arg(long)]
        interval_minutes: Option<u64>,
    },

    /// Run collect, send and clean on their schedules until shutdown (default)
    Run,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,instrelay=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load_with_instrument_path(&cli.config)?;

    // CLI > ENV > config file
    if let Some(url) = cli.db_url {
        config.database.url = url;
    }

    tracing::info!(
        "Database: {}, instruments: {}",
        config.database.url,
        config.instruments.len()
    );

    let store = Arc::new(
        StorageBuilder::new(&config.database.url)
            .max_connections(config.database.max_connections)
            .build()
            .await?,
    );

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Collect => {
            let summary = collection_scheduler(&config, store.clone()).collect().await;
            tracing::info!(
                "Collection complete: {} tasks, {} succeeded, {} exhausted",
                summary.tasks,
                summary.succeeded,
                summary.exhausted
            );
            Ok(())
        }
        Commands::Send {
            url,
            username,
            password,
            limit,
        } => {
            let mut delivery = config.delivery.clone();
            if let Some(url) = url {
                delivery.url = url;
            }
            if let Some(username) = username {
                delivery.username = username;
            }
            if let Some(password) = password {
                delivery.password = password;
            }
            if let Some(limit) = limit {
                delivery.batch_limit = limit;
            }
            match DeliveryDispatcher::new(delivery, store.clone()) {
                Ok(dispatcher) => {
                    let summary = dispatcher.dispatch().await;
                    tracing::info!(
                        "Delivery complete: {} blocks sent, {} failed, {} deleted",
                        summary.blocks_sent,
                        summary.blocks_failed,
                        summary.deleted
                    );
                    Ok(())
                }
                Err(e) => Err(e.into()),
            }
        }
        Commands::Clean { interval_minutes } => {
            let minutes = interval_minutes.unwrap_or(config.retention.interval_minutes);
            let deleted = RetentionReaper::new(store.clone(), minutes).clean().await;
            tracing::info!("Retention complete: {} readings deleted", deleted);
            Ok(())
        }
        Commands::Run => run_service(&config, store.clone()).await,
    };

    store.close().await;
    result
}

fn collection_scheduler(config: &AppConfig, store: Arc<SqliteStagingStore>) -> CollectionScheduler {
    let runner = TaskRunner::new(Arc::new(BackendRegistry::with_builtin()), store)
        .with_open_options(config.devices.open_options());
    CollectionScheduler::new(Arc::new(runner), config.instruments.clone())
        .with_concurrency(config.collection.concurrency)
}

/// Schedule all triggers and wait for a shutdown signal.
async fn run_service(
    config: &AppConfig,
    store: Arc<SqliteStagingStore>,
) -> Result<(), Box<dyn std::error::Error>> {
    let registry = TriggerRegistry::new().await?;

    let collect = CollectTrigger::new(
        collection_scheduler(config, store.clone()),
        config.collect_schedule()?,
    );
    registry.spawn(collect).await?;

    if config.delivery.url.is_empty() {
        tracing::warn!("No delivery url configured, staged readings will not be sent");
    } else {
        let dispatcher = DeliveryDispatcher::new(config.delivery.clone(), store.clone())?;
        registry
            .spawn(SendTrigger::new(Arc::new(dispatcher), config.send_schedule()?))
            .await?;
    }

    let reaper = RetentionReaper::new(
        store.clone() as Arc<dyn StagingStore>,
        config.retention.interval_minutes,
    );
    registry
        .spawn(CleanTrigger::new(reaper, config.clean_schedule()?))
        .await?;

    registry.start().await?;
    for job in registry.list_jobs().await {
        tracing::info!("Scheduled trigger: {} ({})", job.name, job.schedule);
    }
    tracing::info!("Press Ctrl+C to shutdown");

    shutdown_signal().await;

    tracing::info!("Shutting down triggers...");
    if let Err(e) = registry.shutdown().await {
        tracing::error!("Failed to shutdown triggers: {}", e);
    }
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
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
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
