use std::sync::Arc;

use clap::Parser;
use sentinel::{
    alerts::AlertManager,
    config::Config,
    scheduler::{Scheduler, SchedulerConfig},
    storage::{models::CheckInput, SqliteStorage, Storage},
};
use tracing::{error, info, level_filters::LevelFilter, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
#[command(name = "sentinel", version, about = "Self-hosted uptime monitoring")]
struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "sentinel.yaml")]
    config: String,
}

fn init() {
    let filter = filter::Targets::new().with_target("sentinel", LevelFilter::INFO);
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).compact())
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let args = Args::parse();

    let config = Config::load_with_env(&args.config)?;
    info!("starting sentinel on {}:{}", config.server.host, config.server.port);

    let storage: Arc<dyn Storage> = Arc::new(SqliteStorage::new(&config.database.path).await?);
    info!("using database at {}", config.database.path);

    // Upsert configured checks by URL; existing rows keep their edits.
    for check_config in &config.checks {
        match storage.check_by_url(&check_config.url).await {
            Ok(Some(_)) => continue,
            Ok(None) => {}
            Err(e) => {
                warn!("failed to look up check {}: {e}", check_config.name);
                continue;
            }
        }

        let check = CheckInput {
            name: check_config.name.clone(),
            url: check_config.url.clone(),
            interval_seconds: check_config.interval().as_secs() as i64,
            timeout_seconds: check_config.timeout().as_secs() as i64,
            expected_status: check_config.expected_status(),
            enabled: Some(check_config.is_enabled()),
            tags: check_config.tags.clone(),
        }
        .into_check();

        match storage.create_check(&check).await {
            Ok(created) => info!("created check: {}", created.name),
            Err(e) => error!("failed to create check {}: {e}", check.name),
        }
    }

    let alerter = Arc::new(AlertManager::new(config.alerts.clone(), storage.clone()));
    let scheduler = Scheduler::new(
        storage.clone(),
        alerter,
        SchedulerConfig {
            consecutive_failures: config.alerts.consecutive_failures,
            retention: config.retention.clone(),
        },
    );

    scheduler.start().await?;
    info!("monitoring active, press Ctrl+C to shut down");

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("unable to listen for shutdown signal: {e}");
    }

    info!("shutting down...");
    scheduler.stop().await;

    if let Err(e) = storage.close().await {
        warn!("error closing storage: {e}");
    }

    Ok(())
}
