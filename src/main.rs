//! bantracker - IRC channel ban and quiet tracker.

use std::sync::Arc;

use anyhow::Context as _;
use bantracker::config::{ChannelConfigStore, Config, LogFormat, validate};
use bantracker::db::Database;
use bantracker::run_network;
use bantracker::tracker::Context;
use tokio::task::JoinSet;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    match format {
        LogFormat::Pretty => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "bantracker.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {config_path}"))?;
    init_tracing(config.bot.log_format);

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        anyhow::bail!("{} configuration error(s) in {config_path}", errors.len());
    }

    info!(
        path = %config_path,
        networks = config.networks.len(),
        "Starting bantracker"
    );

    let mut tasks = JoinSet::new();
    for network in config.networks {
        let bot = config.bot.for_network(&network.name);
        let db_path = bot.database_path();
        let db = Database::new(&db_path.to_string_lossy())
            .await
            .with_context(|| format!("failed to open database {}", db_path.display()))?;
        info!(network = %network.name, path = %db_path.display(), "Database ready");

        let channels = Arc::new(ChannelConfigStore::new(bot.channels_dir()));
        let ctx = Context::new(db, channels, bot);
        tasks.spawn(run_network(ctx, network));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
        Some(res) = tasks.join_next() => {
            if let Err(e) = res {
                error!(error = %e, "Network task panicked");
            }
        }
    }
    tasks.shutdown().await;
    Ok(())
}
