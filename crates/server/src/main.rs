mod bootstrap;

use anyhow::Result;
use deploybot_core::config::{LogFormat, LoggingConfig};
use deploybot_core::{ConfigSource, FileConfigStore, LoadOptions};

fn init_logging(logging: &LoggingConfig) {
    use tracing::Level;

    let log_level = logging.level.parse::<Level>().unwrap_or(Level::INFO);

    match logging.format {
        LogFormat::Compact => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).compact().init();
        }
        LogFormat::Pretty => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).pretty().init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt().with_target(false).with_max_level(log_level).json().init();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    run().await
}

pub async fn run() -> Result<()> {
    // Config decides the log format, so it is loaded before logging exists.
    let store = FileConfigStore::discover(LoadOptions::default())?;
    let snapshot = store.load()?;
    init_logging(&snapshot.logging);

    let app = bootstrap::bootstrap_with_config(store, &snapshot)?;

    tracing::info!(
        event_name = "system.server.started",
        correlation_id = "bootstrap",
        config_path = %app.store.path().display(),
        "deploybot-server started"
    );

    tokio::select! {
        result = app.slack_runner.start() => {
            result?;
            tracing::warn!(
                event_name = "system.server.transport_stopped",
                correlation_id = "runtime",
                "socket mode runner stopped; waiting for shutdown signal"
            );
            wait_for_shutdown().await?;
        }
        signal = wait_for_shutdown() => signal?,
    }

    tracing::info!(
        event_name = "system.server.stopping",
        correlation_id = "shutdown",
        running = ?app.registry.running_environments(),
        "deploybot-server stopping"
    );

    Ok(())
}

async fn wait_for_shutdown() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}
