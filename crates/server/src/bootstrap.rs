use std::sync::Arc;

use deploybot_core::config::validate_credentials;
use deploybot_core::{ConfigError, DeploySnapshot, FileConfigStore, JobRegistry};
use deploybot_slack::dispatcher::DeployDispatcher;
use deploybot_slack::socket::{ReconnectPolicy, SocketModeRunner};
use deploybot_slack::socket_mode::SlackSocketTransport;
use deploybot_slack::web::{NotifyError, SlackWebClient};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub store: FileConfigStore,
    pub registry: JobRegistry,
    pub slack_runner: SocketModeRunner,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("slack client setup failed: {0}")]
    SlackClient(#[source] NotifyError),
}

/// Wires the live Socket Mode transport, dispatcher and job runner.
///
/// `snapshot` is only used for the startup credential check; the dispatcher
/// rereads `store` for every event.
pub fn bootstrap_with_config(
    store: FileConfigStore,
    snapshot: &DeploySnapshot,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        config_path = %store.path().display(),
        environments = snapshot.environments.len(),
        "starting application bootstrap"
    );
    validate_credentials(&snapshot.settings)?;

    let web = SlackWebClient::new(
        snapshot.settings.slack_bot_token.clone(), // ubs:ignore
        snapshot.settings.slack_app_token.clone(), // ubs:ignore
    )
    .map_err(BootstrapError::SlackClient)?;

    let registry = JobRegistry::new();
    let dispatcher = DeployDispatcher::new(
        Arc::new(store.clone()),
        registry.clone(),
        Arc::new(web.clone()),
    );
    let slack_runner = SocketModeRunner::new(
        Arc::new(SlackSocketTransport::new(web)),
        Arc::new(dispatcher),
        ReconnectPolicy::default(),
    );

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        "socket mode runner wired"
    );
    Ok(Application { store, registry, slack_runner })
}
