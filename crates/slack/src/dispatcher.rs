use std::sync::Arc;

use async_trait::async_trait;
use deploybot_core::auth::is_authorized;
use deploybot_core::{
    parse_command, ConfigError, ConfigSource, DeployRejection, DeploySnapshot, Intent,
    JobRegistry,
};
use thiserror::Error;
use tracing::{info, warn};

use crate::blocks::{self, MessageTemplate};
use crate::events::{AppMentionEvent, EventContext, SlackEnvelope, SlackEvent, ThreadTarget};
use crate::jobs::{DeployJob, JobRunner};
use crate::web::Notifier;

/// Terminal state of one intent within an inbound event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Listed { environments: Vec<String> },
    Dispatched { env_name: String },
    Rejected(DeployRejection),
    Ignored,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<Vec<DispatchOutcome>, DispatchError>;
}

/// Turns mentions into replies and background deploy jobs.
///
/// Handling never waits for a job: a passing `deploy` claims the registry entry,
/// replies, spawns the run and returns.
pub struct DeployDispatcher {
    config: Arc<dyn ConfigSource>,
    registry: JobRegistry,
    notifier: Arc<dyn Notifier>,
    jobs: JobRunner,
}

impl DeployDispatcher {
    pub fn new(
        config: Arc<dyn ConfigSource>,
        registry: JobRegistry,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let jobs = JobRunner::new(notifier.clone());
        Self { config, registry, notifier, jobs }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    async fn handle_mention(
        &self,
        snapshot: &DeploySnapshot,
        mention: &AppMentionEvent,
        ctx: &EventContext,
    ) -> Vec<DispatchOutcome> {
        let target = mention.reply_target();
        let mut outcomes = Vec::new();

        for intent in parse_command(&mention.text) {
            let outcome = match intent {
                Ok(Intent::List) => self.list_environments(snapshot, &target).await,
                Ok(Intent::Deploy { env_name }) => {
                    self.start_deploy(snapshot, mention, Ok(env_name), ctx).await
                }
                Err(error) => self.start_deploy(snapshot, mention, Err(error.into()), ctx).await,
                Ok(Intent::Unrecognized) => DispatchOutcome::Ignored,
            };
            outcomes.push(outcome);
        }

        outcomes
    }

    async fn list_environments(
        &self,
        snapshot: &DeploySnapshot,
        target: &ThreadTarget,
    ) -> DispatchOutcome {
        let names = snapshot.environments.names();
        self.reply(target, &blocks::environment_list_message(&names)).await;
        DispatchOutcome::Listed { environments: names.into_iter().map(str::to_owned).collect() }
    }

    async fn start_deploy(
        &self,
        snapshot: &DeploySnapshot,
        mention: &AppMentionEvent,
        env_name: Result<String, DeployRejection>,
        ctx: &EventContext,
    ) -> DispatchOutcome {
        let target = mention.reply_target();
        match self.admit(snapshot, mention, env_name, ctx).await {
            Ok(env_name) => DispatchOutcome::Dispatched { env_name },
            Err(rejection) => {
                info!(
                    event_name = "dispatch.deploy.rejected",
                    correlation_id = %ctx.correlation_id,
                    user_id = %mention.user_id,
                    reason = %rejection,
                    "deploy request rejected"
                );
                self.reply(&target, &MessageTemplate::text(rejection.user_message())).await;
                DispatchOutcome::Rejected(rejection)
            }
        }
    }

    /// Guards run in order: allow-list, environment name, known environment,
    /// single-flight claim. Only the last one has side effects.
    async fn admit(
        &self,
        snapshot: &DeploySnapshot,
        mention: &AppMentionEvent,
        env_name: Result<String, DeployRejection>,
        ctx: &EventContext,
    ) -> Result<String, DeployRejection> {
        if !is_authorized(&mention.user_id, &snapshot.settings.user_whitelist) {
            return Err(DeployRejection::Unauthorized { user_id: mention.user_id.clone() });
        }
        let env_name = env_name?;
        let environment = snapshot
            .environments
            .get(&env_name)
            .ok_or_else(|| DeployRejection::UnknownEnvironment(env_name.clone()))?;
        let guard = self
            .registry
            .try_claim(&env_name)
            .ok_or_else(|| DeployRejection::AlreadyRunning(env_name.clone()))?;

        let target = mention.reply_target();
        self.reply(&target, &blocks::deployment_started_message(&env_name)).await;

        info!(
            event_name = "dispatch.deploy.started",
            correlation_id = %ctx.correlation_id,
            user_id = %mention.user_id,
            env_name = %env_name,
            "launching deployment job"
        );
        self.jobs.spawn(
            DeployJob {
                environment: environment.clone(),
                playbook_command: snapshot.settings.playbook_command.clone(),
                reply_to: target,
                correlation_id: ctx.correlation_id.clone(),
            },
            guard,
        );

        Ok(env_name)
    }

    async fn reply(&self, target: &ThreadTarget, message: &MessageTemplate) {
        if let Err(error) = self.notifier.post(target, message).await {
            warn!(
                event_name = "egress.slack.post_failed",
                channel_id = %target.channel_id,
                thread_ts = %target.thread_ts,
                error = %error,
                "failed to post reply"
            );
        }
    }
}

#[async_trait]
impl EventHandler for DeployDispatcher {
    async fn handle(
        &self,
        envelope: &SlackEnvelope,
        ctx: &EventContext,
    ) -> Result<Vec<DispatchOutcome>, DispatchError> {
        let snapshot = self.config.load()?;

        if snapshot.settings.debug {
            info!(
                event_name = "ingress.slack.debug_dump",
                correlation_id = %ctx.correlation_id,
                envelope = ?envelope,
                "inbound envelope"
            );
        }

        let SlackEvent::AppMention(mention) = &envelope.event else {
            return Ok(vec![DispatchOutcome::Ignored]);
        };
        if mention.channel_id.is_empty() {
            return Ok(vec![DispatchOutcome::Ignored]);
        }

        Ok(self.handle_mention(&snapshot, mention, ctx).await)
    }
}
