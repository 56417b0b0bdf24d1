use std::sync::Arc;

use deploybot_core::runner::{self, log_tail, LOG_TAIL_CHARS};
use deploybot_core::{Environment, JobGuard};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::blocks::{self, MessageTemplate};
use crate::events::ThreadTarget;
use crate::web::Notifier;

/// Everything a background run needs; owned so the task can outlive the event.
#[derive(Clone, Debug)]
pub struct DeployJob {
    pub environment: Environment,
    pub playbook_command: String,
    pub reply_to: ThreadTarget,
    pub correlation_id: String,
}

/// Runs playbooks in the background and reports the result into the thread.
#[derive(Clone)]
pub struct JobRunner {
    notifier: Arc<dyn Notifier>,
}

impl JobRunner {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    /// Detaches the run. Completion is only observable through the notifier.
    pub fn spawn(&self, job: DeployJob, guard: JobGuard) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(job, guard).await })
    }

    /// Executes the job and posts "Deployment done"/"Deployment failed", then the
    /// log tail when there is any output. A playbook that never started has no
    /// output; the launch error stays in the logs.
    ///
    /// `guard` is held for the whole run and released on every exit path, so the
    /// environment never stays marked as running.
    pub async fn run(&self, job: DeployJob, guard: JobGuard) {
        let _guard = guard;
        let env_name = job.environment.name.as_str();

        let (success, output) =
            match runner::execute(&job.playbook_command, &job.environment).await {
                Ok(outcome) => (outcome.success, outcome.output),
                Err(error) => {
                    warn!(
                        event_name = "job.playbook.launch_failed",
                        env_name,
                        correlation_id = %job.correlation_id,
                        error = %error,
                        "playbook could not be run"
                    );
                    (false, String::new())
                }
            };

        info!(
            event_name = "job.deploy.completed",
            env_name,
            correlation_id = %job.correlation_id,
            success,
            "deployment finished"
        );

        self.notify(&job, &blocks::deployment_result_message(success)).await;
        if !output.is_empty() {
            let tail = log_tail(&output, LOG_TAIL_CHARS);
            self.notify(&job, &blocks::log_output_message(tail)).await;
        }
    }

    async fn notify(&self, job: &DeployJob, message: &MessageTemplate) {
        if let Err(error) = self.notifier.post(&job.reply_to, message).await {
            warn!(
                event_name = "egress.slack.post_failed",
                env_name = %job.environment.name,
                correlation_id = %job.correlation_id,
                channel_id = %job.reply_to.channel_id,
                thread_ts = %job.reply_to.thread_ts,
                error = %error,
                "failed to post job notification"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use deploybot_core::{Environment, JobRegistry};
    use tokio::sync::Mutex;

    use super::{DeployJob, JobRunner};
    use crate::blocks::MessageTemplate;
    use crate::events::ThreadTarget;
    use crate::web::{Notifier, NotifyError};

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<MessageTemplate>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn post(
            &self,
            _target: &ThreadTarget,
            message: &MessageTemplate,
        ) -> Result<(), NotifyError> {
            self.messages.lock().await.push(message.clone());
            if self.fail {
                return Err(NotifyError::Api {
                    method: "chat.postMessage",
                    error: "not_in_channel".to_owned(),
                });
            }
            Ok(())
        }
    }

    fn job(environment: Environment, playbook_command: &str) -> DeployJob {
        DeployJob {
            environment,
            playbook_command: playbook_command.to_owned(),
            reply_to: ThreadTarget { channel_id: "C1".to_owned(), thread_ts: "1.0".to_owned() },
            correlation_id: "env-1".to_owned(),
        }
    }

    #[tokio::test]
    async fn launch_failure_reports_failure_and_releases_registry() {
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = JobRegistry::new();
        let runner = JobRunner::new(notifier.clone());
        let guard = registry.try_claim("prod").expect("claim");

        let environment = Environment::new("prod", "site.yml", "/tmp");
        runner.run(job(environment, "deploybot-no-such-playbook-binary"), guard).await;

        let messages = notifier.messages.lock().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].fallback_text, "Deployment failed");
        assert!(messages[0].blocks.is_empty());
        assert!(!registry.is_running("prod"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn notifier_failures_do_not_keep_the_environment_locked() {
        let notifier = Arc::new(RecordingNotifier { fail: true, ..RecordingNotifier::default() });
        let registry = JobRegistry::new();
        let runner = JobRunner::new(notifier.clone());
        let dir = tempfile::TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("play.sh"), "echo applied\n").expect("script");

        let environment = Environment::new("prod", "play.sh", dir.path());
        let guard = registry.try_claim("prod").expect("claim");
        runner.spawn(job(environment, "sh"), guard).await.expect("job task");

        assert_eq!(notifier.messages.lock().await.len(), 2);
        assert!(!registry.is_running("prod"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn missing_working_dir_keeps_host_paths_out_of_the_thread() {
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = JobRegistry::new();
        let runner = JobRunner::new(notifier.clone());
        let dir = tempfile::TempDir::new().expect("tempdir");
        let working_dir = dir.path().join("prod");

        let environment = Environment::new("prod", "site.yml", &working_dir);
        let guard = registry.try_claim("prod").expect("claim");
        runner.spawn(job(environment, "sh"), guard).await.expect("job task");

        let messages = notifier.messages.lock().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].fallback_text, "Deployment failed");
        let posted = serde_json::to_string(&*messages).expect("serialize");
        assert!(!posted.contains("os error"));
        assert!(!posted.contains(&*working_dir.to_string_lossy()));
        assert!(!registry.is_running("prod"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn silent_success_posts_only_the_status() {
        let notifier = Arc::new(RecordingNotifier::default());
        let registry = JobRegistry::new();
        let runner = JobRunner::new(notifier.clone());
        let dir = tempfile::TempDir::new().expect("tempdir");
        std::fs::write(dir.path().join("play.sh"), "exit 0\n").expect("script");

        let environment = Environment::new("prod", "play.sh", dir.path());
        let guard = registry.try_claim("prod").expect("claim");
        runner.spawn(job(environment, "sh"), guard).await.expect("job task");

        let messages = notifier.messages.lock().await;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].fallback_text, "Deployment done");
    }
}
