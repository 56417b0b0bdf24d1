use std::io::SeekFrom;
use std::path::PathBuf;
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::environment::Environment;

/// Maximum number of characters of captured output echoed back to chat.
pub const LOG_TAIL_CHARS: usize = 2000;

/// Result of one playbook run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeployOutcome {
    pub env_name: String,
    pub success: bool,
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    /// Interleaved stdout and stderr.
    pub output: String,
}

#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("playbook executable `{command}` could not be resolved: {source}")]
    ExecutableNotFound { command: String, source: which::Error },
    #[error("could not prepare output capture: {0}")]
    Capture(#[source] std::io::Error),
    #[error("could not start `{program}` in `{working_dir}`: {source}")]
    Spawn { program: PathBuf, working_dir: PathBuf, source: std::io::Error },
    #[error("failed while waiting for the playbook process: {0}")]
    Wait(#[source] std::io::Error),
}

/// Runs `command` with the environment's playbook params inside its working dir.
///
/// The executable is resolved on `PATH` for every run. Both output streams are
/// written to one anonymous temporary file through duplicated handles, so the
/// capture keeps the order the process wrote in. There is no timeout.
pub async fn execute(
    command: &str,
    environment: &Environment,
) -> Result<DeployOutcome, ExecutionError> {
    let program = which::which(command).map_err(|source| ExecutionError::ExecutableNotFound {
        command: command.to_owned(),
        source,
    })?;

    let capture = tempfile::tempfile().map_err(ExecutionError::Capture)?;
    let stdout = capture.try_clone().map_err(ExecutionError::Capture)?;
    let stderr = capture.try_clone().map_err(ExecutionError::Capture)?;

    info!(
        event_name = "job.playbook.started",
        env_name = %environment.name,
        program = %program.display(),
        working_dir = %environment.working_dir.display(),
        args = ?environment.playbook_params,
        "starting playbook"
    );

    let mut child = Command::new(&program)
        .args(&environment.playbook_params)
        .current_dir(&environment.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn()
        .map_err(|source| ExecutionError::Spawn {
            program: program.clone(),
            working_dir: environment.working_dir.clone(),
            source,
        })?;
    let status = child.wait().await.map_err(ExecutionError::Wait)?;

    let mut capture = tokio::fs::File::from_std(capture);
    capture.seek(SeekFrom::Start(0)).await.map_err(ExecutionError::Capture)?;
    let mut bytes = Vec::new();
    capture.read_to_end(&mut bytes).await.map_err(ExecutionError::Capture)?;
    let output = String::from_utf8_lossy(&bytes).into_owned();

    info!(
        event_name = "job.playbook.finished",
        env_name = %environment.name,
        success = status.success(),
        exit_code = ?status.code(),
        output_bytes = bytes.len(),
        "playbook finished"
    );
    debug!(env_name = %environment.name, output = %output, "playbook output");

    Ok(DeployOutcome {
        env_name: environment.name.clone(),
        success: status.success(),
        exit_code: status.code(),
        output,
    })
}

/// The last `max_chars` characters of `output`, counted in chars rather than bytes.
pub fn log_tail(output: &str, max_chars: usize) -> &str {
    let total = output.chars().count();
    if total <= max_chars {
        return output;
    }

    let start = output.char_indices().nth(total - max_chars).map_or(output.len(), |(idx, _)| idx);
    &output[start..]
}

#[cfg(test)]
mod tests {
    use super::{log_tail, LOG_TAIL_CHARS};

    #[test]
    fn short_output_is_returned_whole() {
        assert_eq!(log_tail("ok\n", LOG_TAIL_CHARS), "ok\n");
        assert_eq!(log_tail("", LOG_TAIL_CHARS), "");
    }

    #[test]
    fn long_output_keeps_exactly_the_tail() {
        let head = "h".repeat(500);
        let tail: String =
            (0..LOG_TAIL_CHARS).map(|idx| if idx % 7 == 0 { '\n' } else { 't' }).collect();
        let output = format!("{head}{tail}");

        let kept = log_tail(&output, LOG_TAIL_CHARS);
        assert_eq!(kept.chars().count(), LOG_TAIL_CHARS);
        assert_eq!(kept, tail);
    }

    #[test]
    fn tail_respects_multibyte_characters() {
        let output = format!("{}{}", "é".repeat(10), "ü".repeat(5));
        assert_eq!(log_tail(&output, 5), "üüüüü");
        assert_eq!(log_tail(&output, 6), "éüüüüü");
    }

    #[cfg(unix)]
    mod process {
        use std::fs;
        use std::path::Path;

        use tempfile::TempDir;

        use crate::domain::environment::Environment;
        use crate::runner::{execute, ExecutionError};

        fn script_env(dir: &TempDir, script: &str) -> Environment {
            fs::write(dir.path().join("play.sh"), script).expect("write script");
            Environment::new("prod", "play.sh", dir.path())
        }

        #[tokio::test]
        async fn successful_run_captures_both_streams() {
            let dir = TempDir::new().expect("tempdir");
            let environment = script_env(&dir, "echo out-line\necho err-line >&2\nexit 0\n");

            let outcome = execute("sh", &environment).await.expect("execute");

            assert!(outcome.success);
            assert_eq!(outcome.exit_code, Some(0));
            assert_eq!(outcome.env_name, "prod");
            assert_eq!(outcome.output, "out-line\nerr-line\n");
        }

        #[tokio::test]
        async fn non_zero_exit_is_a_failed_outcome_not_an_error() {
            let dir = TempDir::new().expect("tempdir");
            let environment = script_env(&dir, "echo 'error: timeout' >&2\nexit 3\n");

            let outcome = execute("sh", &environment).await.expect("execute");

            assert!(!outcome.success);
            assert_eq!(outcome.exit_code, Some(3));
            assert!(outcome.output.contains("error: timeout"));
        }

        #[tokio::test]
        async fn runs_inside_the_working_dir() {
            let dir = TempDir::new().expect("tempdir");
            let environment = script_env(&dir, "pwd\n");

            let outcome = execute("sh", &environment).await.expect("execute");

            let dir_name = dir.path().file_name().and_then(|name| name.to_str()).expect("name");
            assert!(outcome.output.trim_end().ends_with(dir_name));
        }

        #[tokio::test]
        async fn silent_run_has_empty_output() {
            let dir = TempDir::new().expect("tempdir");
            let environment = script_env(&dir, "exit 0\n");

            let outcome = execute("sh", &environment).await.expect("execute");
            assert!(outcome.output.is_empty());
        }

        #[tokio::test]
        async fn unknown_executable_is_reported() {
            let dir = TempDir::new().expect("tempdir");
            let environment = script_env(&dir, "exit 0\n");

            let error = execute("deploybot-no-such-playbook-binary", &environment)
                .await
                .expect_err("should fail");
            assert!(matches!(error, ExecutionError::ExecutableNotFound { .. }));
        }

        #[tokio::test]
        async fn missing_working_dir_fails_to_spawn() {
            let environment =
                Environment::new("prod", "play.sh", Path::new("/nonexistent/deploybot/dir"));

            let error = execute("sh", &environment).await.expect_err("should fail");
            assert!(matches!(error, ExecutionError::Spawn { .. }));
        }
    }
}
