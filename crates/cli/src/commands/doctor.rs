use deploybot_core::config::validate_credentials;
use deploybot_core::{ConfigSource, DeploySnapshot, FileConfigStore, LoadOptions};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct DoctorCheck {
    name: String,
    status: CheckStatus,
    details: String,
}

impl DoctorCheck {
    fn new(name: impl Into<String>, status: CheckStatus, details: impl Into<String>) -> Self {
        Self { name: name.into(), status, details: details.into() }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<DoctorCheck>,
}

pub fn run(options: LoadOptions, json_output: bool) -> CommandResult {
    let report = build_report(options);
    let exit_code = if report.overall_status == CheckStatus::Pass { 0 } else { 1 };

    let output = if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|error| {
            format!(
                "{{\"overall_status\":\"fail\",\"summary\":\"doctor serialization failed\",\"error\":\"{}\"}}",
                escape_json(&error.to_string())
            )
        })
    } else {
        render_human(&report)
    };

    CommandResult { exit_code, output }
}

fn build_report(options: LoadOptions) -> DoctorReport {
    let mut checks = Vec::new();

    match FileConfigStore::discover(options).and_then(|store| store.load()) {
        Ok(snapshot) => {
            checks.push(DoctorCheck::new(
                "config_validation",
                CheckStatus::Pass,
                format!("loaded {} environment(s)", snapshot.environments.len()),
            ));
            checks.push(check_slack_tokens(&snapshot));
            checks.push(check_playbook_command(&snapshot));
            checks.extend(check_working_dirs(&snapshot));
        }
        Err(error) => {
            let details = error.to_string();
            checks.push(DoctorCheck::new("config_validation", CheckStatus::Fail, details));
            for name in ["slack_token_readiness", "playbook_executable", "working_dirs"] {
                checks.push(DoctorCheck::new(
                    name,
                    CheckStatus::Skipped,
                    "skipped because configuration did not load",
                ));
            }
        }
    }

    let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
    let overall_status = if all_pass { CheckStatus::Pass } else { CheckStatus::Fail };
    let summary = if all_pass {
        "doctor: all readiness checks passed".to_string()
    } else {
        "doctor: one or more readiness checks failed".to_string()
    };

    DoctorReport { overall_status, summary, checks }
}

fn check_slack_tokens(snapshot: &DeploySnapshot) -> DoctorCheck {
    const NAME: &str = "slack_token_readiness";
    match validate_credentials(&snapshot.settings) {
        Ok(()) => DoctorCheck::new(NAME, CheckStatus::Pass, "xapp-/xoxb- tokens present"),
        Err(error) => DoctorCheck::new(NAME, CheckStatus::Fail, error.to_string()),
    }
}

fn check_playbook_command(snapshot: &DeploySnapshot) -> DoctorCheck {
    let command = &snapshot.settings.playbook_command;
    match which::which(command) {
        Ok(path) => DoctorCheck::new(
            "playbook_executable",
            CheckStatus::Pass,
            format!("`{command}` resolves to `{}`", path.display()),
        ),
        Err(error) => DoctorCheck::new(
            "playbook_executable",
            CheckStatus::Fail,
            format!("`{command}` is not on PATH: {error}"),
        ),
    }
}

/// One check per environment, in config order.
fn check_working_dirs(snapshot: &DeploySnapshot) -> Vec<DoctorCheck> {
    snapshot
        .environments
        .iter()
        .map(|environment| {
            let name = format!("working_dir:{}", environment.name);
            let dir = environment.working_dir.display();
            if environment.working_dir.is_dir() {
                DoctorCheck::new(name, CheckStatus::Pass, format!("`{dir}` exists"))
            } else {
                DoctorCheck::new(name, CheckStatus::Fail, format!("`{dir}` is not a directory"))
            }
        })
        .collect()
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = Vec::new();
    lines.push(report.summary.clone());

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}

fn escape_json(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
