use std::env;
use std::fs;
use std::path::Path;

use deploybot_core::config::GLOBAL_SETTINGS_SECTION;
use deploybot_core::{ConfigSource, DeploySnapshot, FileConfigStore, LoadOptions};
use secrecy::ExposeSecret;
use serde::Serialize;
use toml::Table;

use crate::commands::CommandResult;

#[derive(Debug, Serialize)]
struct EffectiveConfig {
    config_path: String,
    settings: Vec<SettingLine>,
    environments: Vec<EnvironmentLine>,
}

#[derive(Debug, Serialize)]
struct SettingLine {
    key: String,
    value: String,
    source: String,
}

#[derive(Debug, Serialize)]
struct EnvironmentLine {
    name: String,
    playbook_params: Vec<String>,
    working_dir: String,
}

/// Prints effective values as JSON, tokens redacted, environments in file order.
pub fn run(options: LoadOptions) -> CommandResult {
    let store = match FileConfigStore::discover(options) {
        Ok(store) => store,
        Err(error) => {
            return CommandResult::failure("config", "config_not_found", error.to_string(), 2)
        }
    };
    let snapshot = match store.load() {
        Ok(snapshot) => snapshot,
        Err(error) => {
            return CommandResult::failure("config", "config_validation", error.to_string(), 2)
        }
    };

    let document = load_config_file_doc(store.path());
    let report = EffectiveConfig {
        config_path: store.path().display().to_string(),
        settings: settings_lines(&snapshot, document.as_ref(), store.path()),
        environments: snapshot
            .environments
            .iter()
            .map(|environment| EnvironmentLine {
                name: environment.name.clone(),
                playbook_params: environment.playbook_params.clone(),
                working_dir: environment.working_dir.display().to_string(),
            })
            .collect(),
    };

    match serde_json::to_string_pretty(&report) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure("config", "serialization", error.to_string(), 1),
    }
}

fn settings_lines(snapshot: &DeploySnapshot, doc: Option<&Table>, path: &Path) -> Vec<SettingLine> {
    let settings = &snapshot.settings;
    let global = |key: &str, env_key: Option<&str>, value: String| SettingLine {
        key: format!("{GLOBAL_SETTINGS_SECTION}.{key}"),
        value,
        source: field_source(GLOBAL_SETTINGS_SECTION, key, env_key, doc, path),
    };
    let logging = |key: &str, env_key: &str, value: String| SettingLine {
        key: format!("logging.{key}"),
        value,
        source: field_source("logging", key, Some(env_key), doc, path),
    };

    vec![
        global("user_whitelist", None, settings.user_whitelist.clone()),
        global(
            "slack_app_token",
            Some("DEPLOYBOT_SLACK_APP_TOKEN"),
            redact_token(settings.slack_app_token.expose_secret()), // ubs:ignore
        ),
        global(
            "slack_bot_token",
            Some("DEPLOYBOT_SLACK_BOT_TOKEN"),
            redact_token(settings.slack_bot_token.expose_secret()), // ubs:ignore
        ),
        global("debug", None, settings.debug.to_string()),
        global("playbook_command", None, settings.playbook_command.clone()),
        logging("level", "DEPLOYBOT_LOG_LEVEL", snapshot.logging.level.clone()),
        logging("format", "DEPLOYBOT_LOG_FORMAT", format!("{:?}", snapshot.logging.format)),
    ]
}

fn load_config_file_doc(path: &Path) -> Option<Table> {
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Table>().ok()
}

fn field_source(
    section: &str,
    key: &str,
    env_key: Option<&str>,
    doc: Option<&Table>,
    path: &Path,
) -> String {
    if let Some(env_key) = env_key {
        if env::var(env_key).is_ok_and(|value| !value.trim().is_empty()) {
            return format!("env ({env_key})");
        }
    }

    let in_file = doc
        .and_then(|doc| doc.get(section))
        .and_then(|section| section.get(key))
        .is_some();
    if in_file {
        return format!("file ({})", path.display());
    }

    "default".to_string()
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
