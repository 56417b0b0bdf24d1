//! TOML deploy configuration.
//!
//! Environment sections keep their `env:` prefix, so the header must be quoted:
//! `["env:prod"]`. An unquoted `[env:prod]` is a TOML syntax error. See
//! [`SAMPLE_CONFIG`] for a complete file.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use toml::{Table, Value};

use crate::domain::environment::{Environment, Environments};
use crate::domain::settings::{is_truthy, GlobalSettings, DEFAULT_PLAYBOOK_COMMAND};

pub const GLOBAL_SETTINGS_SECTION: &str = "global_settings";
pub const ENVIRONMENT_SECTION_PREFIX: &str = "env:";
pub const CONFIG_PATH_ENV: &str = "DEPLOYBOT_CONFIG";
const LOGGING_SECTION: &str = "logging";
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["deploybot.toml", "config/deploybot.toml"];

/// Minimal valid `deploybot.toml`, shown when no config file is found.
pub const SAMPLE_CONFIG: &str = r#"[global_settings]
user_whitelist = "U012ABC,U034DEF"
slack_app_token = "xapp-..."
slack_bot_token = "xoxb-..."
debug = "false"
playbook_command = "ansible-playbook"

["env:prod"]
playbook_params = "-i inventories/prod site.yml"
working_dir = "/srv/ansible"
"#;

/// One fresh read of the config file.
#[derive(Clone, Debug)]
pub struct DeploySnapshot {
    pub environments: Environments,
    pub settings: GlobalSettings,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_owned(), format: LogFormat::Compact }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error(
        "config file was not found: `{}`; expected TOML like:\n{}",
        .0.display(),
        SAMPLE_CONFIG
    )]
    MissingConfigFile(PathBuf),
    #[error("config section `[{0}]` is missing")]
    MissingSection(String),
    #[error("config section `[{section}]` is malformed: {source}")]
    InvalidSection { section: String, source: toml::de::Error },
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// Source of deploy configuration. Every call must return a fresh snapshot.
pub trait ConfigSource: Send + Sync {
    fn load(&self) -> Result<DeploySnapshot, ConfigError>;
}

/// Reads the TOML config file from disk on every [`ConfigSource::load`].
#[derive(Clone, Debug)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Resolves the config path: explicit option, then `DEPLOYBOT_CONFIG`, then the
    /// default locations relative to the working directory.
    pub fn discover(options: LoadOptions) -> Result<Self, ConfigError> {
        let explicit = options.config_path.or_else(|| read_env(CONFIG_PATH_ENV).map(PathBuf::from));
        if let Some(path) = explicit {
            if !path.exists() {
                return Err(ConfigError::MissingConfigFile(path));
            }
            return Ok(Self::new(path));
        }

        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|path| path.exists())
            .map(Self::new)
            .ok_or_else(|| ConfigError::MissingConfigFile(PathBuf::from(DEFAULT_CONFIG_PATHS[0])))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigSource for FileConfigStore {
    fn load(&self) -> Result<DeploySnapshot, ConfigError> {
        let raw = fs::read_to_string(&self.path)
            .map_err(|source| ConfigError::ReadFile { path: self.path.clone(), source })?;
        let mut snapshot = parse_document(&self.path, &raw)?;
        apply_env_overrides(&mut snapshot)?;
        validate_logging(&snapshot.logging)?;
        Ok(snapshot)
    }
}

pub fn parse_document(path: &Path, raw: &str) -> Result<DeploySnapshot, ConfigError> {
    let interpolated = interpolate_env_vars(raw)?;
    let document = interpolated
        .parse::<Table>()
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })?;

    let mut settings = None;
    let mut logging = LoggingConfig::default();
    let mut environments = Vec::new();

    for (section, value) in document {
        if section == GLOBAL_SETTINGS_SECTION {
            settings = Some(parse_global_settings(value)?);
        } else if section == LOGGING_SECTION {
            logging = parse_logging(value)?;
        } else if let Some(name) = section.strip_prefix(ENVIRONMENT_SECTION_PREFIX) {
            environments.push(parse_environment(&section, name, value)?);
        }
    }

    let settings =
        settings.ok_or_else(|| ConfigError::MissingSection(GLOBAL_SETTINGS_SECTION.to_owned()))?;

    Ok(DeploySnapshot { environments: Environments::new(environments), settings, logging })
}

fn parse_global_settings(value: Value) -> Result<GlobalSettings, ConfigError> {
    let Value::Table(table) = value else {
        return Err(ConfigError::Validation(format!(
            "`{GLOBAL_SETTINGS_SECTION}` must be a table"
        )));
    };

    let mut settings = GlobalSettings::default();
    for (key, value) in table {
        let value = setting_string(&key, value)?;
        match key.as_str() {
            "user_whitelist" => settings.user_whitelist = value,
            "slack_app_token" => settings.slack_app_token = value.into(), // ubs:ignore
            "slack_bot_token" => settings.slack_bot_token = value.into(), // ubs:ignore
            "debug" => settings.debug = is_truthy(&value),
            "playbook_command" => {
                settings.playbook_command = if value.trim().is_empty() {
                    DEFAULT_PLAYBOOK_COMMAND.to_owned()
                } else {
                    value
                };
            }
            _ => {}
        }
    }

    Ok(settings)
}

/// Global settings are a flat string mapping; scalars are accepted and stringified.
fn setting_string(key: &str, value: Value) -> Result<String, ConfigError> {
    match value {
        Value::String(value) => Ok(value),
        Value::Boolean(_) | Value::Integer(_) | Value::Float(_) | Value::Datetime(_) => {
            Ok(value.to_string())
        }
        Value::Array(_) | Value::Table(_) => Err(ConfigError::Validation(format!(
            "`{GLOBAL_SETTINGS_SECTION}.{key}` must be a plain value"
        ))),
    }
}

fn parse_environment(section: &str, name: &str, value: Value) -> Result<Environment, ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Validation(format!(
            "environment section `[\"{section}\"]` has an empty name"
        )));
    }

    let patch: EnvironmentPatch = value
        .try_into()
        .map_err(|source| ConfigError::InvalidSection { section: section.to_owned(), source })?;

    let playbook_params = patch.playbook_params.ok_or_else(|| {
        ConfigError::Validation(format!("`{section}.playbook_params` is required"))
    })?;
    let working_dir = patch
        .working_dir
        .filter(|dir| !dir.trim().is_empty())
        .ok_or_else(|| ConfigError::Validation(format!("`{section}.working_dir` is required")))?;

    Ok(Environment::new(name, &playbook_params, working_dir))
}

fn parse_logging(value: Value) -> Result<LoggingConfig, ConfigError> {
    let patch: LoggingPatch = value.try_into().map_err(|source| {
        ConfigError::InvalidSection { section: LOGGING_SECTION.to_owned(), source }
    })?;

    let mut logging = LoggingConfig::default();
    if let Some(level) = patch.level {
        logging.level = level;
    }
    if let Some(format) = patch.format {
        logging.format = format;
    }
    Ok(logging)
}

fn apply_env_overrides(snapshot: &mut DeploySnapshot) -> Result<(), ConfigError> {
    if let Some(value) = read_env("DEPLOYBOT_SLACK_APP_TOKEN") {
        snapshot.settings.slack_app_token = value.into(); // ubs:ignore
    }
    if let Some(value) = read_env("DEPLOYBOT_SLACK_BOT_TOKEN") {
        snapshot.settings.slack_bot_token = value.into(); // ubs:ignore
    }
    if let Some(value) = read_env("DEPLOYBOT_LOG_LEVEL") {
        snapshot.logging.level = value;
    }
    if let Some(value) = read_env("DEPLOYBOT_LOG_FORMAT") {
        snapshot.logging.format = value.parse()?;
    }
    Ok(())
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            output.push(ch);
            continue;
        }
        chars.next();

        let mut var = String::new();
        loop {
            match chars.next() {
                Some('}') => break,
                Some(next) => var.push(next),
                None => return Err(ConfigError::UnterminatedInterpolation),
            }
        }

        let value =
            env::var(&var).map_err(|_| ConfigError::MissingEnvInterpolation { var: var.clone() })?;
        output.push_str(&value);
    }

    Ok(output)
}

/// Token shape checks. Run once at startup and by `doctor`, not on every reload.
pub fn validate_credentials(settings: &GlobalSettings) -> Result<(), ConfigError> {
    let app_token = settings.slack_app_token.expose_secret(); // ubs:ignore
    if app_token.is_empty() {
        return Err(ConfigError::Validation(
            "global_settings.slack_app_token is required. Get it from https://api.slack.com/apps > Your App > Basic Information > App-Level Tokens".to_owned(),
        ));
    }
    if !app_token.starts_with("xapp-") {
        let hint = if app_token.starts_with("xoxb-") {
            " (hint: you may have used the bot token instead of the app token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "global_settings.slack_app_token must start with `xapp-`{hint}"
        )));
    }

    let bot_token = settings.slack_bot_token.expose_secret(); // ubs:ignore
    if bot_token.is_empty() {
        return Err(ConfigError::Validation(
            "global_settings.slack_bot_token is required. Get it from https://api.slack.com/apps > Your App > OAuth & Permissions > Bot User OAuth Token".to_owned(),
        ));
    }
    if !bot_token.starts_with("xoxb-") {
        let hint = if bot_token.starts_with("xapp-") {
            " (hint: you may have used the app token instead of the bot token)"
        } else {
            ""
        };
        return Err(ConfigError::Validation(format!(
            "global_settings.slack_bot_token must start with `xoxb-`{hint}"
        )));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    match logging.level.trim().to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_owned(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

#[derive(Debug, Default, Deserialize)]
struct EnvironmentPatch {
    playbook_params: Option<String>,
    working_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
