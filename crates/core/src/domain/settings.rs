use secrecy::SecretString;

pub const DEFAULT_PLAYBOOK_COMMAND: &str = "ansible-playbook";

/// Values from the `[global_settings]` section.
///
/// Tokens are wrapped in [`SecretString`] so `{:?}` never prints them.
#[derive(Clone, Debug)]
pub struct GlobalSettings {
    /// Comma-separated Slack user ids allowed to deploy.
    pub user_whitelist: String,
    pub slack_app_token: SecretString,
    pub slack_bot_token: SecretString,
    pub debug: bool,
    pub playbook_command: String,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            user_whitelist: String::new(),
            slack_app_token: String::new().into(),
            slack_bot_token: String::new().into(),
            debug: false,
            playbook_command: DEFAULT_PLAYBOOK_COMMAND.to_owned(),
        }
    }
}

pub fn is_truthy(value: &str) -> bool {
    value.eq_ignore_ascii_case("true")
}
