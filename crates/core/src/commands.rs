use thiserror::Error;

const LIST_TOKEN: &str = "list";
const DEPLOY_TOKEN: &str = "deploy";

/// What a mention asked for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Intent {
    List,
    Deploy { env_name: String },
    Unrecognized,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CommandParseError {
    #[error("could not parse environment name")]
    EnvironmentName,
}

/// Extracts every intent present in `text`, `List` first.
///
/// `list` and `deploy` are matched as raw substrings and checked independently,
/// so a single message may carry both. A message with neither yields
/// `[Ok(Intent::Unrecognized)]`.
pub fn parse_command(text: &str) -> Vec<Result<Intent, CommandParseError>> {
    let mut intents = Vec::new();

    if text.contains(LIST_TOKEN) {
        intents.push(Ok(Intent::List));
    }
    if text.contains(DEPLOY_TOKEN) {
        intents.push(parse_deploy(text).map(|env_name| Intent::Deploy { env_name }));
    }
    if intents.is_empty() {
        intents.push(Ok(Intent::Unrecognized));
    }

    intents
}

/// The environment is whatever follows the only `deploy`, trimmed.
///
/// More than one `deploy`, or nothing after it, is rejected rather than guessed at.
pub fn parse_deploy(text: &str) -> Result<String, CommandParseError> {
    let parts: Vec<&str> = text.split(DEPLOY_TOKEN).collect();
    let [_, env_name] = parts.as_slice() else {
        return Err(CommandParseError::EnvironmentName);
    };

    let env_name = env_name.trim();
    if env_name.is_empty() {
        return Err(CommandParseError::EnvironmentName);
    }
    Ok(env_name.to_owned())
}

#[cfg(test)]
mod tests {
    use super::{parse_command, parse_deploy, CommandParseError, Intent};

    fn deploy(env_name: &str) -> Result<Intent, CommandParseError> {
        Ok(Intent::Deploy { env_name: env_name.to_owned() })
    }

    #[test]
    fn mention_with_deploy_yields_trimmed_environment() {
        assert_eq!(parse_command("<@UBOT> deploy prod"), vec![deploy("prod")]);
        assert_eq!(parse_command("<@UBOT> deploy   prod  \n"), vec![deploy("prod")]);
    }

    #[test]
    fn everything_after_deploy_is_the_environment_name() {
        assert_eq!(parse_deploy("@bot deploy prod eu-west"), Ok("prod eu-west".to_owned()));
    }

    #[test]
    fn deploy_without_environment_is_a_parse_error() {
        assert_eq!(parse_command("@bot deploy"), vec![Err(CommandParseError::EnvironmentName)]);
        assert_eq!(parse_deploy("@bot deploy    "), Err(CommandParseError::EnvironmentName));
    }

    #[test]
    fn repeated_deploy_is_rejected_not_guessed() {
        assert_eq!(
            parse_deploy("@bot deploy prod deploy"),
            Err(CommandParseError::EnvironmentName)
        );
        assert_eq!(parse_deploy("deploy deploy"), Err(CommandParseError::EnvironmentName));
        assert_eq!(
            CommandParseError::EnvironmentName.to_string(),
            "could not parse environment name"
        );
    }

    #[test]
    fn deploy_match_has_no_word_boundary() {
        assert_eq!(parse_command("@bot redeploy prod"), vec![deploy("prod")]);
    }

    #[test]
    fn list_is_recognized_anywhere_in_the_text() {
        assert_eq!(parse_command("<@UBOT> list"), vec![Ok(Intent::List)]);
        assert_eq!(parse_command("what is on the playlist?"), vec![Ok(Intent::List)]);
    }

    #[test]
    fn list_and_deploy_are_independent() {
        assert_eq!(
            parse_command("@bot list then deploy staging"),
            vec![Ok(Intent::List), deploy("staging")]
        );
    }

    #[test]
    fn other_text_is_unrecognized() {
        assert_eq!(parse_command("@bot hello"), vec![Ok(Intent::Unrecognized)]);
        assert_eq!(parse_command(""), vec![Ok(Intent::Unrecognized)]);
        assert_eq!(parse_command("@bot DEPLOY prod"), vec![Ok(Intent::Unrecognized)]);
    }
}
