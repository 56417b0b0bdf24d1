use thiserror::Error;

use crate::commands::CommandParseError;

/// Reasons a deploy request is turned away before any job starts.
///
/// These are recovered locally and surfaced to the requester as a single line.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DeployRejection {
    #[error("requester `{user_id}` is not on the allow-list")]
    Unauthorized { user_id: String },
    #[error(transparent)]
    Parse(#[from] CommandParseError),
    #[error("environment `{0}` is not configured")]
    UnknownEnvironment(String),
    #[error("a deployment for `{0}` is already running")]
    AlreadyRunning(String),
}

impl DeployRejection {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Unauthorized { .. } => "You are not authorised to deploy",
            Self::Parse(_) => "Could not parse environment name",
            Self::UnknownEnvironment(_) => "Environment not found",
            Self::AlreadyRunning(_) => "Deployment already for environment",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::commands::CommandParseError;
    use crate::errors::DeployRejection;

    #[test]
    fn every_rejection_has_a_fixed_user_message() {
        let cases = [
            (
                DeployRejection::Unauthorized { user_id: "U9".to_owned() },
                "You are not authorised to deploy",
            ),
            (
                DeployRejection::from(CommandParseError::EnvironmentName),
                "Could not parse environment name",
            ),
            (DeployRejection::UnknownEnvironment("qa".to_owned()), "Environment not found"),
            (
                DeployRejection::AlreadyRunning("prod".to_owned()),
                "Deployment already for environment",
            ),
        ];

        for (rejection, expected) in cases {
            assert_eq!(rejection.user_message(), expected);
        }
    }

    #[test]
    fn user_message_does_not_leak_internal_detail() {
        let rejection = DeployRejection::UnknownEnvironment("secret-env".to_owned());
        assert!(rejection.to_string().contains("secret-env"));
        assert!(!rejection.user_message().contains("secret-env"));
    }
}
