use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::blocks::{Block, MessageTemplate};
use crate::events::ThreadTarget;

pub const SLACK_API_BASE_URL: &str = "https://slack.com/api";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("slack web api request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("slack web api `{method}` returned `{error}`")]
    Api { method: &'static str, error: String },
    #[error("slack web api `{method}` response is missing `{field}`")]
    MissingField { method: &'static str, field: &'static str },
}

/// Posts replies into the thread an inbound message came from.
///
/// Implementations are shared by the dispatch loop and every running job, so
/// they must tolerate concurrent calls.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn post(&self, target: &ThreadTarget, message: &MessageTemplate)
        -> Result<(), NotifyError>;
}

/// Minimal Slack Web API client. Cloning shares the connection pool.
#[derive(Clone)]
pub struct SlackWebClient {
    http: reqwest::Client,
    base_url: String,
    bot_token: SecretString,
    app_token: SecretString,
}

impl std::fmt::Debug for SlackWebClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlackWebClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

impl SlackWebClient {
    pub fn new(bot_token: SecretString, app_token: SecretString) -> Result<Self, NotifyError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { http, base_url: SLACK_API_BASE_URL.to_owned(), bot_token, app_token })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Asks Slack for a fresh Socket Mode WebSocket URL (`apps.connections.open`).
    pub async fn open_socket_url(&self) -> Result<String, NotifyError> {
        const METHOD: &str = "apps.connections.open";

        let response: ApiResponse = self
            .http
            .post(format!("{}/{METHOD}", self.base_url))
            .bearer_auth(self.app_token.expose_secret()) // ubs:ignore
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let response = response.into_result(METHOD)?;
        response.url.ok_or(NotifyError::MissingField { method: METHOD, field: "url" })
    }
}

#[async_trait]
impl Notifier for SlackWebClient {
    async fn post(
        &self,
        target: &ThreadTarget,
        message: &MessageTemplate,
    ) -> Result<(), NotifyError> {
        const METHOD: &str = "chat.postMessage";

        let response: ApiResponse = self
            .http
            .post(format!("{}/{METHOD}", self.base_url))
            .bearer_auth(self.bot_token.expose_secret()) // ubs:ignore
            .json(&PostMessageRequest::new(target, message))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        response.into_result(METHOD)?;
        debug!(
            event_name = "egress.slack.message_posted",
            channel_id = %target.channel_id,
            thread_ts = %target.thread_ts,
            text = %message.fallback_text,
            "posted slack message"
        );
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct PostMessageRequest<'a> {
    channel: &'a str,
    thread_ts: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "no_blocks")]
    blocks: &'a [Block],
}

impl<'a> PostMessageRequest<'a> {
    fn new(target: &'a ThreadTarget, message: &'a MessageTemplate) -> Self {
        Self {
            channel: &target.channel_id,
            thread_ts: &target.thread_ts,
            text: &message.fallback_text,
            blocks: &message.blocks,
        }
    }
}

fn no_blocks(blocks: &&[Block]) -> bool {
    blocks.is_empty()
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

impl ApiResponse {
    fn into_result(self, method: &'static str) -> Result<Self, NotifyError> {
        if self.ok {
            return Ok(self);
        }
        Err(NotifyError::Api {
            method,
            error: self.error.clone().unwrap_or_else(|| "unknown_error".to_owned()),
        })
    }
}
