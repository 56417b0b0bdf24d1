use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchOutcome, EventHandler};
use crate::events::{EventContext, SlackEnvelope, SlackEvent};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

/// A session that ended with an error. `established` tells whether the
/// connection came up before failing, which resets the retry budget.
#[derive(Debug, Error)]
#[error("{source}")]
struct SessionError {
    established: bool,
    source: TransportError,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Source of inbound envelopes.
///
/// `next_envelope` returning `Ok(None)` means the stream ended cleanly; a
/// server-requested disconnect is an `Err` so the runner reconnects.
#[async_trait]
pub trait SocketTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

pub struct SocketModeRunner {
    transport: Arc<dyn SocketTransport>,
    handler: Arc<dyn EventHandler>,
    reconnect_policy: ReconnectPolicy,
}

impl SocketModeRunner {
    pub fn new(
        transport: Arc<dyn SocketTransport>,
        handler: Arc<dyn EventHandler>,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, handler, reconnect_policy }
    }

    /// Pumps envelopes until the stream ends or consecutive failures exhaust
    /// the retry budget. Never returns an error for transport trouble.
    pub async fn start(&self) -> Result<()> {
        let mut attempt = 0;
        loop {
            let error = match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(error) => error,
            };
            if error.established {
                attempt = 0;
            }

            warn!(
                attempt,
                max_retries = self.reconnect_policy.max_retries,
                error = %error,
                "socket mode transport failed"
            );

            if attempt >= self.reconnect_policy.max_retries {
                warn!(
                    max_retries = self.reconnect_policy.max_retries,
                    "socket mode retries exhausted; continuing process without crash"
                );
                return Ok(());
            }

            let delay = self.reconnect_policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), SessionError> {
        info!(attempt, "opening socket mode transport connection");
        self.transport
            .connect()
            .await
            .map_err(|source| SessionError { established: false, source })?;
        info!(attempt, "socket mode transport connected");

        loop {
            let next = self
                .transport
                .next_envelope()
                .await
                .map_err(|source| SessionError { established: true, source })?;
            let Some(envelope) = next else {
                info!(attempt, "socket mode transport stream closed");
                return self
                    .transport
                    .disconnect()
                    .await
                    .map_err(|source| SessionError { established: true, source });
            };
            self.process(&envelope).await;
        }
    }

    /// Acknowledges first, then hands the envelope to the handler. Failures of
    /// either are logged and never end the session.
    async fn process(&self, envelope: &SlackEnvelope) {
        let (channel_id, thread_ts) = correlation_fields(envelope);

        info!(
            event_name = "ingress.slack.envelope_received",
            envelope_id = %envelope.envelope_id,
            event_type = ?envelope.event.event_type(),
            correlation_id = %envelope.envelope_id,
            channel_id = channel_id.unwrap_or("unknown"),
            thread_ts = thread_ts.unwrap_or("unknown"),
            "received slack envelope"
        );

        if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
            warn!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                error = %error,
                "failed to acknowledge slack envelope"
            );
        } else {
            debug!(
                event_name = "ingress.slack.ack_sent",
                envelope_id = %envelope.envelope_id,
                correlation_id = %envelope.envelope_id,
                "acknowledged slack envelope"
            );
        }

        let context = EventContext { correlation_id: envelope.envelope_id.clone() };
        match self.handler.handle(envelope, &context).await {
            Ok(outcomes) => {
                let handled = outcomes
                    .iter()
                    .filter(|outcome| !matches!(outcome, DispatchOutcome::Ignored))
                    .count();
                debug!(
                    event_name = "ingress.slack.envelope_handled",
                    correlation_id = %envelope.envelope_id,
                    handled,
                    "envelope handled"
                );
            }
            Err(error) => {
                warn!(
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    channel_id = channel_id.unwrap_or("unknown"),
                    thread_ts = thread_ts.unwrap_or("unknown"),
                    error = %error,
                    "event dispatch failed; continuing socket loop"
                );
            }
        }
    }
}

fn correlation_fields(envelope: &SlackEnvelope) -> (Option<&str>, Option<&str>) {
    match &envelope.event {
        SlackEvent::AppMention(event) => (Some(&event.channel_id), Some(&event.ts)),
        SlackEvent::Unsupported { .. } => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::{ReconnectPolicy, SocketModeRunner, SocketTransport, TransportError};
    use crate::dispatcher::{DispatchError, DispatchOutcome, EventHandler};
    use crate::events::{AppMentionEvent, EventContext, SlackEnvelope, SlackEvent};

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<SlackEnvelope>, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<SlackEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }
    }

    #[async_trait]
    impl SocketTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            Ok(())
        }
    }

    /// Records the envelope ids it saw, optionally failing every call.
    #[derive(Default)]
    struct CountingHandler {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl EventHandler for CountingHandler {
        async fn handle(
            &self,
            envelope: &SlackEnvelope,
            ctx: &EventContext,
        ) -> Result<Vec<DispatchOutcome>, DispatchError> {
            assert_eq!(ctx.correlation_id, envelope.envelope_id);
            self.seen.lock().await.push(envelope.envelope_id.clone());
            if self.fail {
                return Err(DispatchError::Config(deploybot_core::ConfigError::Validation(
                    "broken".to_owned(),
                )));
            }
            Ok(vec![DispatchOutcome::Ignored])
        }
    }

    fn unsupported(envelope_id: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: envelope_id.to_owned(),
            event: SlackEvent::Unsupported { event_type: "test".to_owned() },
        }
    }

    fn mention(envelope_id: &str) -> SlackEnvelope {
        SlackEnvelope {
            envelope_id: envelope_id.to_owned(),
            event: SlackEvent::AppMention(AppMentionEvent {
                channel_id: "C1".to_owned(),
                user_id: "U1".to_owned(),
                text: "<@UBOT> list".to_owned(),
                ts: "1730000000.1000".to_owned(),
            }),
        }
    }

    fn no_delay(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![Ok(Some(unsupported("env-1"))), Ok(None)],
        ));
        let handler = Arc::new(CountingHandler::default());

        let runner = SocketModeRunner::new(transport.clone(), handler.clone(), no_delay(2));
        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
        assert_eq!(*handler.seen.lock().await, vec!["env-1"]);
        assert_eq!(transport.state.lock().await.disconnect_calls, 1);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));

        let runner = SocketModeRunner::new(
            transport.clone(),
            Arc::new(CountingHandler::default()),
            no_delay(2),
        );

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn server_disconnects_reconnect_without_spending_the_retry_budget() {
        let refresh = || Err(TransportError::Receive("disconnect: refresh_requested".to_owned()));
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![],
            vec![
                Ok(Some(mention("env-1"))),
                refresh(),
                Ok(Some(mention("env-2"))),
                refresh(),
                refresh(),
                refresh(),
                Ok(Some(mention("env-3"))),
                Ok(None),
            ],
        ));
        let handler = Arc::new(CountingHandler::default());

        let runner = SocketModeRunner::new(transport.clone(), handler.clone(), no_delay(1));
        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 5);
        assert_eq!(*handler.seen.lock().await, vec!["env-1", "env-2", "env-3"]);
    }

    #[tokio::test]
    async fn every_envelope_is_acknowledged_once_even_when_handling_fails() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![],
            vec![
                Ok(Some(mention("env-1"))),
                Ok(Some(unsupported("env-2"))),
                Ok(Some(mention("env-3"))),
                Ok(None),
            ],
        ));
        let handler = Arc::new(CountingHandler { fail: true, ..CountingHandler::default() });

        let runner = SocketModeRunner::new(transport.clone(), handler.clone(), no_delay(0));
        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.acknowledgements().await, vec!["env-1", "env-2", "env-3"]);
        assert_eq!(handler.seen.lock().await.len(), 3);
        assert_eq!(transport.connect_attempts().await, 1);
    }

    #[test]
    fn extracts_channel_and_thread_correlation_fields() {
        let envelope = mention("env-2");
        let (channel_id, thread_ts) = super::correlation_fields(&envelope);
        assert_eq!(channel_id, Some("C1"));
        assert_eq!(thread_ts, Some("1730000000.1000"));

        assert_eq!(super::correlation_fields(&unsupported("env-3")), (None, None));
    }

    #[test]
    fn backoff_is_capped() {
        let policy = ReconnectPolicy { max_retries: 10, base_delay_ms: 250, max_delay_ms: 5_000 };
        assert_eq!(policy.backoff(0).as_millis(), 250);
        assert_eq!(policy.backoff(2).as_millis(), 1_000);
        assert_eq!(policy.backoff(9).as_millis(), 5_000);
    }
}
