//! Live Socket Mode transport: `apps.connections.open` plus a WebSocket.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info};

use crate::events::{InboundEvent, SlackEnvelope, SlackEvent};
use crate::socket::{SocketTransport, TransportError};
use crate::web::SlackWebClient;

type SlackStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One decoded text frame from the Socket Mode connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SocketFrame {
    Hello,
    Disconnect { reason: String },
    Envelope(SlackEnvelope),
    Other,
}

#[derive(Debug, Deserialize)]
struct RawFrame {
    #[serde(rename = "type", default)]
    frame_type: String,
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    reason: Option<String>,
    #[serde(default)]
    payload: Option<RawPayload>,
}

#[derive(Debug, Default, Deserialize)]
struct RawPayload {
    #[serde(default)]
    event: Option<InboundEvent>,
}

/// Decodes a text frame.
///
/// Every frame that carries an `envelope_id` becomes an envelope so it gets
/// acknowledged, even when its payload is not an Events API event.
pub fn decode_frame(text: &str) -> Result<SocketFrame, serde_json::Error> {
    let RawFrame { frame_type, envelope_id, reason, payload } = serde_json::from_str(text)?;

    match frame_type.as_str() {
        "hello" => return Ok(SocketFrame::Hello),
        "disconnect" => {
            let reason = reason.unwrap_or_else(|| "unspecified".to_owned());
            return Ok(SocketFrame::Disconnect { reason });
        }
        _ => {}
    }

    let Some(envelope_id) = envelope_id else {
        return Ok(SocketFrame::Other);
    };
    let event: SlackEvent = if frame_type == "events_api" {
        payload.and_then(|payload| payload.event).unwrap_or_default().into()
    } else {
        SlackEvent::Unsupported { event_type: frame_type }
    };
    Ok(SocketFrame::Envelope(SlackEnvelope { envelope_id, event }))
}

pub struct SlackSocketTransport {
    web: SlackWebClient,
    stream: Mutex<Option<SlackStream>>,
}

impl SlackSocketTransport {
    pub fn new(web: SlackWebClient) -> Self {
        Self { web, stream: Mutex::new(None) }
    }
}

#[async_trait]
impl SocketTransport for SlackSocketTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        let url = self
            .web
            .open_socket_url()
            .await
            .map_err(|error| TransportError::Connect(error.to_string()))?;
        let (stream, _response) =
            connect_async(url).await.map_err(|error| TransportError::Connect(error.to_string()))?;

        *self.stream.lock().await = Some(stream);
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<SlackEnvelope>, TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| TransportError::Receive("socket is not connected".to_owned()))?;

        loop {
            let message = match stream.next().await {
                Some(Ok(message)) => message,
                Some(Err(error)) => return Err(TransportError::Receive(error.to_string())),
                None => return Err(TransportError::Receive("socket stream ended".to_owned())),
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(frame) => {
                    let reason =
                        frame.map(|frame| frame.reason.as_str().to_owned()).unwrap_or_default();
                    return Err(TransportError::Receive(format!("socket closed: {reason}")));
                }
                _ => continue,
            };

            match decode_frame(text.as_str()) {
                Ok(SocketFrame::Envelope(envelope)) => return Ok(Some(envelope)),
                Ok(SocketFrame::Hello) => info!("socket mode session ready"),
                Ok(SocketFrame::Disconnect { reason }) => {
                    return Err(TransportError::Receive(format!("disconnect requested: {reason}")));
                }
                Ok(SocketFrame::Other) => debug!(frame = text.as_str(), "ignoring socket frame"),
                Err(error) => debug!(error = %error, "undecodable socket frame"),
            }
        }
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        let mut guard = self.stream.lock().await;
        let stream = guard
            .as_mut()
            .ok_or_else(|| TransportError::Acknowledge("socket is not connected".to_owned()))?;

        let ack = json!({ "envelope_id": envelope_id }).to_string();
        stream
            .send(Message::Text(ack.into()))
            .await
            .map_err(|error| TransportError::Acknowledge(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        let Some(mut stream) = self.stream.lock().await.take() else {
            return Ok(());
        };
        stream.close(None).await.map_err(|error| TransportError::Disconnect(error.to_string()))
    }
}
