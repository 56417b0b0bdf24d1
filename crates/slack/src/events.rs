use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SlackEnvelope {
    pub envelope_id: String,
    pub event: SlackEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SlackEvent {
    AppMention(AppMentionEvent),
    Unsupported { event_type: String },
}

impl SlackEvent {
    pub fn event_type(&self) -> SlackEventType {
        match self {
            Self::AppMention(_) => SlackEventType::AppMention,
            Self::Unsupported { .. } => SlackEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SlackEventType {
    AppMention,
    Unsupported,
}

/// `{type: "app_mention", text, user, channel, ts}` from the Events API.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppMentionEvent {
    pub channel_id: String,
    pub user_id: String,
    pub text: String,
    pub ts: String,
}

/// Where replies for an inbound message go: the thread rooted at its `ts`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThreadTarget {
    pub channel_id: String,
    pub thread_ts: String,
}

impl AppMentionEvent {
    pub fn reply_target(&self) -> ThreadTarget {
        ThreadTarget { channel_id: self.channel_id.clone(), thread_ts: self.ts.clone() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

/// Wire shape of the `event` object inside an `events_api` payload.
#[derive(Debug, Default, Deserialize)]
pub struct InboundEvent {
    #[serde(rename = "type", default)]
    pub event_type: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub channel: String,
    #[serde(default)]
    pub ts: String,
}

impl From<InboundEvent> for SlackEvent {
    fn from(event: InboundEvent) -> Self {
        match event.event_type.as_str() {
            "app_mention" => Self::AppMention(AppMentionEvent {
                channel_id: event.channel,
                user_id: event.user,
                text: event.text,
                ts: event.ts,
            }),
            _ => Self::Unsupported { event_type: event.event_type },
        }
    }
}
