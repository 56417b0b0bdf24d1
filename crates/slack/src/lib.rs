//! Slack integration - Socket Mode deploy bot
//!
//! This crate connects the core deploy rules to Slack:
//! - **Socket Mode** (`socket`, `socket_mode`) - WebSocket event loop with reconnection and acks
//! - **Events** (`events`) - inbound envelopes and `app_mention` events
//! - **Dispatcher** (`dispatcher`) - parse, authorize, single-flight check, launch
//! - **Jobs** (`jobs`) - background playbook runs that report back to the thread
//! - **Web API** (`web`) - `chat.postMessage` notifier and socket URL negotiation
//! - **Block Kit** (`blocks`) - message templates
//!
//! # Architecture
//!
//! ```text
//! Slack ─▶ SocketModeRunner ─ack─▶ Slack
//!                │
//!                ▼
//!         DeployDispatcher ─▶ ConfigSource (fresh read)
//!                │        └─▶ JobRegistry (try_claim)
//!                ▼
//!         JobRunner (tokio::spawn) ─▶ playbook ─▶ Notifier ─▶ thread replies
//! ```

pub mod blocks;
pub mod dispatcher;
pub mod events;
pub mod jobs;
pub mod socket;
pub mod socket_mode;
pub mod web;
