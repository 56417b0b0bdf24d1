//! Deploybot core - configuration, command grammar and job bookkeeping
//!
//! Everything here is transport-agnostic:
//! - **Config Store** (`config`) - fresh TOML read of environments and global settings
//! - **Job Registry** (`registry`) - single-flight guard per environment name
//! - **Command Parser** (`commands`) - `list` / `deploy <env>` extraction from mention text
//! - **Authorizer** (`auth`) - allow-list membership
//! - **Runner** (`runner`) - external playbook execution with combined output capture
//!
//! The Slack crate wires these into the dispatcher and the background job runner.

pub mod auth;
pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod registry;
pub mod runner;

pub use commands::{parse_command, CommandParseError, Intent};
pub use config::{ConfigError, ConfigSource, DeploySnapshot, FileConfigStore, LoadOptions};
pub use domain::environment::{Environment, Environments};
pub use domain::settings::GlobalSettings;
pub use errors::DeployRejection;
pub use registry::{JobGuard, JobRegistry};
pub use runner::{DeployOutcome, ExecutionError};
