pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use deploybot_core::LoadOptions;

#[derive(Debug, Parser)]
#[command(
    name = "deploybot",
    about = "Deploybot operator CLI",
    long_about = "Inspect deploybot configuration and check readiness before starting the server.",
    after_help = "Examples:\n  deploybot doctor --json\n  deploybot --config ./deploybot.toml config"
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        help = "Config file path (defaults to DEPLOYBOT_CONFIG or ./deploybot.toml)"
    )]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Print effective settings and environments with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, Slack tokens, playbook executable and working directories")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    let options = LoadOptions { config_path: cli.config };

    let result = match cli.command {
        Command::Config => commands::config::run(options),
        Command::Doctor { json } => commands::doctor::run(options, json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
