use std::process::ExitCode;

fn main() -> ExitCode {
    deploybot_cli::run()
}
