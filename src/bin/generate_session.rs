//! Session generation binary.
//!
//! Same as `tg_diag generate-session` with the default config.

use std::process::ExitCode;

use tg_diag::commands::{self, Command, RunOptions};
use tg_diag::{Config, OutputFormat};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    let options = RunOptions {
        config: Config::new(),
        format: OutputFormat::Table,
        interactive: true,
    };

    match commands::run(Command::GenerateSession, &options).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("✗ {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}
