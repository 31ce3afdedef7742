//! Session check binary.

use std::process::ExitCode;

use tg_diag::commands::{self, Command, RunOptions};
use tg_diag::{Config, OutputFormat};

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .init();

    // A saved session must not fall back to an interactive login here.
    let options = RunOptions {
        config: Config::new(),
        format: OutputFormat::Table,
        interactive: false,
    };

    match commands::run(Command::CheckSession, &options).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("✗ {}", err);
            ExitCode::from(err.exit_code())
        }
    }
}
