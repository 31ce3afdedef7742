//! tg_diag CLI - main entry point
//!
//! Session bootstrap and read-only diagnostics for a Telegram user account.
//! Reports go to stdout, logs to stderr.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use tg_diag::commands::{self, Command, RunOptions};
use tg_diag::config::parse_timeout_secs;
use tg_diag::{Config, Error, OutputFormat};

/// Exit code after Ctrl-C (128 + SIGINT).
const INTERRUPTED: u8 = 130;

#[derive(Parser)]
#[command(name = "tg_diag")]
#[command(about = "Telegram session bootstrap & diagnostics", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format: table | json | yaml
    #[arg(long, global = true, default_value = "table", env = "TG_DIAG_FORMAT")]
    format: String,

    /// Secrets file with TELEGRAM_* keys (default: .env)
    #[arg(long, global = true, env = "TG_DIAG_SECRETS_FILE")]
    secrets_file: Option<PathBuf>,

    /// Path to config.yml (default: ./config.yml, then ../config.yml)
    #[arg(long, global = true, env = "TG_DIAG_CONFIG")]
    config: Option<PathBuf>,

    /// Per-request timeout in seconds (default: limits.request_timeout_secs)
    #[arg(long, global = true, env = "TG_DIAG_TIMEOUT")]
    timeout: Option<String>,

    /// Never prompt or request a login code; fail without a usable saved session
    #[arg(long, global = true, default_value_t = false)]
    no_prompt: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in from scratch and print a reusable session string
    GenerateSession,

    /// Verify the saved session: identity, saved messages, dialogs, @telegram
    CheckSession,

    /// Fetch messages from one conversation, then repeat with a min-id filter
    GetMessages {
        /// @handle, handle, t.me link, numeric id or "me"
        target: String,

        /// Maximum number of messages to fetch
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only keep messages with an id greater than this
        #[arg(long, default_value_t = 0)]
        min_id: i32,
    },

    /// List dialogs and sample messages from the first few
    TestRetrieval {
        /// Number of dialogs to list
        #[arg(short, long)]
        dialogs: Option<usize>,

        /// Number of dialogs to sample messages from
        #[arg(short, long, default_value_t = 3)]
        sample: usize,
    },

    /// Show entity details (including the marked id) and its latest messages
    ChatInfo {
        /// @handle, handle, t.me link, numeric id or "me"
        target: String,
    },

    /// Locate and fetch from several identifiers; failures are isolated
    Probe {
        /// Identifiers to probe, in order
        #[arg(required = true, num_args = 1..)]
        targets: Vec<String>,

        /// Maximum number of messages per target
        #[arg(short, long, default_value_t = 5)]
        limit: usize,

        /// Only keep messages with an id greater than this
        #[arg(long, default_value_t = 0)]
        min_id: i32,
    },
}

impl Commands {
    fn into_command(self, config: &Config) -> Command {
        match self {
            Commands::GenerateSession => Command::GenerateSession,
            Commands::CheckSession => Command::CheckSession,
            Commands::GetMessages {
                target,
                limit,
                min_id,
            } => Command::GetMessages {
                target,
                limit: limit.unwrap_or(config.default_message_limit),
                min_id,
            },
            Commands::TestRetrieval { dialogs, sample } => Command::TestRetrieval {
                dialogs: dialogs.unwrap_or(config.default_dialog_limit),
                sample,
            },
            Commands::ChatInfo { target } => Command::ChatInfo { target },
            Commands::Probe {
                targets,
                limit,
                min_id,
            } => Command::Probe {
                targets,
                limit,
                min_id,
            },
        }
    }
}

fn init_logging() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tg_diag=info".parse()?))
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(secrets_file) = cli.secrets_file {
        config.secrets_file = secrets_file;
    }
    if let Some(raw) = cli.timeout.as_deref() {
        config.limits.request_timeout = parse_timeout_secs(raw)?;
    }

    let options = RunOptions {
        format: OutputFormat::parse(&cli.format)?,
        interactive: !cli.no_prompt,
        config,
    };
    let command = cli.command.into_command(&options.config);

    let report = commands::run(command, &options).await?;
    if report.failures() > 0 {
        warn!("{} target(s) failed, see the report", report.failures());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = init_logging() {
        eprintln!("Failed to initialize logging: {err}");
    }

    let cli = Cli::parse();

    let result = tokio::select! {
        result = run(cli) => result,
        _ = tokio::signal::ctrl_c() => {
            // Dropping the run closes the connection.
            warn!("Interrupted, connection closed");
            return ExitCode::from(INTERRUPTED);
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("✗ {:#}", err);
            let code = err.downcast_ref::<Error>().map_or(1, Error::exit_code);
            ExitCode::from(code)
        }
    }
}
