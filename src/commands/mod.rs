//! Command implementations
//!
//! Every diagnostic runs the same way: resolve credentials, take the session
//! lock, authenticate, run the command body against the authenticated
//! client, then release the connection no matter how the body ended.

pub mod chat_info;
pub mod check_session;
pub mod generate_session;
pub mod get_messages;
pub mod probe;
pub mod test_retrieval;

use std::io::{self, Write};
use std::panic::{resume_unwind, AssertUnwindSafe};

use futures::FutureExt;
use tracing::{info, warn};

use crate::auth::{Authenticator, ChallengeResponder, ScriptedResponder, TerminalResponder};
use crate::chat::resolve_entity;
use crate::client::{ChatClient, ConversationKind, ConversationRef, SessionToken, TimeoutClient};
use crate::config::Config;
use crate::credentials::{ask_line, CredentialResolver, Credentials};
use crate::error::Result;
use crate::messages::{fetch_dialogs, fetch_messages};
use crate::report::{Outcome, OutputFormat, Report, TargetOutcome};
use crate::session::SessionLock;
use crate::telegram::GrammersClient;

/// Messages sampled per conversation by the health checks.
pub const SAMPLE_LIMIT: usize = 5;

/// Dialogs scanned when checking whether the account follows a conversation.
pub const SUBSCRIPTION_SCAN: usize = 500;

/// A diagnostic to run once authenticated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    GenerateSession,
    CheckSession,
    GetMessages {
        target: String,
        limit: usize,
        min_id: i32,
    },
    TestRetrieval {
        dialogs: usize,
        sample: usize,
    },
    ChatInfo {
        target: String,
    },
    Probe {
        targets: Vec<String>,
        limit: usize,
        min_id: i32,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Command::GenerateSession => "generate-session",
            Command::CheckSession => "check-session",
            Command::GetMessages { .. } => "get-messages",
            Command::TestRetrieval { .. } => "test-retrieval",
            Command::ChatInfo { .. } => "chat-info",
            Command::Probe { .. } => "probe",
        }
    }
}

/// Settings shared by every subcommand.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub config: Config,
    pub format: OutputFormat,
    /// Allow terminal prompts for credentials and login challenges.
    pub interactive: bool,
}

/// Run `command` against the live service and print the report to stdout.
pub async fn run(command: Command, options: &RunOptions) -> Result<Report> {
    let config = &options.config;
    let _lock = SessionLock::acquire(&config.lock_file)?;

    let mut credentials = CredentialResolver::standard(
        &config.secrets_file,
        config.telegram.clone(),
        options.interactive,
    )
    .resolve()?;

    if command == Command::GenerateSession && !credentials.session.is_empty() {
        info!("Ignoring the saved session, generating a new one");
        credentials.session = SessionToken::empty();
    }
    if options.interactive {
        ensure_phone(&mut credentials)?;
    }

    let client = TimeoutClient::new(
        GrammersClient::new(&config.session_file),
        config.limits.request_timeout,
    );
    let mut auth = Authenticator::new(client, config.limits).with_login(options.interactive);
    let report = if options.interactive {
        run_with(&mut auth, &credentials, &mut TerminalResponder::stdin(), &command, config).await?
    } else {
        run_with(&mut auth, &credentials, &mut ScriptedResponder::new(), &command, config).await?
    };

    let mut stdout = io::stdout().lock();
    report.write_to(options.format, &mut stdout)?;
    stdout.flush()?;
    Ok(report)
}

/// A fresh login needs a phone number; ask for it when nothing supplied one.
fn ensure_phone(credentials: &mut Credentials) -> Result<()> {
    if !credentials.session.is_empty() || credentials.phone.is_some() {
        return Ok(());
    }
    let mut input = io::stdin().lock();
    let mut output = io::stderr();
    credentials.phone = ask_line(
        &mut input,
        &mut output,
        "Enter your phone number (e.g., +1234567890): ",
    )?
    .filter(|phone| !phone.is_empty());
    Ok(())
}

/// Authenticate, run `command`, and always stop the authenticator.
///
/// A panic inside the run still disconnects before it is re-raised.
pub async fn run_with<C, R>(
    auth: &mut Authenticator<C>,
    credentials: &Credentials,
    responder: &mut R,
    command: &Command,
    config: &Config,
) -> Result<Report>
where
    C: ChatClient,
    R: ChallengeResponder + ?Sized,
{
    let outcome = AssertUnwindSafe(async {
        auth.authenticate(credentials, responder).await?;
        execute(auth, command, config).await
    })
    .catch_unwind()
    .await;

    auth.stop().await;

    match outcome {
        Ok(result) => result,
        Err(panic) => resume_unwind(panic),
    }
}

async fn execute<C: ChatClient>(
    auth: &mut Authenticator<C>,
    command: &Command,
    config: &Config,
) -> Result<Report> {
    let identity = auth.identity().cloned();
    let session = auth.session().cloned();
    let client = auth.client()?;
    info!("Running {}", command.name());

    let mut report = match command {
        Command::GenerateSession => generate_session::run(session.as_ref())?,
        Command::CheckSession => check_session::run(client, config.default_dialog_limit).await?,
        Command::GetMessages {
            target,
            limit,
            min_id,
        } => get_messages::run(client, target, *limit, *min_id).await?,
        Command::TestRetrieval { dialogs, sample } => {
            test_retrieval::run(client, *dialogs, *sample).await?
        }
        Command::ChatInfo { target } => chat_info::run(client, target).await?,
        Command::Probe {
            targets,
            limit,
            min_id,
        } => probe::run(client, targets, *limit, *min_id).await?,
    };

    report.identity = identity;
    Ok(report)
}

/// Locate `identifier` and fetch from it.
///
/// Lookup and fetch failures are recorded in the outcome; only fatal errors
/// come back as `Err`.
pub async fn probe_target<C: ChatClient + ?Sized>(
    client: &mut C,
    identifier: &str,
    label: &str,
    limit: usize,
    min_id: i32,
) -> Result<TargetOutcome> {
    match resolve_entity(client, identifier).await {
        Ok(conversation) => {
            probe_conversation(client, identifier, label, &conversation, limit, min_id).await
        }
        Err(err) if !err.is_fatal() => {
            warn!("Skipping {}: {}", identifier, err);
            Ok(TargetOutcome {
                identifier: identifier.to_string(),
                label: label.to_string(),
                conversation: None,
                marked_id: None,
                subscribed: None,
                limit,
                min_id,
                outcome: Outcome::from_error(&err),
            })
        }
        Err(err) => Err(err),
    }
}

/// Fetch from an already located conversation.
pub async fn probe_conversation<C: ChatClient + ?Sized>(
    client: &mut C,
    identifier: &str,
    label: &str,
    conversation: &ConversationRef,
    limit: usize,
    min_id: i32,
) -> Result<TargetOutcome> {
    let outcome = match fetch_messages(client, conversation, limit, min_id).await {
        Ok(messages) => Outcome::Ok { messages },
        Err(err) if !err.is_fatal() => Outcome::from_error(&err),
        Err(err) => return Err(err),
    };

    Ok(TargetOutcome {
        identifier: identifier.to_string(),
        label: label.to_string(),
        conversation: Some(conversation.clone()),
        marked_id: None,
        subscribed: None,
        limit,
        min_id,
        outcome,
    })
}

/// Whether `conversation` is among the account's dialogs.
///
/// `None` when the dialog list could not be loaded.
pub async fn check_subscription<C: ChatClient + ?Sized>(
    client: &mut C,
    conversation: &ConversationRef,
) -> Option<bool> {
    if conversation.kind == ConversationKind::SavedMessages {
        return Some(true);
    }
    match fetch_dialogs(client, SUBSCRIPTION_SCAN).await {
        Ok(dialogs) => Some(
            dialogs
                .iter()
                .any(|dialog| dialog.conversation.id == conversation.id),
        ),
        Err(err) => {
            warn!("Subscription check for {} skipped: {}", conversation, err);
            None
        }
    }
}

/// Fill in `subscribed` for a located target and explain what it means.
pub async fn annotate_subscription<C: ChatClient + ?Sized>(
    client: &mut C,
    report: &mut Report,
    target: &mut TargetOutcome,
) {
    let Some(conversation) = target.conversation.as_ref() else {
        return;
    };
    target.subscribed = check_subscription(client, conversation).await;
    if target.subscribed == Some(false) {
        report.note(format!(
            "{} is not among your dialogs; join it if its fetches come back empty.",
            conversation
        ));
    }
}
