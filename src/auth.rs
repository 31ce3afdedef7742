//! Session authentication state machine
//!
//! ```text
//! Idle → Connecting → {AwaitingPhoneCode, AwaitingPassword}* → Authenticated → Closed
//!                      (any non-terminal state) → Failed
//! ```
//!
//! Each challenge state takes exactly one answer per call
//! ([`Authenticator::submit_code`], [`Authenticator::submit_password`]).
//! [`Authenticator::authenticate`] drives the whole flow from a
//! [`ChallengeResponder`].

use std::borrow::Cow;
use std::collections::VecDeque;
use std::fmt;
use std::io::{BufRead, Write};

use tracing::{error, info, warn};

use crate::client::{ChatClient, SelfIdentity, SessionToken, SignInOutcome};
use crate::config::AuthLimits;
use crate::credentials::{ask_line, Credentials};
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Idle,
    Connecting,
    AwaitingPhoneCode,
    AwaitingPassword,
    Authenticated,
    Closed,
    Failed,
}

impl AuthState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, AuthState::Closed | AuthState::Failed)
    }
}

impl fmt::Display for AuthState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthChallenge {
    PhoneCode,
    TwoFactorPassword,
}

impl AuthChallenge {
    pub fn label(&self) -> &'static str {
        match self {
            AuthChallenge::PhoneCode => "phone code",
            AuthChallenge::TwoFactorPassword => "2FA password",
        }
    }
}

/// Supplies one answer per challenge, synchronously.
pub trait ChallengeResponder {
    fn answer(&mut self, challenge: AuthChallenge) -> Result<String>;
}

/// Prompts on a terminal.
pub struct TerminalResponder<R, W> {
    input: R,
    output: W,
}

impl TerminalResponder<std::io::StdinLock<'static>, std::io::Stderr> {
    pub fn stdin() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stderr())
    }
}

impl<R: BufRead, W: Write> TerminalResponder<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }
}

impl<R: BufRead, W: Write> ChallengeResponder for TerminalResponder<R, W> {
    fn answer(&mut self, challenge: AuthChallenge) -> Result<String> {
        let prompt = match challenge {
            AuthChallenge::PhoneCode => "Enter the code you received on Telegram: ",
            AuthChallenge::TwoFactorPassword => "Enter your 2FA password (if any): ",
        };
        ask_line(&mut self.input, &mut self.output, prompt)?.ok_or_else(|| {
            Error::AuthChallengeRejected {
                challenge: challenge.label().to_string(),
                reason: "input closed".to_string(),
            }
        })
    }
}

/// Pre-recorded answers, consumed in order.
#[derive(Debug, Default)]
pub struct ScriptedResponder {
    answers: VecDeque<(AuthChallenge, String)>,
}

impl ScriptedResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn code(mut self, code: &str) -> Self {
        self.answers
            .push_back((AuthChallenge::PhoneCode, code.to_string()));
        self
    }

    pub fn password(mut self, password: &str) -> Self {
        self.answers
            .push_back((AuthChallenge::TwoFactorPassword, password.to_string()));
        self
    }

    pub fn remaining(&self) -> usize {
        self.answers.len()
    }
}

impl ChallengeResponder for ScriptedResponder {
    fn answer(&mut self, challenge: AuthChallenge) -> Result<String> {
        match self.answers.pop_front() {
            Some((expected, answer)) if expected == challenge => Ok(answer),
            Some((expected, _)) => Err(Error::InvalidArgument(format!(
                "scripted answer is for {}, asked for {}",
                expected.label(),
                challenge.label()
            ))),
            None => Err(Error::AuthChallengeRejected {
                challenge: challenge.label().to_string(),
                reason: "no scripted answer left".to_string(),
            }),
        }
    }
}

/// Drives one client through authentication and owns it for the run.
pub struct Authenticator<C> {
    client: C,
    limits: AuthLimits,
    state: AuthState,
    history: Vec<AuthState>,
    connected: bool,
    login_allowed: bool,
    code_attempts: u32,
    password_attempts: u32,
    session: Option<SessionToken>,
    identity: Option<SelfIdentity>,
}

impl<C: ChatClient> Authenticator<C> {
    pub fn new(client: C, limits: AuthLimits) -> Self {
        Self {
            client,
            limits,
            state: AuthState::Idle,
            history: vec![AuthState::Idle],
            connected: false,
            login_allowed: true,
            code_attempts: 0,
            password_attempts: 0,
            session: None,
            identity: None,
        }
    }

    /// With `false`, a run without a usable saved session fails before a
    /// login code is requested.
    pub fn with_login(mut self, allowed: bool) -> Self {
        self.login_allowed = allowed;
        self
    }

    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Every state entered so far, starting with `Idle`.
    pub fn history(&self) -> &[AuthState] {
        &self.history
    }

    /// The canonical session token, available once authenticated.
    pub fn session(&self) -> Option<&SessionToken> {
        self.session.as_ref()
    }

    pub fn identity(&self) -> Option<&SelfIdentity> {
        self.identity.as_ref()
    }

    /// The authenticated session handle.
    pub fn client(&mut self) -> Result<&mut C> {
        match self.state {
            AuthState::Authenticated => Ok(&mut self.client),
            other => Err(Error::NotAuthenticated(other.to_string())),
        }
    }

    fn transition(&mut self, next: AuthState) {
        if self.state != next {
            info!("Auth state: {} -> {}", self.state, next);
        }
        self.state = next;
        self.history.push(next);
    }

    fn fail(&mut self, err: Error) -> Error {
        error!("Authentication failed in state {}: {}", self.state, err);
        self.transition(AuthState::Failed);
        err
    }

    fn expect_state(&self, expected: AuthState, operation: &str) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Error::InvalidArgument(format!(
                "{} is not allowed in state {}",
                operation, self.state
            )))
        }
    }

    /// `Idle → Connecting → (Authenticated | AwaitingPhoneCode)`.
    ///
    /// A saved session that cannot be restored is dropped with a warning and
    /// the machine continues as if none was given.
    pub async fn start(&mut self, credentials: &Credentials) -> Result<AuthState> {
        self.expect_state(AuthState::Idle, "start()")?;
        self.transition(AuthState::Connecting);

        let mut credentials = Cow::Borrowed(credentials);
        if !credentials.session.is_empty() {
            if let Err(err) = self.client.validate_session(&credentials.session) {
                warn!("Ignoring the saved session: {}", err);
                credentials = Cow::Owned(without_session(&credentials));
            }
        }

        let mut connected = self.connect_with_retries(&credentials).await;
        if let Err(Error::InvalidSession(reason)) = &connected {
            if !credentials.session.is_empty() {
                warn!("Saved session could not be opened ({}), starting a fresh login", reason);
                credentials = Cow::Owned(without_session(&credentials));
                connected = self.connect_with_retries(&credentials).await;
            }
        }
        if let Err(err) = connected {
            return Err(self.fail(err));
        }

        if !credentials.session.is_empty() {
            match self.client.is_authorized().await {
                Ok(true) => return self.complete().await,
                Ok(false) => warn!("Saved session was rejected, falling back to login"),
                Err(err) => {
                    let err = Error::ConnectionError(format!("authorization check failed: {}", err));
                    return Err(self.fail(err));
                }
            }
        }

        if !self.login_allowed {
            warn!("No usable saved session and prompting is disabled, not requesting a login code");
            return Err(self.fail(Error::missing_credentials(["session"])));
        }

        let Some(phone) = credentials.phone.as_deref() else {
            return Err(self.fail(Error::missing_credentials(["phone_number"])));
        };

        if let Err(err) = self.client.request_login_code(phone).await {
            let err = Error::AuthChallengeRejected {
                challenge: "phone number".to_string(),
                reason: err.to_string(),
            };
            return Err(self.fail(err));
        }

        info!("Login code dispatched to the account's other devices");
        self.transition(AuthState::AwaitingPhoneCode);
        Ok(self.state)
    }

    /// Transport failures are retried; an unusable session is returned at once.
    async fn connect_with_retries(&mut self, credentials: &Credentials) -> Result<()> {
        let attempts = self.limits.connect_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.client.connect(credentials).await {
                Ok(()) => {
                    self.connected = true;
                    return Ok(());
                }
                Err(err @ Error::InvalidSession(_)) => return Err(err),
                Err(err) => {
                    warn!("Connection attempt {}/{} failed: {}", attempt, attempts, err);
                    last_error = err.to_string();
                    if attempt < attempts {
                        tokio::time::sleep(self.limits.connect_backoff * attempt).await;
                    }
                }
            }
        }

        Err(Error::ConnectionError(format!(
            "gave up after {} attempts: {}",
            attempts, last_error
        )))
    }

    /// Answer the phone-code challenge once.
    ///
    /// A rejected code keeps the machine in `AwaitingPhoneCode` and returns
    /// [`Error::AuthChallengeRejected`] until the attempt ceiling is reached.
    pub async fn submit_code(&mut self, code: &str) -> Result<AuthState> {
        self.expect_state(AuthState::AwaitingPhoneCode, "submit_code()")?;
        self.code_attempts += 1;

        match self.client.sign_in(code.trim()).await {
            Ok(SignInOutcome::Authorized) => self.complete().await,
            Ok(SignInOutcome::PasswordRequired) => {
                info!("Account has two-factor protection");
                self.transition(AuthState::AwaitingPassword);
                Ok(self.state)
            }
            Ok(SignInOutcome::Rejected(reason)) => {
                Err(self.reject(AuthChallenge::PhoneCode, self.code_attempts, reason))
            }
            Err(err) => Err(self.fail(err)),
        }
    }

    /// Answer the 2FA challenge once. An empty password is a real answer.
    pub async fn submit_password(&mut self, password: &str) -> Result<AuthState> {
        self.expect_state(AuthState::AwaitingPassword, "submit_password()")?;
        self.password_attempts += 1;

        match self.client.check_password(password).await {
            Ok(SignInOutcome::Authorized) => self.complete().await,
            Ok(SignInOutcome::PasswordRequired) => Err(self.reject(
                AuthChallenge::TwoFactorPassword,
                self.password_attempts,
                "password still required".to_string(),
            )),
            Ok(SignInOutcome::Rejected(reason)) => Err(self.reject(
                AuthChallenge::TwoFactorPassword,
                self.password_attempts,
                reason,
            )),
            Err(err) => Err(self.fail(err)),
        }
    }

    fn reject(&mut self, challenge: AuthChallenge, attempts: u32, reason: String) -> Error {
        if attempts >= self.limits.max_code_attempts {
            return self.fail(Error::AuthAttemptsExhausted {
                challenge: challenge.label().to_string(),
                attempts,
            });
        }

        warn!(
            "{} rejected ({}/{}): {}",
            challenge.label(),
            attempts,
            self.limits.max_code_attempts,
            reason
        );
        // Re-enter the same challenge state.
        let current = self.state;
        self.transition(current);
        Error::AuthChallengeRejected {
            challenge: challenge.label().to_string(),
            reason,
        }
    }

    /// Enter `Authenticated`, capture the session and verify identity.
    async fn complete(&mut self) -> Result<AuthState> {
        self.transition(AuthState::Authenticated);

        match self.client.export_session().await {
            Ok(token) => self.session = Some(token),
            Err(err) => {
                let err = Error::PostAuthVerificationFailed(format!(
                    "could not export session: {}",
                    err
                ));
                return Err(self.fail(err));
            }
        }

        match self.client.get_me().await {
            Ok(me) => {
                info!(
                    "Authenticated as {} (@{})",
                    me.name,
                    me.username.as_deref().unwrap_or("N/A")
                );
                self.identity = Some(me);
                Ok(self.state)
            }
            Err(err) => Err(self.fail(Error::PostAuthVerificationFailed(err.to_string()))),
        }
    }

    /// Run the whole flow, asking `responder` for each challenge.
    pub async fn authenticate<R: ChallengeResponder + ?Sized>(
        &mut self,
        credentials: &Credentials,
        responder: &mut R,
    ) -> Result<&SelfIdentity> {
        let mut state = self.start(credentials).await?;

        loop {
            let challenge = match state {
                AuthState::Authenticated => break,
                AuthState::AwaitingPhoneCode => AuthChallenge::PhoneCode,
                AuthState::AwaitingPassword => AuthChallenge::TwoFactorPassword,
                other => return Err(Error::NotAuthenticated(other.to_string())),
            };

            let answer = match responder.answer(challenge) {
                Ok(answer) => answer,
                Err(err) => return Err(self.fail(err)),
            };

            let submitted = match challenge {
                AuthChallenge::PhoneCode => self.submit_code(&answer).await,
                AuthChallenge::TwoFactorPassword => self.submit_password(&answer).await,
            };

            state = match submitted {
                Ok(next) => next,
                // Already logged by `reject`; ask again.
                Err(Error::AuthChallengeRejected { .. }) => self.state,
                Err(err) => return Err(err),
            };
        }

        self.identity
            .as_ref()
            .ok_or_else(|| Error::NotAuthenticated(self.state.to_string()))
    }

    /// Release the connection. Safe from any state, idempotent.
    pub async fn stop(&mut self) {
        if self.state == AuthState::Closed {
            return;
        }

        if self.connected {
            if let Err(err) = self.client.disconnect().await {
                warn!("Disconnect failed: {}", err);
            }
            self.connected = false;
            info!("Disconnected from Telegram");
        }

        self.transition(AuthState::Closed);
    }
}

fn without_session(credentials: &Credentials) -> Credentials {
    Credentials {
        session: SessionToken::empty(),
        ..credentials.clone()
    }
}
