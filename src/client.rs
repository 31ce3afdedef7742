//! The chat-service client seam.
//!
//! Everything the harness needs from Telegram goes through [`ChatClient`].
//! The production implementation lives in [`crate::telegram`]; tests drive
//! the authenticator and fetchers with scripted clients.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;

use crate::chat::EntityQuery;
use crate::credentials::Credentials;
use crate::error::{Error, Result};

/// Opaque session string. Reusing it skips phone/password verification.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into().trim().to_string())
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("SessionToken(<empty>)")
        } else {
            write!(f, "SessionToken(<{} chars>)", self.0.len())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationKind {
    User,
    Group,
    /// A megagroup: group semantics on channel infrastructure.
    Supergroup,
    Channel,
    SavedMessages,
}

impl ConversationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationKind::User => "user",
            ConversationKind::Group => "group",
            ConversationKind::Supergroup => "supergroup",
            ConversationKind::Channel => "channel",
            ConversationKind::SavedMessages => "saved",
        }
    }
}

/// Flags carried by channel-backed conversations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelFlags {
    pub broadcast: bool,
    pub megagroup: bool,
    pub restricted: bool,
}

/// A resolved dialog, channel or user.
///
/// Only client implementations build these; user input goes through
/// [`crate::chat::resolve_entity`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationRef {
    pub display_name: String,
    pub id: i64,
    pub kind: ConversationKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelFlags>,
}

impl ConversationRef {
    pub fn new(display_name: impl Into<String>, id: i64, kind: ConversationKind) -> Self {
        Self {
            display_name: display_name.into(),
            id,
            kind,
            username: None,
            channel: None,
        }
    }

    pub fn with_channel_flags(mut self, flags: ChannelFlags) -> Self {
        self.channel = Some(flags);
        self
    }

    pub fn with_username(mut self, username: Option<&str>) -> Self {
        self.username = username.filter(|u| !u.is_empty()).map(str::to_string);
        self
    }

    /// Id in the marked form used by bot APIs and sync tables.
    ///
    /// Broadcast channels and supergroups get `-100…`, basic groups `-…`.
    pub fn marked_id(&self) -> i64 {
        match self.kind {
            ConversationKind::Channel | ConversationKind::Supergroup => {
                format!("-100{}", self.id).parse().unwrap_or(self.id)
            }
            ConversationKind::Group if self.id > 0 => -self.id,
            _ => self.id,
        }
    }
}

impl fmt::Display for ConversationRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.display_name, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRecord {
    pub id: i32,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    pub has_media: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogSummary {
    pub conversation: ConversationRef,
    pub unread: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelfIdentity {
    pub id: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Parameters of a single `getMessages` round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageQuery {
    pub limit: usize,
    pub min_id: i32,
}

/// What the server answered to a login code or 2FA password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    Authorized,
    PasswordRequired,
    Rejected(String),
}

/// Operations consumed from the chat service.
///
/// Calls are issued strictly one at a time, hence `&mut self` throughout.
#[async_trait]
pub trait ChatClient: Send {
    /// Reject a saved session that can never be restored, before any connect.
    fn validate_session(&self, _token: &SessionToken) -> Result<()> {
        Ok(())
    }

    /// Open the connection, restoring `credentials.session` when non-empty.
    async fn connect(&mut self, credentials: &Credentials) -> Result<()>;

    async fn is_authorized(&mut self) -> Result<bool>;

    /// Ask the server to dispatch a login code for `phone`.
    async fn request_login_code(&mut self, phone: &str) -> Result<()>;

    async fn sign_in(&mut self, code: &str) -> Result<SignInOutcome>;

    async fn check_password(&mut self, password: &str) -> Result<SignInOutcome>;

    async fn get_me(&mut self) -> Result<SelfIdentity>;

    /// `Ok(None)` when the entity does not exist or is not accessible.
    async fn get_entity(&mut self, query: &EntityQuery) -> Result<Option<ConversationRef>>;

    async fn get_messages(
        &mut self,
        conversation: &ConversationRef,
        query: MessageQuery,
    ) -> Result<Vec<MessageRecord>>;

    async fn get_dialogs(&mut self, limit: usize) -> Result<Vec<DialogSummary>>;

    async fn export_session(&mut self) -> Result<SessionToken>;

    async fn disconnect(&mut self) -> Result<()>;
}

/// Bounds every call of the wrapped client with a timeout.
pub struct TimeoutClient<C> {
    inner: C,
    timeout: Duration,
}

impl<C: ChatClient> TimeoutClient<C> {
    pub fn new(inner: C, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

async fn bounded<T, F>(timeout: Duration, operation: &str, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>> + Send,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result,
        Err(_) => Err(Error::TelegramError(format!(
            "{} timed out after {}s",
            operation,
            timeout.as_secs()
        ))),
    }
}

#[async_trait]
impl<C: ChatClient> ChatClient for TimeoutClient<C> {
    fn validate_session(&self, token: &SessionToken) -> Result<()> {
        self.inner.validate_session(token)
    }

    async fn connect(&mut self, credentials: &Credentials) -> Result<()> {
        bounded(self.timeout, "connect", self.inner.connect(credentials)).await
    }

    async fn is_authorized(&mut self) -> Result<bool> {
        bounded(self.timeout, "authorization check", self.inner.is_authorized()).await
    }

    async fn request_login_code(&mut self, phone: &str) -> Result<()> {
        bounded(self.timeout, "login code request", self.inner.request_login_code(phone)).await
    }

    async fn sign_in(&mut self, code: &str) -> Result<SignInOutcome> {
        bounded(self.timeout, "sign in", self.inner.sign_in(code)).await
    }

    async fn check_password(&mut self, password: &str) -> Result<SignInOutcome> {
        bounded(self.timeout, "password check", self.inner.check_password(password)).await
    }

    async fn get_me(&mut self) -> Result<SelfIdentity> {
        bounded(self.timeout, "getMe", self.inner.get_me()).await
    }

    async fn get_entity(&mut self, query: &EntityQuery) -> Result<Option<ConversationRef>> {
        bounded(self.timeout, "getEntity", self.inner.get_entity(query)).await
    }

    async fn get_messages(
        &mut self,
        conversation: &ConversationRef,
        query: MessageQuery,
    ) -> Result<Vec<MessageRecord>> {
        bounded(
            self.timeout,
            "getMessages",
            self.inner.get_messages(conversation, query),
        )
        .await
    }

    async fn get_dialogs(&mut self, limit: usize) -> Result<Vec<DialogSummary>> {
        bounded(self.timeout, "getDialogs", self.inner.get_dialogs(limit)).await
    }

    async fn export_session(&mut self) -> Result<SessionToken> {
        bounded(self.timeout, "session export", self.inner.export_session()).await
    }

    async fn disconnect(&mut self) -> Result<()> {
        bounded(self.timeout, "disconnect", self.inner.disconnect()).await
    }
}
