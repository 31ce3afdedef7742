//! Scripted `ChatClient` shared by the integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use tg_diag::client::{DialogSummary, MessageQuery, SelfIdentity, SignInOutcome};
use tg_diag::{
    AuthLimits, ChannelFlags, ChatClient, ConversationKind, ConversationRef, Credentials, EntityQuery, Error,
    MessageRecord, Result, SessionToken,
};

pub const ME_ID: i64 = 42;
pub const TELEGRAM_ID: i64 = 1005640892;
pub const EMPTY_ID: i64 = 2000000001;
pub const BROKEN_ID: i64 = 2000000002;
pub const ALICE_ID: i64 = 777;
pub const DEVS_ID: i64 = 1350000001;
pub const DUROV_ID: i64 = 1006503122;
pub const VALID_CODE: &str = "11111";
pub const EXPORTED_SESSION: &str = "c2Vzc2lvbi1ieXRlcw";

/// What the fake server does.
#[derive(Debug, Clone)]
pub struct Script {
    /// Saved sessions are honored.
    pub accept_session: bool,
    /// 2FA password, when the account has one.
    pub password: Option<String>,
    /// Connect fails this many times before succeeding.
    pub connect_failures: u32,
    /// Saved sessions pass validation but cannot be opened.
    pub corrupt_session: bool,
    pub code_request_fails: bool,
    pub get_me_fails: bool,
    pub export_fails: bool,
    pub disconnect_fails: bool,
    pub panic_on_dialogs: bool,
    /// Every data call sleeps this long first.
    pub delay: Option<Duration>,
    /// The account's dialogs.
    pub conversations: Vec<ConversationRef>,
    /// Resolvable by handle but not joined.
    pub public: Vec<ConversationRef>,
    pub messages: HashMap<i64, Vec<MessageRecord>>,
    pub failing_fetch: Vec<i64>,
}

impl Default for Script {
    fn default() -> Self {
        let telegram = ConversationRef::new("Telegram News", TELEGRAM_ID, ConversationKind::Channel)
            .with_username(Some("telegram"));
        let empty = ConversationRef::new("Quiet Channel", EMPTY_ID, ConversationKind::Channel)
            .with_username(Some("quiet_channel"));
        let broken = ConversationRef::new("Broken Group", BROKEN_ID, ConversationKind::Group)
            .with_username(Some("broken_group"));
        let alice =
            ConversationRef::new("Alice", ALICE_ID, ConversationKind::User).with_username(Some("alice"));
        let devs = ConversationRef::new("Rust Devs", DEVS_ID, ConversationKind::Supergroup)
            .with_username(Some("rust_devs"))
            .with_channel_flags(ChannelFlags {
                megagroup: true,
                ..ChannelFlags::default()
            });
        let durov = ConversationRef::new("Durov's Channel", DUROV_ID, ConversationKind::Channel)
            .with_username(Some("durov"))
            .with_channel_flags(ChannelFlags {
                broadcast: true,
                ..ChannelFlags::default()
            });

        let mut messages = HashMap::new();
        // Stored oldest first, the way a careless server might answer.
        messages.insert(TELEGRAM_ID, (1..=12).map(record).collect());
        messages.insert(ME_ID, (1..=8).map(record).collect());
        messages.insert(ALICE_ID, vec![record(3), record(1), record(2)]);
        messages.insert(DEVS_ID, (1..=3).map(record).collect());

        Self {
            accept_session: true,
            password: None,
            connect_failures: 0,
            corrupt_session: false,
            code_request_fails: false,
            get_me_fails: false,
            export_fails: false,
            disconnect_fails: false,
            panic_on_dialogs: false,
            delay: None,
            conversations: vec![telegram, alice, empty, broken],
            public: vec![devs, durov],
            messages,
            failing_fetch: vec![BROKEN_ID],
        }
    }
}

pub fn record(id: i32) -> MessageRecord {
    MessageRecord {
        id,
        timestamp: 1_700_000_000 + i64::from(id) * 60,
        text: (id % 4 != 0).then(|| format!("message #{}", id)),
        has_media: id % 4 == 0,
        sender_id: Some(ME_ID),
    }
}

/// Calls made against the mock, shared with the test after the client moves.
pub type CallLog = Arc<Mutex<Vec<String>>>;

pub struct MockClient {
    script: Script,
    calls: CallLog,
    connect_attempts: u32,
    authorized: bool,
    code_sent: bool,
}

impl MockClient {
    pub fn new(script: Script) -> (Self, CallLog) {
        let calls = CallLog::default();
        let client = Self {
            script,
            calls: calls.clone(),
            connect_attempts: 0,
            authorized: false,
            code_sent: false,
        };
        (client, calls)
    }

    fn log(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }

    async fn pause(&self) {
        if let Some(delay) = self.script.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn saved_messages(&self) -> ConversationRef {
        ConversationRef::new("Saved Messages", ME_ID, ConversationKind::SavedMessages)
    }

    fn known(&self) -> impl Iterator<Item = &ConversationRef> {
        self.script.conversations.iter().chain(&self.script.public)
    }
}

#[async_trait]
impl ChatClient for MockClient {
    /// Tokens use the URL-safe base64 alphabet.
    fn validate_session(&self, token: &SessionToken) -> Result<()> {
        self.log("validate_session");
        let valid = token
            .as_str()
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidSession("malformed session token".into()))
        }
    }

    async fn connect(&mut self, credentials: &Credentials) -> Result<()> {
        self.log("connect");
        self.connect_attempts += 1;
        if self.connect_attempts <= self.script.connect_failures {
            return Err(Error::ConnectionError("connection refused".into()));
        }
        if self.script.corrupt_session && !credentials.session.is_empty() {
            return Err(Error::InvalidSession("file is not a database".into()));
        }
        self.authorized = self.script.accept_session && !credentials.session.is_empty();
        Ok(())
    }

    async fn is_authorized(&mut self) -> Result<bool> {
        self.log("is_authorized");
        Ok(self.authorized)
    }

    async fn request_login_code(&mut self, phone: &str) -> Result<()> {
        self.log(&format!("request_login_code {}", phone));
        if self.script.code_request_fails {
            return Err(Error::TelegramError("PHONE_NUMBER_INVALID".into()));
        }
        self.code_sent = true;
        Ok(())
    }

    async fn sign_in(&mut self, code: &str) -> Result<SignInOutcome> {
        self.log(&format!("sign_in {}", code));
        if !self.code_sent {
            return Err(Error::InvalidArgument("no login code was requested".into()));
        }
        if code != VALID_CODE {
            return Ok(SignInOutcome::Rejected("PHONE_CODE_INVALID".into()));
        }
        if self.script.password.is_some() {
            return Ok(SignInOutcome::PasswordRequired);
        }
        self.authorized = true;
        Ok(SignInOutcome::Authorized)
    }

    async fn check_password(&mut self, password: &str) -> Result<SignInOutcome> {
        self.log("check_password");
        match &self.script.password {
            Some(expected) if expected == password => {
                self.authorized = true;
                Ok(SignInOutcome::Authorized)
            }
            Some(_) => Ok(SignInOutcome::Rejected("PASSWORD_HASH_INVALID".into())),
            None => Err(Error::InvalidArgument("no password was requested".into())),
        }
    }

    async fn get_me(&mut self) -> Result<SelfIdentity> {
        self.log("get_me");
        self.pause().await;
        if self.script.get_me_fails || !self.authorized {
            return Err(Error::TelegramError("AUTH_KEY_UNREGISTERED".into()));
        }
        Ok(SelfIdentity {
            id: ME_ID,
            name: "Test User".into(),
            username: Some("test_user".into()),
        })
    }

    async fn get_entity(&mut self, query: &EntityQuery) -> Result<Option<ConversationRef>> {
        self.log(&format!("get_entity {}", query));
        self.pause().await;
        let found = match query {
            EntityQuery::Me => Some(self.saved_messages()),
            EntityQuery::Username(name) => self
                .known()
                .find(|c| c.username.as_deref() == Some(name.as_str()))
                .cloned(),
            EntityQuery::Id(id) => self.script.conversations.iter().find(|c| c.id == *id).cloned(),
        };
        Ok(found)
    }

    async fn get_messages(
        &mut self,
        conversation: &ConversationRef,
        query: MessageQuery,
    ) -> Result<Vec<MessageRecord>> {
        self.log(&format!(
            "get_messages {} limit={} min_id={}",
            conversation.id, query.limit, query.min_id
        ));
        self.pause().await;
        if self.script.failing_fetch.contains(&conversation.id) {
            return Err(Error::TelegramError("CHANNEL_PRIVATE".into()));
        }
        // Ignores the query entirely; the fetcher has to shape the batch.
        Ok(self
            .script
            .messages
            .get(&conversation.id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_dialogs(&mut self, limit: usize) -> Result<Vec<DialogSummary>> {
        self.log(&format!("get_dialogs {}", limit));
        if self.script.panic_on_dialogs {
            panic!("dialog decoding blew up");
        }
        self.pause().await;
        Ok(self
            .script
            .conversations
            .iter()
            .map(|conversation| DialogSummary {
                conversation: conversation.clone(),
                unread: 2,
                last_message_at: Some(1_700_000_000),
            })
            .collect())
    }

    async fn export_session(&mut self) -> Result<SessionToken> {
        self.log("export_session");
        if self.script.export_fails {
            return Err(Error::IoError(std::io::Error::other("session file vanished")));
        }
        Ok(SessionToken::new(EXPORTED_SESSION))
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.log("disconnect");
        if self.script.disconnect_fails {
            return Err(Error::ConnectionError("socket already closed".into()));
        }
        Ok(())
    }
}

/// The `{12345, "abc", session}` credential set with phone `+10000000000`.
pub fn credentials(session: &str) -> Credentials {
    Credentials {
        api_id: 12345,
        api_hash: "abc".into(),
        session: SessionToken::new(session),
        phone: Some("+10000000000".into()),
    }
}

/// Limits that keep retry tests fast.
pub fn fast_limits() -> AuthLimits {
    AuthLimits {
        connect_backoff: Duration::from_millis(1),
        ..AuthLimits::default()
    }
}

pub fn count(calls: &CallLog, prefix: &str) -> usize {
    calls
        .lock()
        .unwrap()
        .iter()
        .filter(|call| call.starts_with(prefix))
        .count()
}
