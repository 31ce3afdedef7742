//! `ChatClient` on top of the grammers MTProto stack
//!
//! The session lives in a SQLite file (grammers' storage); the portable
//! token is that file, base64-encoded (see [`crate::session`]).

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use grammers_client::types::peer::Peer;
use grammers_client::types::{Dialog, LoginToken, Message, PasswordToken};
use grammers_client::{Client, SignInError};
use grammers_mtsender::{SenderPool, SenderPoolHandle};
use grammers_session::storages::SqliteSession;
use tracing::{debug, info};

use crate::chat::EntityQuery;
use crate::client::{
    ChannelFlags, ChatClient, ConversationKind, ConversationRef, DialogSummary, MessageQuery, MessageRecord,
    SelfIdentity, SessionToken, SignInOutcome,
};
use crate::credentials::Credentials;
use crate::error::{Error, Result};
use crate::session::{export_token, import_token, validate_token};

/// Holder for SenderPool components and Client
struct Connection {
    client: Client,
    _handle: SenderPoolHandle,
    _session: Arc<SqliteSession>,
    runner: tokio::task::JoinHandle<()>,
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.runner.abort();
    }
}

pub struct GrammersClient {
    session_file: PathBuf,
    api_hash: String,
    connection: Option<Connection>,
    login_token: Option<LoginToken>,
    password_token: Option<PasswordToken>,
}

impl GrammersClient {
    pub fn new(session_file: impl Into<PathBuf>) -> Self {
        Self {
            session_file: session_file.into(),
            api_hash: String::new(),
            connection: None,
            login_token: None,
            password_token: None,
        }
    }

    fn client(&self) -> Result<&Client> {
        self.connection
            .as_ref()
            .map(|c| &c.client)
            .ok_or_else(|| Error::ConnectionError("not connected".into()))
    }
}

#[async_trait]
impl ChatClient for GrammersClient {
    fn validate_session(&self, token: &SessionToken) -> Result<()> {
        validate_token(token)
    }

    async fn connect(&mut self, credentials: &Credentials) -> Result<()> {
        // Drop any half-open connection from a previous attempt.
        self.connection = None;
        import_token(&credentials.session, &self.session_file)?;

        let session = SqliteSession::open(&self.session_file).map_err(|e| {
            let reason = format!("Failed to open session: {}", e);
            if credentials.session.is_empty() {
                Error::ConnectionError(reason)
            } else {
                Error::InvalidSession(reason)
            }
        })?;
        let session = Arc::new(session);

        let pool = SenderPool::new(session.clone(), credentials.api_id);
        let client = Client::new(&pool);
        let SenderPool { runner, handle, .. } = pool;

        // Spawn the runner in background
        let runner = tokio::spawn(async move {
            runner.run().await;
        });

        let connection = Connection {
            client,
            _handle: handle,
            _session: session,
            runner,
        };

        // First round trip proves the network path.
        connection
            .client
            .is_authorized()
            .await
            .map_err(|e| Error::ConnectionError(e.to_string()))?;

        self.api_hash = credentials.api_hash.clone();
        self.connection = Some(connection);
        info!("Connected to Telegram");
        Ok(())
    }

    async fn is_authorized(&mut self) -> Result<bool> {
        Ok(self.client()?.is_authorized().await?)
    }

    async fn request_login_code(&mut self, phone: &str) -> Result<()> {
        let token = self
            .client()?
            .request_login_code(phone, &self.api_hash)
            .await
            .map_err(|e| Error::TelegramError(format!("Failed to request code: {}", e)))?;
        self.login_token = Some(token);
        Ok(())
    }

    async fn sign_in(&mut self, code: &str) -> Result<SignInOutcome> {
        let client = self.client()?.clone();
        let token = self
            .login_token
            .as_ref()
            .ok_or_else(|| Error::InvalidArgument("no login code was requested".into()))?;

        match client.sign_in(token, code).await {
            Ok(_) => Ok(SignInOutcome::Authorized),
            Err(SignInError::PasswordRequired(password_token)) => {
                self.password_token = Some(password_token);
                Ok(SignInOutcome::PasswordRequired)
            }
            Err(SignInError::InvalidCode) => Ok(SignInOutcome::Rejected("invalid code".into())),
            Err(e) => Err(Error::TelegramError(format!("Failed to sign in: {}", e))),
        }
    }

    async fn check_password(&mut self, password: &str) -> Result<SignInOutcome> {
        let client = self.client()?.clone();
        // SRP parameters are single use: a rejected password needs a new login.
        let token = self.password_token.take().ok_or_else(|| {
            Error::TelegramError("password challenge expired, restart the login".into())
        })?;

        match client.check_password(token, password.as_bytes()).await {
            Ok(_) => Ok(SignInOutcome::Authorized),
            Err(SignInError::InvalidPassword { .. }) => {
                Ok(SignInOutcome::Rejected("invalid password".into()))
            }
            Err(e) => Err(Error::TelegramError(format!("Failed to check password: {}", e))),
        }
    }

    async fn get_me(&mut self) -> Result<SelfIdentity> {
        let me = self.client()?.get_me().await?;
        Ok(SelfIdentity {
            id: me.raw.id(),
            name: me.full_name(),
            username: me.username().map(str::to_string),
        })
    }

    async fn get_entity(&mut self, query: &EntityQuery) -> Result<Option<ConversationRef>> {
        let client = self.client()?;
        match query {
            EntityQuery::Me => {
                let me = client.get_me().await?;
                Ok(Some(
                    ConversationRef::new("Saved Messages", me.raw.id(), ConversationKind::SavedMessages)
                        .with_username(me.username()),
                ))
            }
            EntityQuery::Username(username) => Ok(client
                .resolve_username(username)
                .await?
                .map(|peer| conversation_from_peer(&peer))),
            EntityQuery::Id(target_id) => {
                // Ids only resolve for peers already present in the dialogs.
                let mut dialogs = client.iter_dialogs();
                while let Some(dialog) = dialogs.next().await? {
                    if peer_id(&dialog.peer) == *target_id {
                        return Ok(Some(conversation_from_peer(&dialog.peer)));
                    }
                }
                Ok(None)
            }
        }
    }

    async fn get_messages(
        &mut self,
        conversation: &ConversationRef,
        query: MessageQuery,
    ) -> Result<Vec<MessageRecord>> {
        let client = self.client()?;
        let peer = find_peer(client, conversation).await?;

        let mut records = Vec::new();
        let mut iter = client.iter_messages(&peer);
        while let Some(msg) = iter.next().await? {
            // Newest first: everything after this is older still.
            if query.min_id > 0 && msg.id() <= query.min_id {
                break;
            }
            records.push(message_record(&msg));
            if records.len() >= query.limit {
                break;
            }
        }

        debug!("Loaded {} messages from {}", records.len(), conversation);
        Ok(records)
    }

    async fn get_dialogs(&mut self, limit: usize) -> Result<Vec<DialogSummary>> {
        let client = self.client()?;
        let mut summaries = Vec::new();
        let mut dialogs = client.iter_dialogs();

        while let Some(dialog) = dialogs.next().await? {
            summaries.push(DialogSummary {
                conversation: conversation_from_peer(&dialog.peer),
                unread: extract_unread_count(&dialog),
                last_message_at: dialog.last_message.as_ref().map(|m| m.date().timestamp()),
            });
            if summaries.len() >= limit {
                break;
            }
        }

        Ok(summaries)
    }

    async fn export_session(&mut self) -> Result<SessionToken> {
        // SqliteSession auto-saves to the database file
        export_token(&self.session_file)
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.login_token = None;
        self.password_token = None;
        if self.connection.take().is_some() {
            debug!("Sender pool runner stopped");
        }
        Ok(())
    }
}

/// Find the live peer behind a resolved conversation.
async fn find_peer(client: &Client, conversation: &ConversationRef) -> Result<Peer> {
    if conversation.kind == ConversationKind::SavedMessages {
        let me = client.get_me().await?;
        return Ok(Peer::User(me));
    }

    if let Some(username) = conversation.username.as_deref() {
        if let Some(peer) = client.resolve_username(username).await? {
            return Ok(peer);
        }
    }

    let mut dialogs = client.iter_dialogs();
    while let Some(dialog) = dialogs.next().await? {
        if peer_id(&dialog.peer) == conversation.id {
            return Ok(dialog.peer.clone());
        }
    }

    Err(Error::TelegramError(format!(
        "{} is no longer accessible",
        conversation
    )))
}

fn conversation_from_peer(peer: &Peer) -> ConversationRef {
    let (title, kind, username, flags) = match peer {
        Peer::Channel(c) => {
            let flags = ChannelFlags {
                broadcast: c.raw.broadcast,
                megagroup: c.raw.megagroup,
                restricted: c.raw.restricted,
            };
            let kind = if flags.megagroup {
                ConversationKind::Supergroup
            } else {
                ConversationKind::Channel
            };
            (c.title().to_string(), kind, c.username(), Some(flags))
        }
        Peer::Group(g) => {
            let flags = channel_flags(&g.raw);
            let kind = if flags.is_some() {
                ConversationKind::Supergroup
            } else {
                ConversationKind::Group
            };
            (g.title().unwrap_or("Group").to_string(), kind, None, flags)
        }
        Peer::User(u) => (u.full_name(), ConversationKind::User, u.username(), None),
    };

    let conversation = ConversationRef::new(title, peer_id(peer), kind).with_username(username);
    match flags {
        Some(flags) => conversation.with_channel_flags(flags),
        None => conversation,
    }
}

/// Megagroups surface as groups but are backed by a channel.
fn channel_flags(raw: &grammers_tl_types::enums::Chat) -> Option<ChannelFlags> {
    match raw {
        grammers_tl_types::enums::Chat::Channel(c) => Some(ChannelFlags {
            broadcast: c.broadcast,
            megagroup: c.megagroup,
            restricted: c.restricted,
        }),
        grammers_tl_types::enums::Chat::ChannelForbidden(c) => Some(ChannelFlags {
            broadcast: c.broadcast,
            megagroup: c.megagroup,
            restricted: false,
        }),
        _ => None,
    }
}

fn peer_id(peer: &Peer) -> i64 {
    match peer {
        Peer::Channel(c) => c.raw.id,
        Peer::Group(g) => chat_id(&g.raw),
        Peer::User(u) => u.raw.id(),
    }
}

// Groups can be either Chat or Channel (megagroup)
fn chat_id(raw: &grammers_tl_types::enums::Chat) -> i64 {
    match raw {
        grammers_tl_types::enums::Chat::Empty(c) => c.id,
        grammers_tl_types::enums::Chat::Chat(c) => c.id,
        grammers_tl_types::enums::Chat::Forbidden(c) => c.id,
        grammers_tl_types::enums::Chat::Channel(c) => c.id,
        grammers_tl_types::enums::Chat::ChannelForbidden(c) => c.id,
    }
}

fn message_record(msg: &Message) -> MessageRecord {
    let text = msg.text();
    MessageRecord {
        id: msg.id(),
        timestamp: msg.date().timestamp(),
        text: (!text.is_empty()).then(|| text.to_string()),
        has_media: msg.media().is_some(),
        sender_id: msg.sender().map(|s| match s {
            Peer::User(u) => u.raw.id(),
            Peer::Group(g) => chat_id(&g.raw),
            Peer::Channel(c) => c.raw.id,
        }),
    }
}

fn extract_unread_count(dialog: &Dialog) -> i32 {
    match &dialog.raw {
        grammers_tl_types::enums::Dialog::Dialog(d) => d.unread_count,
        grammers_tl_types::enums::Dialog::Folder(folder) => {
            folder.unread_muted_messages_count + folder.unread_unmuted_messages_count
        }
    }
}
