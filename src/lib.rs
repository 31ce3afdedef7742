//! Telegram session bootstrap & diagnostics library
//!
//! This library provides tools to:
//! - Resolve API credentials from the environment, a secrets file, config.yml or a prompt
//! - Authenticate a user session (login code, optional 2FA password) and export it
//! - Locate dialogs, channels and users from loose identifiers
//! - Fetch bounded message batches with a min-id filter
//! - Render diagnostic reports as a table, JSON or YAML

pub mod auth;
pub mod chat;
pub mod client;
pub mod config;
pub mod credentials;
pub mod error;
pub mod messages;
pub mod report;
pub mod session;
pub mod telegram;

// Re-export common types
pub use auth::{AuthChallenge, AuthState, Authenticator, ChallengeResponder, ScriptedResponder};
pub use chat::{resolve_entity, EntityQuery};
pub use client::{
    ChannelFlags, ChatClient, ConversationKind, ConversationRef, MessageRecord, SessionToken,
};
pub use config::{AuthLimits, Config};
pub use credentials::{CredentialResolver, CredentialSource, Credentials};
pub use error::{Error, Result};
pub use messages::{fetch_dialogs, fetch_messages};
pub use report::{OutputFormat, Report};

// Commands module uses re-exported types, so it must be declared after the re-exports
pub mod commands;
