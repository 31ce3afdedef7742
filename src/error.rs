//! Error types for the Telegram diagnostics harness

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Missing credentials: {}", .missing.join(", "))]
    MissingCredentials { missing: Vec<String> },

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Unusable session: {0}")]
    InvalidSession(String),

    #[error("{challenge} rejected: {reason}")]
    AuthChallengeRejected { challenge: String, reason: String },

    #[error("{challenge} rejected {attempts} times, giving up")]
    AuthAttemptsExhausted { challenge: String, attempts: u32 },

    #[error("Post-auth verification failed: {0}")]
    PostAuthVerificationFailed(String),

    #[error("Entity not found: {identifier} ({reason})")]
    EntityNotFound { identifier: String, reason: String },

    #[error("Failed to fetch {target}: {reason}")]
    FetchFailed { target: String, reason: String },

    #[error("Telegram API error: {0}")]
    TelegramError(String),

    #[error("Not authenticated (state: {0})")]
    NotAuthenticated(String),

    #[error("Session is locked by another process")]
    SessionLocked,

    #[error("Failed to acquire session lock: {0}")]
    LockError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn missing_credentials<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Error::MissingCredentials {
            missing: fields.into_iter().map(Into::into).collect(),
        }
    }

    pub fn entity_not_found(identifier: &str, reason: impl std::fmt::Display) -> Self {
        Error::EntityNotFound {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn fetch_failed(target: &str, reason: impl std::fmt::Display) -> Self {
        Error::FetchFailed {
            target: target.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Fatal errors abort the run; the rest are recorded per target.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::EntityNotFound { .. } | Error::FetchFailed { .. }
        )
    }

    /// Stable name of the variant, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::MissingCredentials { .. } => "MissingCredentials",
            Error::ConnectionError(_) => "ConnectionError",
            Error::InvalidSession(_) => "InvalidSession",
            Error::AuthChallengeRejected { .. } => "AuthChallengeRejected",
            Error::AuthAttemptsExhausted { .. } => "AuthAttemptsExhausted",
            Error::PostAuthVerificationFailed(_) => "PostAuthVerificationFailed",
            Error::EntityNotFound { .. } => "EntityNotFound",
            Error::FetchFailed { .. } => "FetchFailed",
            Error::TelegramError(_) => "TelegramError",
            Error::NotAuthenticated(_) => "NotAuthenticated",
            Error::SessionLocked => "SessionLocked",
            Error::LockError(_) => "LockError",
            Error::InvalidArgument(_) => "InvalidArgument",
            Error::IoError(_) => "IoError",
            Error::SerializationError(_) => "SerializationError",
        }
    }

    /// Process exit code for this error when it ends the run.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::MissingCredentials { .. } => 2,
            Error::ConnectionError(_) => 3,
            Error::AuthChallengeRejected { .. } | Error::AuthAttemptsExhausted { .. } => 4,
            Error::PostAuthVerificationFailed(_) => 5,
            Error::EntityNotFound { .. } | Error::FetchFailed { .. } => 0,
            _ => 1,
        }
    }
}

impl From<grammers_client::InvocationError> for Error {
    fn from(err: grammers_client::InvocationError) -> Self {
        Error::TelegramError(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}
