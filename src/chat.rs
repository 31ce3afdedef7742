//! Entity resolution: user-supplied identifiers to conversations

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::client::{ChatClient, ConversationRef};
use crate::error::{Error, Result};

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]{3,31}$").expect("valid regex"));

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:https?://)?(?:t\.me|telegram\.me)/(?:s/)?([A-Za-z0-9_]+)(?:/\d+)?/?$")
        .expect("valid regex")
});

/// A parsed identifier, ready to hand to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityQuery {
    /// The account itself (Saved Messages).
    Me,
    /// Public username, without `@`.
    Username(String),
    /// Bare numeric id; marked channel ids (`-100…`) are unwrapped.
    Id(i64),
}

impl EntityQuery {
    /// Parse `me`, `@handle`, `handle`, numeric ids and t.me links.
    pub fn parse(identifier: &str) -> Result<Self> {
        let trimmed = identifier.trim();
        if trimmed.is_empty() {
            return Err(Error::entity_not_found(identifier, "empty identifier"));
        }

        if trimmed.eq_ignore_ascii_case("me") || trimmed.eq_ignore_ascii_case("self") {
            return Ok(EntityQuery::Me);
        }

        if let Ok(raw) = trimmed.parse::<i64>() {
            return Ok(EntityQuery::Id(unmark_id(raw)));
        }

        if let Some(caps) = LINK_RE.captures(trimmed) {
            return Self::username(identifier, &caps[1]);
        }

        Self::username(identifier, trimmed.trim_start_matches('@'))
    }

    fn username(identifier: &str, name: &str) -> Result<Self> {
        if USERNAME_RE.is_match(name) {
            Ok(EntityQuery::Username(name.to_string()))
        } else {
            Err(Error::entity_not_found(identifier, "not a valid username or id"))
        }
    }
}

impl fmt::Display for EntityQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityQuery::Me => f.write_str("me"),
            EntityQuery::Username(name) => write!(f, "@{}", name),
            EntityQuery::Id(id) => write!(f, "{}", id),
        }
    }
}

/// `-1001234567890` → `1234567890`, `-4242` → `4242`.
fn unmark_id(raw: i64) -> i64 {
    if raw >= 0 {
        return raw;
    }
    let digits = raw.unsigned_abs().to_string();
    match digits.strip_prefix("100") {
        Some(rest) if rest.len() >= 10 => rest.parse().unwrap_or(-raw),
        _ => -raw,
    }
}

/// Resolve a user-supplied identifier through the client.
///
/// Any failure comes back as [`Error::EntityNotFound`] with the original
/// identifier, so callers iterating several targets can carry on.
pub async fn resolve_entity<C: ChatClient + ?Sized>(
    client: &mut C,
    identifier: &str,
) -> Result<ConversationRef> {
    let query = EntityQuery::parse(identifier)?;
    debug!("Resolving {} as {:?}", identifier, query);

    match client.get_entity(&query).await {
        Ok(Some(conversation)) => Ok(conversation),
        Ok(None) => Err(Error::entity_not_found(
            identifier,
            "unknown or inaccessible entity",
        )),
        Err(err) => {
            warn!("Resolving {} failed: {}", identifier, err);
            Err(Error::entity_not_found(identifier, err))
        }
    }
}
