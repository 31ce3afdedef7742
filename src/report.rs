//! Diagnostic report rendering (table / JSON / YAML).
//!
//! Nothing in here talks to the network: commands collect a [`Report`] and
//! hand it over once the run is finished.

use std::io::Write;

use chrono::DateTime;
use serde::Serialize;

use crate::client::{ConversationRef, DialogSummary, MessageRecord, SelfIdentity, SessionToken};
use crate::error::{Error, Result};

/// Preview width for message lists.
pub const PREVIEW_CHARS: usize = 100;
/// Preview width when a single conversation is inspected.
pub const DETAIL_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "table" | "pretty" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "yaml" | "yml" => Ok(Self::Yaml),
            other => Err(Error::InvalidArgument(format!(
                "Unsupported format '{}'. Use table|json|yaml",
                other
            ))),
        }
    }
}

/// Result of one locate + fetch step.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Ok { messages: Vec<MessageRecord> },
    Error { kind: String, message: String },
}

impl Outcome {
    pub fn from_error(err: &Error) -> Self {
        Outcome::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TargetOutcome {
    pub identifier: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation: Option<ConversationRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marked_id: Option<i64>,
    /// Whether the conversation is among the account's dialogs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribed: Option<bool>,
    pub limit: usize,
    pub min_id: i32,
    #[serde(flatten)]
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<SelfIdentity>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dialogs: Vec<DialogSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub targets: Vec<TargetOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(skip)]
    pub preview_chars: usize,
    /// Single-conversation view: wider previews and message senders.
    #[serde(skip)]
    pub detailed: bool,
}

impl Report {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            identity: None,
            session: None,
            dialogs: Vec::new(),
            targets: Vec::new(),
            notes: Vec::new(),
            preview_chars: PREVIEW_CHARS,
            detailed: false,
        }
    }

    /// Switch to the single-conversation view.
    pub fn detail_view(mut self) -> Self {
        self.preview_chars = DETAIL_PREVIEW_CHARS;
        self.detailed = true;
        self
    }

    /// Include the session token. Only `generate-session` prints it.
    pub fn with_session(&mut self, token: &SessionToken) {
        self.session = Some(token.as_str().to_string());
    }

    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Number of targets that ended in a non-fatal error.
    pub fn failures(&self) -> usize {
        self.targets.iter().filter(|t| !t.outcome.is_ok()).count()
    }

    pub fn render(&self, format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Table => Ok(render_table(self)),
            OutputFormat::Json => Ok(serde_json::to_string_pretty(self)?),
            OutputFormat::Yaml => Ok(serde_yaml::to_string(self)?),
        }
    }

    pub fn write_to<W: Write>(&self, format: OutputFormat, out: &mut W) -> Result<()> {
        let payload = self.render(format)?;
        writeln!(out, "{}", payload.trim_end())?;
        Ok(())
    }
}

/// Cut `text` to `max` characters on a char boundary, flattening newlines.
pub fn preview(text: &str, max: usize) -> String {
    let flat = text.replace('\n', " ");
    if flat.chars().count() <= max {
        return flat;
    }
    let cut: String = flat.chars().take(max).collect();
    format!("{}...", cut)
}

fn format_timestamp(ts: i64) -> String {
    DateTime::from_timestamp(ts, 0)
        .map(|d| d.format("%d.%m.%Y %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn render_table(report: &Report) -> String {
    let mut out = String::new();
    out.push_str(&format!("=== {} ===\n", report.title));

    if let Some(me) = &report.identity {
        out.push_str(&format!(
            "\nLogged in as: {} (@{}) id={}\n",
            me.name,
            me.username.as_deref().unwrap_or("N/A"),
            me.id
        ));
    }

    if let Some(session) = &report.session {
        out.push_str("\nSession string (keep it secret):\n");
        out.push_str(session);
        out.push_str("\n\nAdd this line to your secrets file:\n");
        out.push_str(&format!("TELEGRAM_SESSION={}\n", session));
    }

    if !report.dialogs.is_empty() {
        out.push_str(&format!("\nDialogs: {}\n", report.dialogs.len()));
        out.push_str(&format!(
            "{:<4} {:<16} {:<9} {:<8} {:<16} | Title\n",
            "#", "ID", "Type", "Unread", "Last message"
        ));
        out.push_str(&format!("{}\n", "-".repeat(80)));
        for (idx, dialog) in report.dialogs.iter().enumerate() {
            let ts = dialog
                .last_message_at
                .map(format_timestamp)
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "{:<4} {:<16} {:<9} {:<8} {:<16} | {}\n",
                idx + 1,
                dialog.conversation.id,
                dialog.conversation.kind.as_str(),
                dialog.unread,
                ts,
                dialog.conversation.display_name
            ));
        }
    }

    for target in &report.targets {
        out.push_str(&format!("\n--- {} [{}] ---\n", target.identifier, target.label));
        if let Some(conv) = &target.conversation {
            out.push_str(&format!(
                "Entity: {} | type={} | id={}",
                conv.display_name,
                conv.kind.as_str(),
                conv.id
            ));
            if let Some(marked) = target.marked_id {
                out.push_str(&format!(" | marked id={}", marked));
            }
            if let Some(username) = &conv.username {
                out.push_str(&format!(" | @{}", username));
            }
            if let Some(flags) = &conv.channel {
                out.push_str(&format!(
                    " | broadcast={} megagroup={} restricted={}",
                    flags.broadcast, flags.megagroup, flags.restricted
                ));
            }
            match target.subscribed {
                Some(true) => out.push_str(" | subscribed"),
                Some(false) => out.push_str(" | not subscribed"),
                None => {}
            }
            out.push('\n');
        }
        out.push_str(&format!("limit={} min_id={}\n", target.limit, target.min_id));

        match &target.outcome {
            Outcome::Ok { messages } if messages.is_empty() => out.push_str("✓ no messages\n"),
            Outcome::Ok { messages } => {
                out.push_str(&format!("✓ {} messages\n", messages.len()));
                for msg in messages {
                    let body = match (&msg.text, msg.has_media) {
                        (Some(text), _) => preview(text, report.preview_chars),
                        (None, true) => "[media]".to_string(),
                        (None, false) => "[no text]".to_string(),
                    };
                    let sender = match msg.sender_id {
                        Some(id) if report.detailed => format!(" from={}", id),
                        _ => String::new(),
                    };
                    out.push_str(&format!(
                        "  [{}] {}{} {}\n",
                        msg.id,
                        format_timestamp(msg.timestamp),
                        sender,
                        body
                    ));
                }
            }
            Outcome::Error { kind, message } => {
                out.push_str(&format!("✗ {}: {}\n", kind, message));
            }
        }
    }

    if !report.notes.is_empty() {
        out.push('\n');
        for note in &report.notes {
            out.push_str(&format!("• {}\n", note));
        }
    }

    out
}
