//! `check-session`: prove a saved session still works end to end.

use tracing::warn;

use super::{probe_target, SAMPLE_LIMIT};
use crate::client::ChatClient;
use crate::error::Result;
use crate::messages::fetch_dialogs;
use crate::report::Report;

/// Public channel every account can read.
pub const PUBLIC_PROBE: &str = "@telegram";

/// Saved messages, the dialog list and a public channel, in that order.
pub async fn run<C: ChatClient + ?Sized>(client: &mut C, dialog_limit: usize) -> Result<Report> {
    let mut report = Report::new("check-session");

    report
        .targets
        .push(probe_target(client, "me", "saved messages", SAMPLE_LIMIT, 0).await?);

    match fetch_dialogs(client, dialog_limit).await {
        Ok(dialogs) => report.dialogs = dialogs,
        Err(err) if !err.is_fatal() => {
            warn!("Dialog listing failed: {}", err);
            report.note(format!("getDialogs failed: {}", err));
        }
        Err(err) => return Err(err),
    }

    report
        .targets
        .push(probe_target(client, PUBLIC_PROBE, "public channel", SAMPLE_LIMIT, 0).await?);

    if report.failures() == 0 {
        report.note("Session is valid.");
    } else {
        report.note(format!(
            "Session is valid, {} probe(s) failed.",
            report.failures()
        ));
    }
    Ok(report)
}
