//! `generate-session`: interactive login from scratch.

use crate::client::SessionToken;
use crate::error::{Error, Result};
use crate::report::Report;

/// Build the report carrying the freshly exported session token.
pub fn run(session: Option<&SessionToken>) -> Result<Report> {
    let token = session
        .filter(|token| !token.is_empty())
        .ok_or_else(|| Error::PostAuthVerificationFailed("no session was exported".into()))?;

    let mut report = Report::new("generate-session");
    report.with_session(token);
    report.note("The session string grants full access to the account. Keep it private.");
    report.note("Later runs reuse it through TELEGRAM_SESSION and skip the login.");
    Ok(report)
}
