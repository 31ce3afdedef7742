//! `chat-info`: entity details, subscription state and the latest messages.

use super::{annotate_subscription, probe_target, SAMPLE_LIMIT};
use crate::client::ChatClient;
use crate::error::Result;
use crate::report::Report;

pub async fn run<C: ChatClient + ?Sized>(client: &mut C, target: &str) -> Result<Report> {
    let mut report = Report::new("chat-info").detail_view();

    let mut outcome = probe_target(client, target, "details", SAMPLE_LIMIT, 0).await?;
    outcome.marked_id = outcome.conversation.as_ref().map(|c| c.marked_id());
    annotate_subscription(client, &mut report, &mut outcome).await;
    if let Some(marked) = outcome.marked_id {
        report.note(format!("Use {} as the chat id in bot APIs and sync tables.", marked));
    }
    report.targets.push(outcome);
    Ok(report)
}
