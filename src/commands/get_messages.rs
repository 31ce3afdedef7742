//! `get-messages`: read one conversation, then repeat with the min-id filter.

use super::probe_conversation;
use crate::chat::resolve_entity;
use crate::client::ChatClient;
use crate::error::Result;
use crate::report::{Outcome, Report, TargetOutcome};

pub async fn run<C: ChatClient + ?Sized>(
    client: &mut C,
    target: &str,
    limit: usize,
    min_id: i32,
) -> Result<Report> {
    let mut report = Report::new("get-messages").detail_view();

    let conversation = match resolve_entity(client, target).await {
        Ok(conversation) => conversation,
        Err(err) if !err.is_fatal() => {
            report.targets.push(TargetOutcome {
                identifier: target.to_string(),
                label: "latest".to_string(),
                conversation: None,
                marked_id: None,
                subscribed: None,
                limit,
                min_id: 0,
                outcome: Outcome::from_error(&err),
            });
            return Ok(report);
        }
        Err(err) => return Err(err),
    };

    report
        .targets
        .push(probe_conversation(client, target, "latest", &conversation, limit, 0).await?);
    report.targets.push(
        probe_conversation(client, target, "min_id filter", &conversation, limit, min_id).await?,
    );
    Ok(report)
}
