//! `test-retrieval`: sample messages from the first few dialogs.

use super::{probe_conversation, SAMPLE_LIMIT};
use crate::client::ChatClient;
use crate::error::Result;
use crate::messages::fetch_dialogs;
use crate::report::Report;

/// List `dialog_limit` dialogs, then fetch from the first `sample` of them
/// twice: unfiltered and with `min_id = 1`.
pub async fn run<C: ChatClient + ?Sized>(
    client: &mut C,
    dialog_limit: usize,
    sample: usize,
) -> Result<Report> {
    let mut report = Report::new("test-retrieval");
    match fetch_dialogs(client, dialog_limit).await {
        Ok(dialogs) => report.dialogs = dialogs,
        Err(err) if !err.is_fatal() => {
            report.note(format!("getDialogs failed: {}", err));
            return Ok(report);
        }
        Err(err) => return Err(err),
    }

    let sampled: Vec<_> = report
        .dialogs
        .iter()
        .take(sample)
        .map(|d| d.conversation.clone())
        .collect();

    for conversation in &sampled {
        let identifier = conversation.id.to_string();
        report.targets.push(
            probe_conversation(client, &identifier, "unfiltered", conversation, SAMPLE_LIMIT, 0)
                .await?,
        );
        report.targets.push(
            probe_conversation(client, &identifier, "min_id=1", conversation, SAMPLE_LIMIT, 1)
                .await?,
        );
    }

    if sampled.is_empty() {
        report.note("No dialogs to sample.");
    }
    Ok(report)
}
