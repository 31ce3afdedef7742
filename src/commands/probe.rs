//! `probe`: run the locate + fetch diagnostic over several identifiers.

use tracing::info;

use super::{annotate_subscription, probe_target};
use crate::client::ChatClient;
use crate::error::{Error, Result};
use crate::report::Report;

/// Targets are handled one after another; a failing target is recorded and
/// the next one still runs. Located targets are also checked against the
/// account's dialogs.
pub async fn run<C: ChatClient + ?Sized>(
    client: &mut C,
    targets: &[String],
    limit: usize,
    min_id: i32,
) -> Result<Report> {
    if targets.is_empty() {
        return Err(Error::InvalidArgument("no targets to probe".into()));
    }

    let mut report = Report::new("probe");
    for (idx, target) in targets.iter().enumerate() {
        info!("Probing {}/{}: {}", idx + 1, targets.len(), target);
        let mut outcome = probe_target(client, target, "probe", limit, min_id).await?;
        annotate_subscription(client, &mut report, &mut outcome).await;
        report.targets.push(outcome);
    }

    report.note(format!(
        "{} of {} targets succeeded.",
        targets.len() - report.failures(),
        targets.len()
    ));
    Ok(report)
}
