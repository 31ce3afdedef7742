//! Bounded message and dialog retrieval

use std::cmp::Reverse;

use tracing::{debug, warn};

use crate::client::{ChatClient, ConversationRef, DialogSummary, MessageQuery, MessageRecord};
use crate::error::{Error, Result};

/// Fetch up to `limit` records from `conversation`, newest first.
///
/// With `min_id > 0` only records with `id > min_id` are kept. One round
/// trip; callers page by re-issuing with a higher `min_id`.
pub async fn fetch_messages<C: ChatClient + ?Sized>(
    client: &mut C,
    conversation: &ConversationRef,
    limit: usize,
    min_id: i32,
) -> Result<Vec<MessageRecord>> {
    if limit == 0 {
        return Err(Error::InvalidArgument("limit must be positive".into()));
    }
    if min_id < 0 {
        return Err(Error::InvalidArgument("min_id must not be negative".into()));
    }

    let query = MessageQuery { limit, min_id };
    let records = client
        .get_messages(conversation, query)
        .await
        .map_err(|err| {
            warn!("Fetching messages from {} failed: {}", conversation, err);
            Error::fetch_failed(&conversation.display_name, err)
        })?;

    let records = shape_batch(records, query);
    debug!(
        "Fetched {} messages from {} (limit={}, min_id={})",
        records.len(),
        conversation,
        limit,
        min_id
    );
    Ok(records)
}

/// Enforce the min-id filter, newest-first order and the size cap.
fn shape_batch(mut records: Vec<MessageRecord>, query: MessageQuery) -> Vec<MessageRecord> {
    if query.min_id > 0 {
        records.retain(|msg| msg.id > query.min_id);
    }
    records.sort_by_key(|msg| Reverse(msg.id));
    records.dedup_by_key(|msg| msg.id);
    records.truncate(query.limit);
    records
}

/// Fetch the first `limit` dialogs.
pub async fn fetch_dialogs<C: ChatClient + ?Sized>(
    client: &mut C,
    limit: usize,
) -> Result<Vec<DialogSummary>> {
    if limit == 0 {
        return Err(Error::InvalidArgument("limit must be positive".into()));
    }

    let mut dialogs = client.get_dialogs(limit).await.map_err(|err| {
        warn!("Fetching dialogs failed: {}", err);
        Error::fetch_failed("dialogs", err)
    })?;
    dialogs.truncate(limit);
    Ok(dialogs)
}
