use tracing::info;

use crate::attachments::AttachmentStore;
use crate::model::Channel;
use crate::session::{ChatSession, MessagePage};
use crate::snapshot::{MessageSnapshot, snapshot_message};
use crate::Result;

pub const PAGE_SIZE: usize = 100;

/// Progress callback: messages snapshotted so far.
pub type ProgressCallback<'a> = Option<&'a (dyn Fn(usize) + Send + Sync)>;

#[derive(Debug, Default)]
pub struct BackfillOutcome {
    pub manifest: Vec<MessageSnapshot>,
    pub message_count: usize,
    pub pages: usize,
    /// Id of the most recent message seen, if any.
    pub newest_id: Option<String>,
}

/// Walk the whole history of `channel`, newest first, snapshotting every
/// message.
///
/// Pages are fetched strictly one after another; each page's messages are
/// fully snapshotted before the next page is requested.
pub async fn backfill(
    session: &dyn ChatSession,
    store: &AttachmentStore,
    channel: &Channel,
    progress: ProgressCallback<'_>,
) -> Result<BackfillOutcome> {
    info!(channel = %channel.id, "fetching historical messages");

    let mut outcome = BackfillOutcome::default();
    let mut last_id: Option<String> = None;

    loop {
        let request = MessagePage::before(PAGE_SIZE, last_id.clone());
        let page = session.fetch_messages(&channel.id, &request).await?;
        let Some(oldest) = page.last() else {
            break;
        };
        last_id = Some(oldest.id.clone());

        if outcome.newest_id.is_none() {
            outcome.newest_id = page.first().map(|m| m.id.clone());
        }

        for message in &page {
            snapshot_message(session, store, message, &mut outcome.manifest).await?;
            outcome.message_count += 1;
        }
        outcome.pages += 1;

        info!(messages = outcome.message_count, "processed messages so far");
        if let Some(cb) = progress {
            cb(outcome.message_count);
        }

        // A short page means the start of the channel was reached.
        if page.len() < PAGE_SIZE {
            break;
        }
    }

    info!(messages = outcome.message_count, "finished archiving history");
    Ok(outcome)
}
