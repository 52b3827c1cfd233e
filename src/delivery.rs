use std::path::Path;

use tracing::{error, info};

use crate::model::Channel;
use crate::packager::Bundle;
use crate::session::ChatSession;
use crate::{AppError, Result};

/// Pick where bundles go: the configured archive channel, resolved fresh on
/// every call, or the source channel itself.
pub async fn resolve_destination(
    session: &dyn ChatSession,
    source: &Channel,
    archive_channel_id: Option<&str>,
) -> Result<Channel> {
    let Some(archive_id) = archive_channel_id else {
        return Ok(source.clone());
    };
    match source.guild_id.as_deref() {
        Some(guild_id) => session.fetch_guild_channel(guild_id, archive_id).await,
        None => session.fetch_channel(archive_id).await,
    }
}

/// Upload `bundle` and remove its transient files.
///
/// Cleanup only happens after a successful upload. A hard-limit rejection is
/// returned as-is; callers treat it as fatal.
pub async fn deliver(
    session: &dyn ChatSession,
    source: &Channel,
    archive_channel_id: Option<&str>,
    bundle: &Bundle,
) -> Result<()> {
    let destination = resolve_destination(session, source, archive_channel_id).await?;
    let caption = format!("Archive created at {}", bundle.stamp);

    if let Err(e) = session.send_file(&destination.id, &caption, &bundle.path).await {
        if e.is_hard_limit() {
            error!(error = %e, "archive rejected by platform limits");
        }
        return Err(e);
    }
    info!(
        channel = %destination.id,
        messages = bundle.message_count,
        "archive delivered"
    );

    remove_file(&bundle.path).await?;
    remove_file(&bundle.manifest_path).await?;
    Ok(())
}

async fn remove_file(path: &Path) -> Result<()> {
    tokio::fs::remove_file(path).await.map_err(|e| AppError::WriteFile {
        path: path.display().to_string(),
        source: e,
    })
}
