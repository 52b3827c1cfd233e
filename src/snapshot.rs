use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::attachments::AttachmentStore;
use crate::model::Message;
use crate::session::ChatSession;
use crate::Result;

/// One archived message as written to `messages.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageSnapshot {
    pub id: String,
    pub content: String,
    pub author: AuthorSnapshot,
    #[serde(with = "millis_timestamp")]
    pub timestamp: DateTime<Utc>,
    pub attachments: Vec<AttachmentRef>,
}

/// UTC instants written with exactly three fractional digits
/// (`2024-01-02T03:04:05.000Z`); any RFC 3339 form is read back.
mod millis_timestamp {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(&value.format(FORMAT))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorSnapshot {
    pub id: String,
    pub username: String,
    pub tag: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentRef {
    pub id: String,
    pub name: String,
    pub file_name: String,
    pub content_type: Option<String>,
    pub size: u64,
}

/// Materialize every attachment of `message` and append its snapshot to
/// `manifest`.
///
/// Downloads run concurrently; the resulting references keep the order the
/// platform listed the attachments in.
pub async fn snapshot_message(
    session: &dyn ChatSession,
    store: &AttachmentStore,
    message: &Message,
    manifest: &mut Vec<MessageSnapshot>,
) -> Result<()> {
    let file_names = try_join_all(
        message
            .attachments
            .iter()
            .map(|attachment| store.materialize(session, attachment)),
    )
    .await?;

    let attachments = message
        .attachments
        .iter()
        .zip(file_names)
        .map(|(attachment, file_name)| AttachmentRef {
            id: attachment.id.clone(),
            name: attachment.filename.clone(),
            file_name,
            content_type: attachment.content_type.clone(),
            size: attachment.size,
        })
        .collect();

    manifest.push(MessageSnapshot {
        id: message.id.clone(),
        content: message.content.clone(),
        author: AuthorSnapshot {
            id: message.author.id.clone(),
            username: message.author.username.clone(),
            tag: message.author.tag(),
        },
        timestamp: message.timestamp.with_timezone(&Utc),
        attachments,
    });
    Ok(())
}
