//! In-memory [`ChatSession`] for tests.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use futures::StreamExt;

use crate::model::{Attachment, Channel, Message, User, compare_ids};
use crate::session::{ByteStream, ChatSession, MessagePage};
use crate::status::Presence;
use crate::{AppError, Result};

/// What an upload looked like at the moment it was sent.
#[derive(Debug, Clone)]
pub struct SentFile {
    pub channel_id: String,
    pub content: String,
    pub file_name: String,
    pub entries: Vec<String>,
    pub manifest: Option<serde_json::Value>,
}

#[derive(Default)]
pub struct FakeSession {
    pub channels: HashMap<String, Channel>,
    /// Every message, kept newest first.
    pub history: Mutex<Vec<Message>>,
    pub files: HashMap<String, (Vec<u8>, Duration)>,
    pub page_requests: Mutex<Vec<MessagePage>>,
    pub downloads: Mutex<Vec<String>>,
    pub sent: Mutex<Vec<SentFile>>,
    pub presences: Mutex<Vec<Presence>>,
    pub send_error: Mutex<Option<(u16, Option<u64>, String)>>,
}

impl FakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channel(mut self, id: &str, guild_id: &str) -> Self {
        self.channels.insert(
            id.to_string(),
            Channel {
                id: id.to_string(),
                guild_id: Some(guild_id.to_string()),
                name: Some(format!("channel-{}", id)),
            },
        );
        self
    }

    pub fn with_history(self, messages: Vec<Message>) -> Self {
        self.push_messages(messages);
        self
    }

    pub fn with_file(mut self, url: &str, data: &[u8], delay: Duration) -> Self {
        self.files.insert(url.to_string(), (data.to_vec(), delay));
        self
    }

    pub fn push_messages(&self, messages: Vec<Message>) {
        if let Ok(mut history) = self.history.lock() {
            history.extend(messages);
            history.sort_by(|a, b| compare_ids(&b.id, &a.id));
        }
    }

    pub fn fail_sends_with(&self, status: u16, code: Option<u64>, message: &str) {
        if let Ok(mut e) = self.send_error.lock() {
            *e = Some((status, code, message.to_string()));
        }
    }

    pub fn page_count(&self) -> usize {
        self.page_requests.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn download_count(&self) -> usize {
        self.downloads.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn sent_files(&self) -> Vec<SentFile> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ChatSession for FakeSession {
    async fn ready(&self) -> Result<User> {
        Ok(user("0", "archiver"))
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<Channel> {
        self.channels
            .get(channel_id)
            .cloned()
            .ok_or_else(|| AppError::Platform {
                status: 404,
                code: Some(10003),
                message: "Unknown Channel".to_string(),
            })
    }

    async fn fetch_guild_channel(&self, guild_id: &str, channel_id: &str) -> Result<Channel> {
        let channel = self.fetch_channel(channel_id).await?;
        if channel.guild_id.as_deref() != Some(guild_id) {
            return Err(AppError::ChannelNotInGuild {
                channel_id: channel_id.to_string(),
                guild_id: guild_id.to_string(),
            });
        }
        Ok(channel)
    }

    async fn fetch_messages(&self, channel_id: &str, page: &MessagePage) -> Result<Vec<Message>> {
        if let Ok(mut requests) = self.page_requests.lock() {
            requests.push(page.clone());
        }
        let history = self
            .history
            .lock()
            .map_err(|e| AppError::Task(e.to_string()))?;
        let in_channel = history.iter().filter(|m| m.channel_id == channel_id);

        let page: Vec<Message> = match (&page.before, &page.after) {
            (Some(before), _) => in_channel
                .filter(|m| compare_ids(&m.id, before).is_lt())
                .take(page.limit)
                .cloned()
                .collect(),
            (None, Some(after)) => {
                let mut newer: Vec<Message> = in_channel
                    .filter(|m| compare_ids(&m.id, after).is_gt())
                    .cloned()
                    .collect();
                // The oldest `limit` messages after the cursor, newest first.
                let keep = newer.len().saturating_sub(page.limit);
                newer.drain(..keep);
                newer
            }
            (None, None) => in_channel.take(page.limit).cloned().collect(),
        };
        Ok(page)
    }

    async fn download(&self, url: &str) -> Result<ByteStream> {
        if let Ok(mut downloads) = self.downloads.lock() {
            downloads.push(url.to_string());
        }
        let (data, delay) = self
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| AppError::Http(format!("404 for {}", url)))?;
        tokio::time::sleep(delay).await;

        let chunks: Vec<Result<Bytes>> = data
            .chunks(4)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(futures::stream::iter(chunks).boxed())
    }

    async fn send_file(&self, channel_id: &str, content: &str, file: &Path) -> Result<()> {
        if let Some((status, code, message)) = self
            .send_error
            .lock()
            .map_err(|e| AppError::Task(e.to_string()))?
            .clone()
        {
            return Err(AppError::Platform {
                status,
                code,
                message,
            });
        }

        let reader = std::fs::File::open(file)?;
        let mut archive = zip::ZipArchive::new(reader)?;
        let entries: Vec<String> = archive.file_names().map(str::to_string).collect();
        let manifest = match archive.by_name("messages.json") {
            Ok(mut entry) => {
                let mut text = String::new();
                entry.read_to_string(&mut text)?;
                serde_json::from_str(&text).ok()
            }
            Err(_) => None,
        };

        if let Ok(mut sent) = self.sent.lock() {
            sent.push(SentFile {
                channel_id: channel_id.to_string(),
                content: content.to_string(),
                file_name: file
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                entries,
                manifest,
            });
        }
        Ok(())
    }

    async fn update_presence(&self, presence: &Presence) -> Result<()> {
        if let Ok(mut presences) = self.presences.lock() {
            presences.push(presence.clone());
        }
        Ok(())
    }
}

pub fn user(id: &str, username: &str) -> User {
    User {
        id: id.to_string(),
        username: username.to_string(),
        discriminator: Some("0".to_string()),
        global_name: None,
    }
}

pub fn timestamp(secs: i64) -> DateTime<chrono::FixedOffset> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0)
        .single()
        .unwrap_or_default()
        .fixed_offset()
}

pub fn message(id: u64, channel_id: &str, content: &str) -> Message {
    Message {
        id: id.to_string(),
        channel_id: channel_id.to_string(),
        guild_id: None,
        content: content.to_string(),
        author: user("7", "alice"),
        timestamp: timestamp(id as i64),
        attachments: Vec::new(),
    }
}

pub fn attachment(id: &str, filename: &str) -> Attachment {
    Attachment {
        id: id.to_string(),
        filename: filename.to_string(),
        url: format!("https://cdn.test/{}/{}", id, filename),
        content_type: Some("application/octet-stream".to_string()),
        size: 4,
    }
}

/// `count` messages with ids `1..=count` in `channel_id`.
pub fn history(count: u64, channel_id: &str) -> Vec<Message> {
    (1..=count)
        .map(|id| message(id, channel_id, &format!("message {}", id)))
        .collect()
}
