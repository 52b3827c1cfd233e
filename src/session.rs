use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::model::{Channel, Message, User};
use crate::status::Presence;
use crate::Result;

/// A byte stream for one remote file.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// Page request against a channel's history.
///
/// `before` and `after` are exclusive message-id cursors; leaving both unset
/// yields the most recent page.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessagePage {
    pub limit: usize,
    pub before: Option<String>,
    pub after: Option<String>,
}

impl MessagePage {
    pub fn before(limit: usize, before: Option<String>) -> Self {
        Self {
            limit,
            before,
            after: None,
        }
    }

    pub fn after(limit: usize, after: String) -> Self {
        Self {
            limit,
            before: None,
            after: Some(after),
        }
    }
}

/// Explicit handle on the chat platform, passed to every component that
/// needs to resolve channels, read history or send files.
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Verify the credential and return the account the session acts as.
    async fn ready(&self) -> Result<User>;

    async fn fetch_channel(&self, channel_id: &str) -> Result<Channel>;

    /// Resolve a channel that must live inside `guild_id`.
    async fn fetch_guild_channel(&self, guild_id: &str, channel_id: &str) -> Result<Channel>;

    /// Messages are returned newest first.
    async fn fetch_messages(&self, channel_id: &str, page: &MessagePage) -> Result<Vec<Message>>;

    /// Open a download stream for an attachment URL.
    async fn download(&self, url: &str) -> Result<ByteStream>;

    /// Post `content` with `file` attached to a channel.
    async fn send_file(&self, channel_id: &str, content: &str, file: &Path) -> Result<()>;

    async fn update_presence(&self, presence: &Presence) -> Result<()>;
}
