//! Platform-side types as returned by the chat platform's REST API.

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

/// A text channel, optionally inside a guild.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl Channel {
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("unknown")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub global_name: Option<String>,
}

impl User {
    /// `username#discriminator`, or just the username for accounts migrated
    /// to unique usernames (discriminator `"0"`).
    pub fn tag(&self) -> String {
        match self.discriminator.as_deref() {
            Some(d) if !d.is_empty() && d != "0" => format!("{}#{}", self.username, d),
            _ => self.username.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub content: String,
    pub author: User,
    pub timestamp: DateTime<FixedOffset>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// Orders platform ids numerically. Ids are snowflakes, so a larger id is a
/// newer message; non-numeric ids fall back to string order.
pub fn compare_ids(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.len().cmp(&b.len()).then_with(|| a.cmp(b)),
    }
}
