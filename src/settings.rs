use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

pub const SETTINGS_FILE: &str = "archiver.toml";
pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";

/// What to do once the initial backfill has been delivered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveMode {
    /// Archive the history once and stop.
    #[default]
    Once,
    /// Archive the history, then keep archiving every new message.
    Follow,
}

impl std::str::FromStr for ArchiveMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "once" => Ok(ArchiveMode::Once),
            "follow" => Ok(ArchiveMode::Follow),
            other => Err(AppError::InvalidConfig(format!("unknown archive mode: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub discord: DiscordSettings,
    #[serde(default)]
    pub archive: ArchiveSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DiscordSettings {
    #[serde(default)]
    pub guild_id: Option<String>,
    #[serde(default)]
    pub target_channel_id: Option<String>,
    #[serde(default)]
    pub archive_channel_id: Option<String>,
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for DiscordSettings {
    fn default() -> Self {
        Self {
            guild_id: None,
            target_channel_id: None,
            archive_channel_id: None,
            api_base_url: default_api_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ArchiveSettings {
    #[serde(default = "default_archive_dir")]
    pub dir: PathBuf,
    #[serde(default)]
    pub mode: ArchiveMode,
    #[serde(default = "default_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_interval_secs")]
    pub presence_interval_secs: u64,
    #[serde(default)]
    pub halt_on_delivery_error: bool,
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            dir: default_archive_dir(),
            mode: ArchiveMode::default(),
            poll_interval_secs: default_interval_secs(),
            presence_interval_secs: default_interval_secs(),
            halt_on_delivery_error: false,
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("archives")
}

fn default_interval_secs() -> u64 {
    10
}

impl Settings {
    /// Load settings from `path`, or from `archiver.toml` in the working
    /// directory when no path is given. A missing default file yields the
    /// defaults; a missing explicit file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p, true),
            None => (Path::new(SETTINGS_FILE), false),
        };
        if !explicit && !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| AppError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| AppError::TomlParse(e.to_string()))
    }

    /// Overlay process environment variables.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|key| std::env::var(key).ok())
    }

    /// Overlay variables from `lookup`. Empty values count as unset.
    pub fn apply_vars<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("GUILD_ID") {
            self.discord.guild_id = Some(v);
        }
        if let Some(v) = get("TARGET_CHANNEL_ID") {
            self.discord.target_channel_id = Some(v);
        }
        if let Some(v) = get("ARCHIVE_CHANNEL_ID") {
            self.discord.archive_channel_id = Some(v);
        }
        if let Some(v) = get("ARCHIVE_DIR") {
            self.archive.dir = PathBuf::from(v);
        }
        if let Some(v) = get("ARCHIVE_MODE") {
            self.archive.mode = v.parse()?;
        }
        Ok(())
    }

    pub fn target_channel_id(&self) -> Result<&str> {
        self.discord
            .target_channel_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(AppError::MissingTargetChannel)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.discord.request_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.archive.poll_interval_secs.max(1))
    }

    pub fn presence_interval(&self) -> Duration {
        Duration::from_secs(self.archive.presence_interval_secs.max(1))
    }
}

pub fn load_token() -> Result<String> {
    std::env::var("DISCORD_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty())
        .ok_or(AppError::MissingToken)
}
