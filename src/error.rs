use std::io;
use thiserror::Error;

/// Platform error code reported when a single send carries more than the
/// platform accepts. Nothing retried afterwards can succeed.
pub const HARD_LIMIT_CODE: u64 = 40005;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("DISCORD_TOKEN environment variable not set")]
    MissingToken,

    #[error("TARGET_CHANNEL_ID is not set")]
    MissingTargetChannel,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Discord API error (HTTP {status}, code {code:?}): {message}")]
    Platform {
        status: u16,
        code: Option<u64>,
        message: String,
    },

    #[error("Discord rate limit error: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("channel {channel_id} does not belong to guild {guild_id}")]
    ChannelNotInGuild { channel_id: String, guild_id: String },

    #[error("failed to read file at {path}: {source}")]
    ReadFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write file at {path}: {source}")]
    WriteFile {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("JSON serialization error: {0}")]
    JsonSerialize(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),

    #[error("TOML parse error: {0}")]
    TomlParse(String),

    #[error("archive error: {0}")]
    Archive(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl AppError {
    /// True when the platform refused a send for exceeding its hard limits.
    pub fn is_hard_limit(&self) -> bool {
        matches!(
            self,
            AppError::Platform {
                code: Some(HARD_LIMIT_CODE),
                ..
            }
        )
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Http(e.to_string())
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(e: zip::result::ZipError) -> Self {
        AppError::Archive(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
