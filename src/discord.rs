//! REST implementation of [`ChatSession`] against the Discord HTTP API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use crate::model::{Channel, Message, User};
use crate::session::{ByteStream, ChatSession, MessagePage};
use crate::status::Presence;
use crate::{AppError, Result};

/// Attempts made after a 429 before the rate limit is reported as an error.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// Error body returned by the API on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<u64>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    retry_after: Option<f64>,
}

pub struct DiscordSession {
    client: Client,
    base_url: String,
    token: String,
}

impl DiscordSession {
    /// `timeout` bounds connecting and each wait for more response data. A
    /// slow transfer that keeps making progress is never cut off.
    pub fn new(base_url: &str, token: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(timeout)
            .read_timeout(timeout)
            .user_agent(concat!("channel-archiver/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::with_client(client, base_url, token))
    }

    pub fn with_client(client: Client, base_url: &str, token: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn api_url(&self, path: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&raw).map_err(|e| AppError::InvalidConfig(format!("bad API URL {}: {}", raw, e)))
    }

    fn authorization(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Send the request built by `build`, waiting out 429 responses the way
    /// the platform asks to, up to [`MAX_RATE_LIMIT_RETRIES`] times.
    async fn send_with_retry<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> Result<RequestBuilder> + Send,
    {
        let mut attempt = 0;
        loop {
            let response = build()?.send().await?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS
                || attempt >= MAX_RATE_LIMIT_RETRIES
            {
                return check_response(response).await;
            }

            let body = response.text().await.unwrap_or_default();
            let delay = retry_after(&body);
            attempt += 1;
            warn!(
                attempt,
                delay_ms = delay.as_millis() as u64,
                "rate limited, retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T> {
        debug!(%url, "GET");
        let response = self
            .send_with_retry(|| {
                Ok(self
                    .client
                    .get(url.clone())
                    .header(reqwest::header::AUTHORIZATION, self.authorization()))
            })
            .await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| AppError::JsonParse(e.to_string()))
    }
}

/// Build the history URL for `page` under `base`.
pub fn messages_url(base: Url, page: &MessagePage) -> Url {
    let mut url = base;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("limit", &page.limit.to_string());
        if let Some(before) = &page.before {
            query.append_pair("before", before);
        }
        if let Some(after) = &page.after {
            query.append_pair("after", after);
        }
    }
    url
}

async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(api_error(status, &body))
}

/// Delay requested by a 429 body, one second when it names none.
pub fn retry_after(body: &str) -> Duration {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|b| b.retry_after)
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
        .unwrap_or(Duration::from_secs(1))
}

/// Turn a failed response into an [`AppError`], keeping the platform's
/// machine-readable code when the body carries one.
pub fn api_error(status: StatusCode, body: &str) -> AppError {
    let parsed: Option<ApiErrorBody> = serde_json::from_str(body).ok();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = parsed
            .as_ref()
            .and_then(|b| b.retry_after)
            .map(|s| s.ceil() as u64)
            .unwrap_or(1);
        warn!(retry_after_secs, "Discord API rate limit hit");
        return AppError::RateLimited { retry_after_secs };
    }

    match parsed {
        Some(b) => AppError::Platform {
            status: status.as_u16(),
            code: b.code,
            message: b.message.unwrap_or_else(|| body.to_string()),
        },
        None => AppError::Platform {
            status: status.as_u16(),
            code: None,
            message: body.to_string(),
        },
    }
}

#[async_trait]
impl ChatSession for DiscordSession {
    async fn ready(&self) -> Result<User> {
        let url = self.api_url("users/@me")?;
        self.get_json(url).await
    }

    async fn fetch_channel(&self, channel_id: &str) -> Result<Channel> {
        let url = self.api_url(&format!("channels/{}", channel_id))?;
        self.get_json(url).await
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
        let base = self.api_url(&format!("channels/{}/messages", channel_id))?;
        self.get_json(messages_url(base, page)).await
    }

    async fn download(&self, url: &str) -> Result<ByteStream> {
        // CDN URLs are signed; no authorization header.
        let response = self.send_with_retry(|| Ok(self.client.get(url))).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(AppError::from))
            .boxed())
    }

    async fn send_file(&self, channel_id: &str, content: &str, file: &Path) -> Result<()> {
        let url = self.api_url(&format!("channels/{}/messages", channel_id))?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "archive.zip".to_string());
        let data = tokio::fs::read(file).await.map_err(|e| AppError::ReadFile {
            path: file.display().to_string(),
            source: e,
        })?;

        let payload = json!({
            "content": content,
            "attachments": [{ "id": 0, "filename": file_name }],
        })
        .to_string();

        debug!(channel_id, file = %file.display(), "uploading file");
        // A multipart form is consumed by sending, so each attempt builds its own.
        self.send_with_retry(|| {
            let file_part = reqwest::multipart::Part::bytes(data.clone())
                .file_name(file_name.clone())
                .mime_str("application/zip")?;
            let form = reqwest::multipart::Form::new()
                .text("payload_json", payload.clone())
                .part("files[0]", file_part);
            Ok(self
                .client
                .post(url.clone())
                .header(reqwest::header::AUTHORIZATION, self.authorization())
                .multipart(form))
        })
        .await?;
        Ok(())
    }

    async fn update_presence(&self, presence: &Presence) -> Result<()> {
        // Presence is a gateway feature; over REST it is only reported.
        info!(
            activity = %presence.activity,
            status = presence.status.as_str(),
            "presence"
        );
        Ok(())
    }
}
