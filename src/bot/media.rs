//! Downloading uploaded media from Telegram's file API.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::FileId;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::flow::MediaFetcher;

/// Fetches file bytes through `getFile` and the bot file endpoint
#[derive(Debug, Clone)]
pub struct TelegramMediaFetcher {
    bot: Bot,
    http: reqwest::Client,
    max_file_size: u64,
}

impl TelegramMediaFetcher {
    pub fn new(bot: Bot, http: reqwest::Client, max_file_size: u64) -> Self {
        Self {
            bot,
            http,
            max_file_size,
        }
    }
}

/// File URLs embed the bot token, so errors must never carry them
fn without_url(err: reqwest::Error) -> AppError {
    AppError::from(err.without_url())
}

/// GET `url`, refusing bodies declared larger than `max_file_size`
pub(crate) async fn download(
    http: &reqwest::Client,
    url: &str,
    max_file_size: u64,
) -> AppResult<Vec<u8>> {
    let response = http
        .get(url)
        .send()
        .await
        .and_then(|response| response.error_for_status())
        .map_err(without_url)?;

    if let Some(content_length) = response.content_length() {
        if content_length > max_file_size {
            return Err(AppError::Validation(format!(
                "File too large: {} bytes (maximum allowed: {} bytes)",
                content_length, max_file_size
            )));
        }
    }

    let bytes = response.bytes().await.map_err(without_url)?;
    Ok(bytes.to_vec())
}

#[async_trait]
impl MediaFetcher for TelegramMediaFetcher {
    async fn fetch(&self, handle: &str) -> AppResult<Vec<u8>> {
        let file = self
            .bot
            .get_file(FileId(handle.to_string()))
            .await
            .map_err(|e| AppError::Network(format!("getFile failed: {}", e)))?;

        let url = format!(
            "https://api.telegram.org/file/bot{}/{}",
            self.bot.token(),
            file.path
        );

        let bytes = download(&self.http, &url, self.max_file_size).await?;
        debug!(size_bytes = bytes.len(), "Downloaded file from Telegram");
        Ok(bytes)
    }
}
