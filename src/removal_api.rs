//! Client for the third-party background-removal HTTP API.
//!
//! The request is a multipart upload (`image_file`, `size=auto`, optional
//! `bg_color`) authenticated with an `X-Api-Key` header. Non-success
//! responses are mapped to a [`RemovalError`] by status class.

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::fmt;
use tracing::debug;

use crate::config::RemovalApiConfig;
use crate::errors::{AppError, AppResult};

/// Typed failure of a removal request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemovalError {
    /// Credits or rate quota exhausted (402, 429)
    QuotaExceeded,
    /// The API refused the image (400)
    BadRequest(String),
    /// Missing or invalid API key (401, 403)
    Unauthorized,
    /// No answer within the configured timeout
    Timeout,
    /// Anything else, including transport failures without a status
    Unknown { status: Option<u16>, detail: String },
}

impl RemovalError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RemovalError::QuotaExceeded => Some(402),
            RemovalError::BadRequest(_) => Some(400),
            RemovalError::Unauthorized => Some(401),
            RemovalError::Timeout => None,
            RemovalError::Unknown { status, .. } => *status,
        }
    }

    /// Localization key of the user-facing reason
    pub fn message_key(&self) -> &'static str {
        match self {
            RemovalError::QuotaExceeded => "removal-error-quota",
            RemovalError::BadRequest(_) => "removal-error-bad-request",
            RemovalError::Unauthorized => "removal-error-unauthorized",
            RemovalError::Timeout => "removal-error-timeout",
            RemovalError::Unknown { .. } => "removal-error-unknown",
        }
    }

    /// Short label used for metrics
    pub fn outcome(&self) -> &'static str {
        match self {
            RemovalError::QuotaExceeded => "quota_exceeded",
            RemovalError::BadRequest(_) => "bad_request",
            RemovalError::Unauthorized => "unauthorized",
            RemovalError::Timeout => "timeout",
            RemovalError::Unknown { .. } => "unknown",
        }
    }

    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RemovalError::Timeout
        } else {
            RemovalError::Unknown {
                status: err.status().map(|s| s.as_u16()),
                detail: err.to_string(),
            }
        }
    }
}

impl fmt::Display for RemovalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemovalError::QuotaExceeded => write!(f, "API quota exceeded (HTTP 402)"),
            RemovalError::BadRequest(detail) => write!(f, "bad request (HTTP 400): {}", detail),
            RemovalError::Unauthorized => write!(f, "API key rejected (HTTP 401/403)"),
            RemovalError::Timeout => write!(f, "request timed out"),
            RemovalError::Unknown {
                status: Some(status),
                detail,
            } => write!(f, "unexpected HTTP {}: {}", status, detail),
            RemovalError::Unknown {
                status: None,
                detail,
            } => write!(f, "request failed: {}", detail),
        }
    }
}

impl std::error::Error for RemovalError {}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorItem {
    title: String,
}

/// Pull the first error title out of an API error body, or fall back to the raw text.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.errors.into_iter().next())
        .map(|item| item.title)
        .unwrap_or_else(|| body.chars().take(200).collect())
}

/// Map a non-success status (and its body) to a typed failure
pub fn classify_status(status: StatusCode, body: &str) -> RemovalError {
    match status.as_u16() {
        402 | 429 => RemovalError::QuotaExceeded,
        400 => RemovalError::BadRequest(error_detail(body)),
        401 | 403 => RemovalError::Unauthorized,
        408 | 504 => RemovalError::Timeout,
        other => RemovalError::Unknown {
            status: Some(other),
            detail: error_detail(body),
        },
    }
}

/// Anything able to strip the background off an image
#[async_trait]
pub trait BackgroundRemover: Send + Sync {
    /// `bg_color` is a hex value without `#`; `None` keeps transparency.
    async fn remove_background(
        &self,
        image: Vec<u8>,
        bg_color: Option<&str>,
    ) -> Result<Vec<u8>, RemovalError>;
}

/// reqwest-backed client for remove.bg compatible endpoints
#[derive(Debug, Clone)]
pub struct RemovalClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
}

impl RemovalClient {
    pub fn new(config: &RemovalApiConfig) -> AppResult<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| AppError::Config("REMOVE_BG_API_KEY is not set".to_string()))?;

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key,
        })
    }
}

#[async_trait]
impl BackgroundRemover for RemovalClient {
    async fn remove_background(
        &self,
        image: Vec<u8>,
        bg_color: Option<&str>,
    ) -> Result<Vec<u8>, RemovalError> {
        let image_len = image.len();
        let mut form = Form::new()
            .part("image_file", Part::bytes(image).file_name("image.jpg"))
            .text("size", "auto");
        if let Some(color) = bg_color {
            form = form.text("bg_color", color.to_string());
        }

        debug!(
            endpoint = %self.endpoint,
            image_size_bytes = image_len,
            bg_color = ?bg_color,
            "Calling background removal API"
        );

        let response = self
            .http
            .post(&self.endpoint)
            .header("X-Api-Key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(RemovalError::from_transport)?;

        let status = response.status();
        if status.is_success() {
            let bytes = response
                .bytes()
                .await
                .map_err(RemovalError::from_transport)?;
            Ok(bytes.to_vec())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(classify_status(status, &body))
        }
    }
}
