//! Interaction state machine.
//!
//! Transport-neutral events go in, transport-neutral actions come out. The
//! teloxide layer in [`crate::bot`] converts updates into [`InboundEvent`]s
//! and executes the returned [`OutboundAction`]s, so the flows can be
//! exercised without Telegram.
//!
//! - `storage`: upload → describe/skip → persist, plus file browsing
//! - `cutout`: image → background choice → removal API → delivery, plus recompositing
//! - `pagination`: the stateless file list

pub mod cutout;
pub mod pagination;
pub mod storage;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::localization::LocalizationManager;
use crate::rate_limiter::RateLimiter;
use crate::session::{SessionStore, UserId};
use crate::store::UserProfile;

pub use cutout::{CutoutCoordinator, MediaFetcher};
pub use storage::StorageCoordinator;

/// Sender of an inbound event
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UserInfo {
    pub id: UserId,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub language_code: Option<String>,
}

impl UserInfo {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
        }
    }

    pub fn display_name(&self) -> String {
        self.first_name
            .clone()
            .or_else(|| self.username.clone())
            .unwrap_or_else(|| "there".to_string())
    }
}

/// Bot commands understood by both flows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    MyFiles,
    Stats,
    Cancel,
    Unknown(String),
}

impl Command {
    /// Parse `/name` or `/name@botname`, ignoring arguments
    pub fn parse(text: &str) -> Option<Self> {
        let word = text.trim().split_whitespace().next()?;
        let name = word.strip_prefix('/')?;
        let name = name.split('@').next().unwrap_or(name).to_lowercase();
        Some(match name.as_str() {
            "start" => Command::Start,
            "help" => Command::Help,
            "myfiles" | "files" => Command::MyFiles,
            "stats" => Command::Stats,
            "cancel" => Command::Cancel,
            _ => Command::Unknown(name),
        })
    }

    /// Cheap commands that bypass the rate limiter
    pub fn is_exempt_from_rate_limit(&self) -> bool {
        matches!(self, Command::Start | Command::Help | Command::Cancel)
    }
}

/// How the file arrived on Telegram
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Document,
    Photo,
    Video,
    Audio,
}

/// Metadata of an uploaded file; bytes are fetched on demand
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingFile {
    pub handle: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub size: u64,
    pub kind: MediaKind,
}

impl IncomingFile {
    /// Documents keep their declared name; photos, videos and audio are
    /// always named after their handle so they land in an allowed category
    pub fn display_name(&self) -> String {
        match self.kind {
            MediaKind::Photo => format!("photo_{}.jpg", self.handle),
            MediaKind::Video => format!("video_{}.mp4", self.handle),
            MediaKind::Audio => format!("audio_{}.mp3", self.handle),
            MediaKind::Document => self
                .file_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| format!("document_{}", self.handle)),
        }
    }

    /// Photos, and documents declaring an `image/*` mime type
    pub fn is_image(&self) -> bool {
        match self.kind {
            MediaKind::Photo => true,
            MediaKind::Document => self
                .mime_type
                .as_deref()
                .is_some_and(|mime| mime.starts_with("image/")),
            MediaKind::Video | MediaKind::Audio => false,
        }
    }
}

/// What a reply to a delivered cutout asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecompositeRequest {
    Color(String),
    Image(IncomingFile),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Command(Command),
    Upload(IncomingFile),
    Text(String),
    Callback { data: String, message_id: Option<i32> },
    /// Reply to a result document previously delivered by the bot
    ReplyToResult {
        result: IncomingFile,
        request: RecompositeRequest,
    },
    Unsupported,
}

impl EventKind {
    /// Metric label
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Command(_) => "command",
            EventKind::Upload(_) => "upload",
            EventKind::Text(_) => "text",
            EventKind::Callback { .. } => "callback",
            EventKind::ReplyToResult { .. } => "recomposite",
            EventKind::Unsupported => "unsupported",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEvent {
    pub user: UserInfo,
    pub chat_id: i64,
    pub kind: EventKind,
}

impl InboundEvent {
    pub fn language(&self) -> Option<&str> {
        self.user.language_code.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub data: String,
}

impl Button {
    pub fn new(label: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
        }
    }
}

/// Rows of inline buttons
pub type Keyboard = Vec<Vec<Button>>;

/// Something the transport must do on the event's chat
#[derive(Clone, PartialEq, Eq)]
pub enum OutboundAction {
    SendText {
        text: String,
        keyboard: Option<Keyboard>,
    },
    EditText {
        message_id: i32,
        text: String,
        keyboard: Option<Keyboard>,
    },
    /// Re-send a stored file by its transport handle
    SendStoredDocument { handle: String, caption: String },
    /// Upload new image bytes as a document so transparency survives
    SendImage {
        bytes: Vec<u8>,
        file_name: String,
        caption: String,
    },
}

impl std::fmt::Debug for OutboundAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutboundAction::SendText { text, keyboard } => f
                .debug_struct("SendText")
                .field("text", text)
                .field("keyboard", keyboard)
                .finish(),
            OutboundAction::EditText {
                message_id,
                text,
                keyboard,
            } => f
                .debug_struct("EditText")
                .field("message_id", message_id)
                .field("text", text)
                .field("keyboard", keyboard)
                .finish(),
            OutboundAction::SendStoredDocument { handle, caption } => f
                .debug_struct("SendStoredDocument")
                .field("handle", handle)
                .field("caption", caption)
                .finish(),
            OutboundAction::SendImage {
                bytes,
                file_name,
                caption,
            } => f
                .debug_struct("SendImage")
                .field("len", &bytes.len())
                .field("file_name", file_name)
                .field("caption", caption)
                .finish(),
        }
    }
}

impl OutboundAction {
    pub fn text(text: impl Into<String>) -> Self {
        OutboundAction::SendText {
            text: text.into(),
            keyboard: None,
        }
    }

    pub fn text_with_keyboard(text: impl Into<String>, keyboard: Keyboard) -> Self {
        OutboundAction::SendText {
            text: text.into(),
            keyboard: Some(keyboard),
        }
    }

    /// Edit the callback's message when known, otherwise send a new one
    pub fn edit_or_send(
        message_id: Option<i32>,
        text: impl Into<String>,
        keyboard: Option<Keyboard>,
    ) -> Self {
        match message_id {
            Some(message_id) => OutboundAction::EditText {
                message_id,
                text: text.into(),
                keyboard,
            },
            None => OutboundAction::SendText {
                text: text.into(),
                keyboard,
            },
        }
    }
}

/// A flow that turns one inbound event into outbound actions
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: InboundEvent) -> Vec<OutboundAction>;
}

/// State shared by both flows: sessions, rate windows, and message catalog
#[derive(Debug, Clone)]
pub struct FlowContext {
    pub sessions: Arc<SessionStore>,
    pub limiter: Arc<RateLimiter>,
    pub localization: Arc<LocalizationManager>,
    pub max_file_size: u64,
}

impl FlowContext {
    pub fn new(
        sessions: Arc<SessionStore>,
        limiter: Arc<RateLimiter>,
        localization: Arc<LocalizationManager>,
        max_file_size: u64,
    ) -> Self {
        Self {
            sessions,
            limiter,
            localization,
            max_file_size,
        }
    }

    pub fn t(&self, key: &str, event: &InboundEvent) -> String {
        self.localization.t(key, event.language())
    }

    pub fn t_args(&self, key: &str, args: &[(&str, String)], event: &InboundEvent) -> String {
        self.localization.t_args(key, args, event.language())
    }

    /// Rate-limit gate; `Some` carries the rejection reply.
    pub fn gate(&self, event: &InboundEvent) -> Option<Vec<OutboundAction>> {
        if let EventKind::Command(command) = &event.kind {
            if command.is_exempt_from_rate_limit() {
                return None;
            }
        }

        if self.limiter.admit(event.user.id, Instant::now()) {
            return None;
        }

        warn!(user_id = %event.user.id, kind = event.kind.label(), "Rate limit exceeded");
        crate::observability::record_rate_limited();
        let text = self.t_args(
            "rate-limited",
            &[
                ("limit", self.limiter.max_requests().to_string()),
                ("seconds", self.limiter.window().as_secs().to_string()),
            ],
            event,
        );
        Some(vec![OutboundAction::text(text)])
    }

    /// Drop any pending session on `/cancel`
    pub fn cancel(&self, event: &InboundEvent) -> Vec<OutboundAction> {
        match self.sessions.remove(event.user.id) {
            Some(session) => {
                debug!(
                    user_id = %event.user.id,
                    state = %session.state(),
                    "Session cancelled by user"
                );
                vec![OutboundAction::text(self.t("cancelled", event))]
            }
            None => vec![OutboundAction::text(self.t("nothing-to-cancel", event))],
        }
    }
}
