//! Background-removal flow: image → background choice → removal API → delivery.
//!
//! Replies to a delivered cutout are recomposited locally over a solid color
//! or a second image without touching the session store.

use async_trait::async_trait;
use image::Rgba;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::compositing::{composite_over_color, composite_over_image};
use crate::errors::{error_logging, AppResult};
use crate::file_policy::format_file_size;
use crate::palette::{parse_color, BackgroundChoice};
use crate::removal_api::{BackgroundRemover, RemovalError};
use crate::session::{InteractionState, PendingImage, PendingPayload, Session};

use super::{
    Button, Command, EventHandler, EventKind, FlowContext, InboundEvent, IncomingFile, Keyboard,
    OutboundAction, RecompositeRequest,
};

pub const RESULT_FILE_NAME: &str = "no_bg.png";
pub const COMPOSITE_FILE_NAME: &str = "composited.png";

const PALETTE_COLUMNS: usize = 3;

enum Canvas<'a> {
    Color(Rgba<u8>),
    Image(&'a str),
}

/// Downloads file bytes by transport handle
#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, handle: &str) -> AppResult<Vec<u8>>;
}

/// Palette keyboard, base colors first, three buttons per row
pub fn palette_keyboard() -> Keyboard {
    BackgroundChoice::all()
        .map(|choice| Button::new(choice.label(), choice.callback_data()))
        .collect::<Vec<_>>()
        .chunks(PALETTE_COLUMNS)
        .map(|row| row.to_vec())
        .collect()
}

/// Coordinator of the background-removal conversation
pub struct CutoutCoordinator<R, M> {
    ctx: FlowContext,
    remover: R,
    fetcher: M,
    api_timeout: Duration,
}

impl<R: BackgroundRemover, M: MediaFetcher> CutoutCoordinator<R, M> {
    pub fn new(ctx: FlowContext, remover: R, fetcher: M, api_timeout: Duration) -> Self {
        Self {
            ctx,
            remover,
            fetcher,
            api_timeout,
        }
    }

    pub fn context(&self) -> &FlowContext {
        &self.ctx
    }

    pub fn remover(&self) -> &R {
        &self.remover
    }

    pub fn fetcher(&self) -> &M {
        &self.fetcher
    }

    fn handle_command(&self, event: &InboundEvent, command: &Command) -> Vec<OutboundAction> {
        match command {
            Command::Start => vec![OutboundAction::text(self.ctx.t_args(
                "cutout-welcome",
                &[("name", event.user.display_name())],
                event,
            ))],
            Command::Help => vec![OutboundAction::text(self.ctx.t_args(
                "cutout-help",
                &[("max_size", format_file_size(self.ctx.max_file_size))],
                event,
            ))],
            Command::Cancel => self.ctx.cancel(event),
            Command::MyFiles | Command::Stats | Command::Unknown(_) => {
                vec![OutboundAction::text(self.ctx.t("cutout-unknown-command", event))]
            }
        }
    }

    fn too_large(&self, event: &InboundEvent, file: &IncomingFile) -> Option<Vec<OutboundAction>> {
        if file.size <= self.ctx.max_file_size {
            return None;
        }
        error_logging::log_validation_error(
            &format!(
                "image of {} bytes exceeds limit of {} bytes",
                file.size,
                self.ctx.max_file_size,
            ),
            "validate_image",
            Some(event.user.id),
            "image",
            file.file_name.as_deref(),
        );
        Some(vec![OutboundAction::text(self.ctx.t_args(
            "file-too-large",
            &[("max_size", format_file_size(self.ctx.max_file_size))],
            event,
        ))])
    }

    async fn fetch(
        &self,
        event: &InboundEvent,
        handle: &str,
    ) -> Result<Vec<u8>, Vec<OutboundAction>> {
        self.fetcher.fetch(handle).await.map_err(|e| {
            error_logging::log_network_error(&e, "fetch_media", None, Some(event.user.id));
            vec![OutboundAction::text(self.ctx.t("download-failed", event))]
        })
    }

    async fn handle_upload(
        &self,
        event: &InboundEvent,
        file: &IncomingFile,
    ) -> Vec<OutboundAction> {
        if !file.is_image() {
            return vec![OutboundAction::text(self.ctx.t("send-image-hint", event))];
        }
        if let Some(rejection) = self.too_large(event, file) {
            return rejection;
        }

        let bytes = match self.fetch(event, &file.handle).await {
            Ok(bytes) => bytes,
            Err(reply) => return reply,
        };

        let size = bytes.len();
        if let Some(previous) = self.ctx.sessions.put(
            event.user.id,
            Session::new(PendingPayload::BackgroundChoice(PendingImage { bytes })),
        ) {
            debug!(
                user_id = %event.user.id,
                previous_state = %previous.state(),
                "Replaced pending session with new image"
            );
        }
        info!(
            user_id = %event.user.id,
            image_size_bytes = size,
            "Image received, awaiting background choice"
        );

        vec![OutboundAction::text_with_keyboard(
            self.ctx.t("choose-background", event),
            palette_keyboard(),
        )]
    }

    async fn handle_choice(
        &self,
        event: &InboundEvent,
        choice: BackgroundChoice,
        message_id: Option<i32>,
    ) -> Vec<OutboundAction> {
        let image = match self.ctx.sessions.take_pending_image(event.user.id) {
            Ok(image) => image,
            Err(e) => {
                debug!(
                    user_id = %event.user.id,
                    choice = choice.name(),
                    error = %e,
                    "Background chosen without a pending image"
                );
                return vec![OutboundAction::edit_or_send(
                    message_id,
                    self.ctx.t("session-expired", event),
                    None,
                )];
            }
        };

        let image_size = image.bytes.len();
        let color = choice.api_color();
        let started = Instant::now();

        let result = match tokio::time::timeout(
            self.api_timeout,
            self.remover.remove_background(image.bytes, color.as_deref()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RemovalError::Timeout),
        };
        let duration = started.elapsed();

        match result {
            Ok(png) => {
                crate::observability::record_removal_api("success", duration);
                info!(
                    user_id = %event.user.id,
                    choice = choice.name(),
                    image_size_bytes = image_size,
                    result_size_bytes = png.len(),
                    duration_ms = %duration.as_millis(),
                    "Background removed"
                );
                vec![
                    OutboundAction::edit_or_send(
                        message_id,
                        self.ctx.t_args("removal-done", &[("background", choice.label())], event),
                        None,
                    ),
                    OutboundAction::SendImage {
                        bytes: png,
                        file_name: RESULT_FILE_NAME.to_string(),
                        caption: self.ctx.t("removal-result-caption", event),
                    },
                ]
            }
            Err(err) => {
                crate::observability::record_removal_api(err.outcome(), duration);
                error_logging::log_removal_error(&err, event.user.id, image_size, duration);
                vec![OutboundAction::edit_or_send(
                    message_id,
                    self.ctx.t(err.message_key(), event),
                    None,
                )]
            }
        }
    }

    async fn handle_recomposite(
        &self,
        event: &InboundEvent,
        result: &IncomingFile,
        request: &RecompositeRequest,
    ) -> Vec<OutboundAction> {
        // Validate the cheap part before any download
        let canvas = match request {
            RecompositeRequest::Color(text) => match parse_color(text) {
                Some(color) => Canvas::Color(color),
                None => {
                    error_logging::log_validation_error(
                        &"unrecognized color",
                        "parse_color",
                        Some(event.user.id),
                        "color",
                        Some(text),
                    );
                    return vec![OutboundAction::text(self.ctx.t("invalid-color", event))];
                }
            },
            RecompositeRequest::Image(background) => {
                if !background.is_image() {
                    return vec![OutboundAction::text(self.ctx.t("recomposite-hint", event))];
                }
                if let Some(rejection) = self.too_large(event, background) {
                    return rejection;
                }
                Canvas::Image(&background.handle)
            }
        };

        let foreground = match self.fetch(event, &result.handle).await {
            Ok(bytes) => bytes,
            Err(reply) => return reply,
        };

        let composited = match canvas {
            Canvas::Color(color) => composite_over_color(&foreground, color),
            Canvas::Image(handle) => {
                let background = match self.fetch(event, handle).await {
                    Ok(bytes) => bytes,
                    Err(reply) => return reply,
                };
                composite_over_image(&foreground, &background)
            }
        };

        match composited {
            Ok(png) => {
                info!(
                    user_id = %event.user.id,
                    result_size_bytes = png.len(),
                    "Cutout recomposited"
                );
                vec![OutboundAction::SendImage {
                    bytes: png,
                    file_name: COMPOSITE_FILE_NAME.to_string(),
                    caption: self.ctx.t("recomposite-caption", event),
                }]
            }
            Err(e) => {
                error_logging::log_internal_error(
                    &e,
                    "compositing",
                    "recomposite",
                    Some(event.user.id),
                );
                vec![OutboundAction::text(self.ctx.t("recomposite-failed", event))]
            }
        }
    }

    fn handle_text(&self, event: &InboundEvent) -> Vec<OutboundAction> {
        let key = match self.ctx.sessions.state(event.user.id) {
            InteractionState::AwaitingBackgroundChoice => "choose-background-hint",
            InteractionState::Idle | InteractionState::AwaitingDescription => "send-image-hint",
        };
        vec![OutboundAction::text(self.ctx.t(key, event))]
    }
}

#[async_trait]
impl<R: BackgroundRemover, M: MediaFetcher> EventHandler for CutoutCoordinator<R, M> {
    async fn handle(&self, event: InboundEvent) -> Vec<OutboundAction> {
        crate::observability::record_event(event.kind.label());
        if let Some(rejection) = self.ctx.gate(&event) {
            return rejection;
        }

        match &event.kind {
            EventKind::Command(command) => self.handle_command(&event, command),
            EventKind::Upload(file) => self.handle_upload(&event, file).await,
            EventKind::Text(_) => self.handle_text(&event),
            EventKind::Callback { data, message_id } => {
                match BackgroundChoice::from_callback(data) {
                    Some(choice) => self.handle_choice(&event, choice, *message_id).await,
                    None => {
                        warn!(user_id = %event.user.id, data = %data, "Unknown callback data");
                        vec![OutboundAction::text(self.ctx.t("unknown-action", &event))]
                    }
                }
            }
            EventKind::ReplyToResult { result, request } => {
                self.handle_recomposite(&event, result, request).await
            }
            EventKind::Unsupported => {
                vec![OutboundAction::text(self.ctx.t("send-image-hint", &event))]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_keyboard_layout() {
        let keyboard = palette_keyboard();
        assert_eq!(keyboard.len(), 5);
        assert!(keyboard.iter().all(|row| row.len() <= PALETTE_COLUMNS));
        assert_eq!(keyboard[0][0].data, "bg:white");
        assert_eq!(keyboard[0][2].data, "bg:transparent");
        assert_eq!(keyboard[4][0].data, "bg:navy");
    }
}
