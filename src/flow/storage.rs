//! File-storage flow: upload → describe or skip → persist, plus browsing.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::errors::error_logging;
use crate::file_policy::{format_file_size, validate_upload, FileCategory, UploadRejection};
use crate::session::{PendingFile, PendingPayload, Session};
use crate::store::{FileStore, NewFile};

use super::pagination::{
    parse_callback_id, render_files_page, DELETE_CALLBACK_PREFIX, DOWNLOAD_CALLBACK_PREFIX,
    PAGE_CALLBACK_PREFIX,
};
use super::{
    Button, Command, EventHandler, EventKind, FlowContext, InboundEvent, IncomingFile,
    OutboundAction, RecompositeRequest,
};

pub const SKIP_DESCRIPTION_CALLBACK: &str = "skip_description";

/// Coordinator of the file-storage conversation
pub struct StorageCoordinator<S> {
    ctx: FlowContext,
    store: S,
}

impl<S: FileStore> StorageCoordinator<S> {
    pub fn new(ctx: FlowContext, store: S) -> Self {
        Self { ctx, store }
    }

    pub fn context(&self) -> &FlowContext {
        &self.ctx
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn upsert_user(&self, event: &InboundEvent) {
        if let Err(e) = self.store.upsert_user(&event.user.profile()).await {
            // The upload itself does not depend on the profile row
            error_logging::log_database_error(&e, "upsert_user", Some(event.user.id), None);
        }
    }

    async fn handle_command(&self, event: &InboundEvent, command: &Command) -> Vec<OutboundAction> {
        match command {
            Command::Start => {
                self.upsert_user(event).await;
                vec![OutboundAction::text(self.ctx.t_args(
                    "storage-welcome",
                    &[("name", event.user.display_name())],
                    event,
                ))]
            }
            Command::Help => vec![OutboundAction::text(self.ctx.t_args(
                "storage-help",
                &[("max_size", format_file_size(self.ctx.max_file_size))],
                event,
            ))],
            Command::MyFiles => self.show_files(event, 1, None).await,
            Command::Stats => self.show_stats(event).await,
            Command::Cancel => self.ctx.cancel(event),
            Command::Unknown(_) => {
                vec![OutboundAction::text(self.ctx.t("storage-unknown-command", event))]
            }
        }
    }

    async fn handle_upload(
        &self,
        event: &InboundEvent,
        file: &IncomingFile,
    ) -> Vec<OutboundAction> {
        self.upsert_user(event).await;

        let file_name = file.display_name();
        let category = match validate_upload(&file_name, file.size, self.ctx.max_file_size) {
            Ok(category) => category,
            Err(rejection) => {
                error_logging::log_validation_error(
                    &rejection,
                    "validate_upload",
                    Some(event.user.id),
                    "file",
                    Some(&file_name),
                );
                return vec![OutboundAction::text(self.rejection_message(event, &rejection))];
            }
        };

        let pending = PendingFile {
            handle: file.handle.clone(),
            file_name: file_name.clone(),
            file_type: file
                .mime_type
                .clone()
                .unwrap_or_else(|| category.as_str().to_string()),
            size: file.size,
        };

        if let Some(previous) = self
            .ctx
            .sessions
            .put(event.user.id, Session::new(PendingPayload::Description(pending)))
        {
            debug!(
                user_id = %event.user.id,
                previous_state = %previous.state(),
                "Replaced pending session with new upload"
            );
        }

        info!(
            user_id = %event.user.id,
            file_name = %file_name,
            category = %category,
            size = file.size,
            "Upload accepted, awaiting description"
        );

        vec![OutboundAction::text_with_keyboard(
            self.ctx.t("ask-description", event),
            vec![vec![Button::new(
                self.ctx.t("skip-description", event),
                SKIP_DESCRIPTION_CALLBACK,
            )]],
        )]
    }

    fn rejection_message(&self, event: &InboundEvent, rejection: &UploadRejection) -> String {
        match rejection {
            UploadRejection::TooLarge { max, .. } => self.ctx.t_args(
                "file-too-large",
                &[("max_size", format_file_size(*max))],
                event,
            ),
            UploadRejection::UnsupportedType { .. } => {
                let allowed = FileCategory::ALL
                    .iter()
                    .map(|c| format!("{}: {}", c, c.extensions().join(", ")))
                    .collect::<Vec<_>>()
                    .join("\n");
                self.ctx
                    .t_args("file-type-not-supported", &[("allowed", allowed)], event)
            }
        }
    }

    async fn handle_text(&self, event: &InboundEvent, text: &str) -> Vec<OutboundAction> {
        let Ok(pending) = self.ctx.sessions.take_pending_file(event.user.id) else {
            return vec![OutboundAction::text(self.ctx.t("storage-idle-hint", event))];
        };

        let description = text.trim().to_string();
        match self.persist(event, pending, Some(description.clone())).await {
            Ok(id) => vec![OutboundAction::text(self.ctx.t_args(
                "file-stored-with-description",
                &[("id", id.to_string()), ("description", description)],
                event,
            ))],
            Err(reply) => vec![OutboundAction::text(reply)],
        }
    }

    /// Persist a taken pending upload; the session is already gone either way.
    async fn persist(
        &self,
        event: &InboundEvent,
        pending: PendingFile,
        description: Option<String>,
    ) -> Result<i64, String> {
        let record = NewFile {
            user_id: event.user.id,
            file_handle: pending.handle,
            file_name: pending.file_name,
            file_type: pending.file_type,
            file_size: i64::try_from(pending.size).unwrap_or(i64::MAX),
            description,
        };

        match self.store.add_file(&record).await {
            Ok(id) => {
                info!(
                    user_id = %event.user.id,
                    file_id = %id,
                    file_name = %record.file_name,
                    "File stored"
                );
                Ok(id)
            }
            Err(e) => {
                error_logging::log_database_error(
                    &e,
                    "add_file",
                    Some(event.user.id),
                    Some(&[("file_name", &record.file_name as &dyn std::fmt::Display)]),
                );
                Err(self.ctx.t("file-store-failed", event))
            }
        }
    }

    async fn handle_callback(
        &self,
        event: &InboundEvent,
        data: &str,
        message_id: Option<i32>,
    ) -> Vec<OutboundAction> {
        if data == SKIP_DESCRIPTION_CALLBACK {
            return self.skip_description(event, message_id).await;
        }
        if let Some(page) = parse_callback_id::<usize>(data, PAGE_CALLBACK_PREFIX) {
            return self.show_files(event, page, message_id).await;
        }
        if let Some(id) = parse_callback_id::<i64>(data, DOWNLOAD_CALLBACK_PREFIX) {
            return self.download(event, id, message_id).await;
        }
        if let Some(id) = parse_callback_id::<i64>(data, DELETE_CALLBACK_PREFIX) {
            return self.delete(event, id, message_id).await;
        }

        warn!(user_id = %event.user.id, data = %data, "Unknown callback data");
        vec![OutboundAction::text(self.ctx.t("unknown-action", event))]
    }

    async fn skip_description(
        &self,
        event: &InboundEvent,
        message_id: Option<i32>,
    ) -> Vec<OutboundAction> {
        let pending = match self.ctx.sessions.take_pending_file(event.user.id) {
            Ok(pending) => pending,
            Err(e) => {
                debug!(
                    user_id = %event.user.id,
                    error = %e,
                    "Skip pressed without a pending upload"
                );
                return vec![OutboundAction::edit_or_send(
                    message_id,
                    self.ctx.t("session-expired", event),
                    None,
                )];
            }
        };

        let text = match self.persist(event, pending, None).await {
            Ok(id) => self
                .ctx
                .t_args("file-stored", &[("id", id.to_string())], event),
            Err(reply) => reply,
        };
        vec![OutboundAction::edit_or_send(message_id, text, None)]
    }

    async fn show_files(
        &self,
        event: &InboundEvent,
        page: usize,
        message_id: Option<i32>,
    ) -> Vec<OutboundAction> {
        let files = match self.store.list_files(event.user.id).await {
            Ok(files) => files,
            Err(e) => {
                error_logging::log_database_error(&e, "list_files", Some(event.user.id), None);
                return vec![OutboundAction::edit_or_send(
                    message_id,
                    self.ctx.t("files-load-failed", event),
                    None,
                )];
            }
        };

        if files.is_empty() {
            return vec![OutboundAction::edit_or_send(
                message_id,
                self.ctx.t("no-files", event),
                None,
            )];
        }

        let (text, keyboard) =
            render_files_page(&files, page, &self.ctx.localization, event.language());
        vec![OutboundAction::edit_or_send(message_id, text, Some(keyboard))]
    }

    async fn download(
        &self,
        event: &InboundEvent,
        id: i64,
        message_id: Option<i32>,
    ) -> Vec<OutboundAction> {
        match self.store.get_file(id, event.user.id).await {
            Ok(Some(file)) => vec![OutboundAction::SendStoredDocument {
                handle: file.file_handle,
                caption: format!("📄 {}", file.file_name),
            }],
            Ok(None) => vec![OutboundAction::edit_or_send(
                message_id,
                self.ctx.t("file-not-found", event),
                None,
            )],
            Err(e) => {
                error_logging::log_database_error(
                    &e,
                    "get_file",
                    Some(event.user.id),
                    Some(&[("file_id", &id as &dyn std::fmt::Display)]),
                );
                vec![OutboundAction::text(self.ctx.t("generic-error", event))]
            }
        }
    }

    async fn delete(
        &self,
        event: &InboundEvent,
        id: i64,
        message_id: Option<i32>,
    ) -> Vec<OutboundAction> {
        let key = match self.store.delete_file(id, event.user.id).await {
            Ok(true) => "file-deleted",
            Ok(false) => "file-delete-failed",
            Err(e) => {
                error_logging::log_database_error(
                    &e,
                    "delete_file",
                    Some(event.user.id),
                    Some(&[("file_id", &id as &dyn std::fmt::Display)]),
                );
                "file-delete-failed"
            }
        };
        vec![OutboundAction::edit_or_send(message_id, self.ctx.t(key, event), None)]
    }

    async fn show_stats(&self, event: &InboundEvent) -> Vec<OutboundAction> {
        match self.store.file_stats(event.user.id).await {
            Ok(stats) => vec![OutboundAction::text(self.ctx.t_args(
                "storage-stats",
                &[
                    ("count", stats.count.to_string()),
                    ("total_size", format_file_size(stats.total_size.max(0) as u64)),
                    ("max_size", format_file_size(self.ctx.max_file_size)),
                ],
                event,
            ))],
            Err(e) => {
                error_logging::log_database_error(&e, "file_stats", Some(event.user.id), None);
                vec![OutboundAction::text(self.ctx.t("generic-error", event))]
            }
        }
    }
}

#[async_trait]
impl<S: FileStore> EventHandler for StorageCoordinator<S> {
    async fn handle(&self, event: InboundEvent) -> Vec<OutboundAction> {
        crate::observability::record_event(event.kind.label());
        if let Some(rejection) = self.ctx.gate(&event) {
            return rejection;
        }

        match &event.kind {
            EventKind::Command(command) => self.handle_command(&event, command).await,
            EventKind::Upload(file) => self.handle_upload(&event, file).await,
            EventKind::Text(text) => self.handle_text(&event, text).await,
            EventKind::Callback { data, message_id } => {
                self.handle_callback(&event, data, *message_id).await
            }
            // Replies to re-sent documents carry no special meaning here
            EventKind::ReplyToResult { request, .. } => match request {
                RecompositeRequest::Color(text) => self.handle_text(&event, text).await,
                RecompositeRequest::Image(file) => self.handle_upload(&event, file).await,
            },
            EventKind::Unsupported => {
                vec![OutboundAction::text(self.ctx.t("storage-idle-hint", &event))]
            }
        }
    }
}
