//! Conversion between teloxide types and the transport-neutral flow types.

use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::{
    FileId, InlineKeyboardButton, InlineKeyboardMarkup, InputFile, MaybeInaccessibleMessage,
    MessageId, User,
};

use crate::flow::{
    Command, EventKind, InboundEvent, IncomingFile, Keyboard, MediaKind, OutboundAction,
    RecompositeRequest, UserInfo,
};

pub fn user_info(user: &User) -> UserInfo {
    UserInfo {
        id: user.id.0 as i64,
        username: user.username.clone(),
        first_name: Some(user.first_name.clone()),
        last_name: user.last_name.clone(),
        language_code: user.language_code.clone(),
    }
}

/// The uploaded file carried by `msg`; for photos, the largest size
pub fn incoming_file(msg: &Message) -> Option<IncomingFile> {
    if let Some(doc) = msg.document() {
        return Some(IncomingFile {
            handle: doc.file.id.0.clone(),
            file_name: doc.file_name.clone(),
            mime_type: doc.mime_type.as_ref().map(|m| m.to_string()),
            size: u64::from(doc.file.size),
            kind: MediaKind::Document,
        });
    }
    if let Some(largest_photo) = msg.photo().and_then(|photos| photos.last()) {
        return Some(IncomingFile {
            handle: largest_photo.file.id.0.clone(),
            file_name: None,
            mime_type: None,
            size: u64::from(largest_photo.file.size),
            kind: MediaKind::Photo,
        });
    }
    if let Some(video) = msg.video() {
        return Some(IncomingFile {
            handle: video.file.id.0.clone(),
            file_name: video.file_name.clone(),
            mime_type: video.mime_type.as_ref().map(|m| m.to_string()),
            size: u64::from(video.file.size),
            kind: MediaKind::Video,
        });
    }
    if let Some(audio) = msg.audio() {
        return Some(IncomingFile {
            handle: audio.file.id.0.clone(),
            file_name: audio.file_name.clone(),
            mime_type: audio.mime_type.as_ref().map(|m| m.to_string()),
            size: u64::from(audio.file.size),
            kind: MediaKind::Audio,
        });
    }
    None
}

/// A document previously delivered by a bot that `msg` replies to
fn replied_result(msg: &Message) -> Option<IncomingFile> {
    let replied = msg.reply_to_message()?;
    if !replied.from.as_ref().is_some_and(|user| user.is_bot) {
        return None;
    }
    replied.document()?;
    incoming_file(replied)
}

/// Classify a message; `None` for messages without a sender (channel posts)
pub fn event_from_message(msg: &Message) -> Option<InboundEvent> {
    let user = user_info(msg.from.as_ref()?);

    let text = msg.text();
    let file = incoming_file(msg);

    let kind = if let Some(command) = text.and_then(Command::parse) {
        EventKind::Command(command)
    } else {
        match (replied_result(msg), text, file) {
            (Some(result), Some(text), _) => EventKind::ReplyToResult {
                result,
                request: RecompositeRequest::Color(text.to_string()),
            },
            (Some(result), None, Some(file)) => EventKind::ReplyToResult {
                result,
                request: RecompositeRequest::Image(file),
            },
            (_, _, Some(file)) => EventKind::Upload(file),
            (_, Some(text), None) => EventKind::Text(text.to_string()),
            (_, None, None) => EventKind::Unsupported,
        }
    };

    Some(InboundEvent {
        user,
        chat_id: msg.chat.id.0,
        kind,
    })
}

/// Chat to answer a callback in; private chats fall back to the sender
pub fn callback_chat_id(q: &CallbackQuery) -> ChatId {
    match &q.message {
        Some(MaybeInaccessibleMessage::Regular(msg)) => msg.chat.id,
        Some(MaybeInaccessibleMessage::Inaccessible(msg)) => msg.chat.id,
        None => ChatId::from(q.from.id),
    }
}

pub fn event_from_callback(q: &CallbackQuery) -> Option<InboundEvent> {
    let data = q.data.clone()?;
    let message_id = match &q.message {
        Some(MaybeInaccessibleMessage::Regular(msg)) => Some(msg.id.0),
        Some(MaybeInaccessibleMessage::Inaccessible(msg)) => Some(msg.message_id.0),
        None => None,
    };

    Some(InboundEvent {
        user: user_info(&q.from),
        chat_id: callback_chat_id(q).0,
        kind: EventKind::Callback { data, message_id },
    })
}

pub fn inline_keyboard(keyboard: &Keyboard) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(keyboard.iter().map(|row| {
        row.iter()
            .map(|button| InlineKeyboardButton::callback(button.label.clone(), button.data.clone()))
            .collect::<Vec<_>>()
    }))
}

/// Perform the actions in order; stops at the first Telegram error
pub async fn execute_actions(
    bot: &Bot,
    chat_id: ChatId,
    actions: Vec<OutboundAction>,
) -> Result<()> {
    for action in actions {
        match action {
            OutboundAction::SendText { text, keyboard } => {
                let request = bot.send_message(chat_id, text);
                match keyboard {
                    Some(keyboard) => request.reply_markup(inline_keyboard(&keyboard)).await?,
                    None => request.await?,
                };
            }
            OutboundAction::EditText {
                message_id,
                text,
                keyboard,
            } => {
                let request = bot.edit_message_text(chat_id, MessageId(message_id), text);
                match keyboard {
                    Some(keyboard) => request.reply_markup(inline_keyboard(&keyboard)).await?,
                    None => request.await?,
                };
            }
            OutboundAction::SendStoredDocument { handle, caption } => {
                bot.send_document(chat_id, InputFile::file_id(FileId(handle)))
                    .caption(caption)
                    .await?;
            }
            OutboundAction::SendImage {
                bytes,
                file_name,
                caption,
            } => {
                bot.send_document(chat_id, InputFile::memory(bytes).file_name(file_name))
                    .caption(caption)
                    .await?;
            }
        }
    }
    Ok(())
}
