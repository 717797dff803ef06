//! Dispatcher endpoints.
//!
//! Every endpoint logs its own failures and returns `Ok(())`, so one bad
//! update never reaches the dispatcher's error handler or affects others.

use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{debug, Instrument};

use crate::errors::error_logging;
use crate::flow::EventHandler;
use crate::observability;

use super::transport::{callback_chat_id, event_from_callback, event_from_message, execute_actions};

pub async fn message_handler(bot: Bot, msg: Message, handler: Arc<dyn EventHandler>) -> Result<()> {
    let Some(event) = event_from_message(&msg) else {
        debug!(chat_id = %msg.chat.id, "Ignoring message without sender");
        return Ok(());
    };

    let user_id = event.user.id;
    let span = observability::telegram_span("message_handler", Some(user_id));
    async {
        let actions = handler.handle(event).await;
        if let Err(e) = execute_actions(&bot, msg.chat.id, actions).await {
            error_logging::log_network_error(
                &e,
                "execute_actions",
                Some("telegram"),
                Some(user_id),
            );
        }
    }
    .instrument(span)
    .await;

    Ok(())
}

pub async fn callback_handler(
    bot: Bot,
    q: CallbackQuery,
    handler: Arc<dyn EventHandler>,
) -> Result<()> {
    let user_id = q.from.id.0 as i64;
    let span = observability::telegram_span("callback_handler", Some(user_id));

    async {
        // Clear the button spinner before a possibly slow handler runs
        if let Err(e) = bot.answer_callback_query(q.id.clone()).await {
            error_logging::log_network_error(
                &e,
                "answer_callback_query",
                Some("telegram"),
                Some(user_id),
            );
        }

        if let Some(event) = event_from_callback(&q) {
            let actions = handler.handle(event).await;
            if let Err(e) = execute_actions(&bot, callback_chat_id(&q), actions).await {
                error_logging::log_network_error(
                    &e,
                    "execute_actions",
                    Some("telegram"),
                    Some(user_id),
                );
            }
        }
    }
    .instrument(span)
    .await;

    Ok(())
}

/// Run the long-polling dispatcher until Ctrl+C
pub async fn run_dispatcher(bot: Bot, handler: Arc<dyn EventHandler>) {
    let tree = dptree::entry()
        .branch(Update::filter_message().endpoint({
            let handler = Arc::clone(&handler);
            move |bot: Bot, msg: Message| {
                let handler = Arc::clone(&handler);
                async move { message_handler(bot, msg, handler).await }
            }
        }))
        .branch(Update::filter_callback_query().endpoint({
            let handler = Arc::clone(&handler);
            move |bot: Bot, q: CallbackQuery| {
                let handler = Arc::clone(&handler);
                async move { callback_handler(bot, q, handler).await }
            }
        }));

    // Updates of one chat are processed sequentially, so a user's events never race
    Dispatcher::builder(bot, tree)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}
