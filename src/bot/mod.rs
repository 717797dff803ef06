//! Bot module for handling Telegram interactions
//!
//! - `transport`: converts teloxide updates into flow events and executes flow actions
//! - `media`: downloads uploaded files for the background-removal flow
//! - `handlers`: dispatcher endpoints and the dispatcher loop

pub mod handlers;
pub mod media;
pub mod transport;

pub use handlers::{callback_handler, message_handler, run_dispatcher};
pub use media::TelegramMediaFetcher;
