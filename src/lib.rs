//! # Stashbot
//!
//! Telegram bots built around one conversation core: a per-user rate
//! limiter, an in-memory session store with periodic expiry, and a
//! transport-neutral interaction state machine. Two flows run on it:
//! file storage (PostgreSQL-backed) and background removal (third-party
//! API plus local recompositing).

pub mod bot;
pub mod compositing;
pub mod config;
pub mod errors;
pub mod file_policy;
pub mod flow;
pub mod localization;
pub mod observability;
pub mod palette;
pub mod rate_limiter;
pub mod reaper;
pub mod removal_api;
pub mod session;
pub mod store;

// Re-export types for easier access
pub use config::{AppConfig, BotMode};
pub use errors::{AppError, AppResult};
pub use flow::{CutoutCoordinator, EventHandler, FlowContext, StorageCoordinator};
