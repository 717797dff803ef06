//! Ephemeral per-user conversation sessions.
//!
//! A session exists only while a user is in the middle of a multi-step
//! interaction. Absence of a session is the idle state. Sessions never leave
//! process memory.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::errors::{AppError, AppResult};
use crate::observability;

/// Telegram user identifier
pub type UserId = i64;

/// Conversation state derived from the pending payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    Idle,
    AwaitingDescription,
    AwaitingBackgroundChoice,
}

impl fmt::Display for InteractionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InteractionState::Idle => write!(f, "idle"),
            InteractionState::AwaitingDescription => write!(f, "awaiting_description"),
            InteractionState::AwaitingBackgroundChoice => write!(f, "awaiting_background_choice"),
        }
    }
}

/// Upload metadata waiting for an optional description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingFile {
    /// Opaque Telegram file handle
    pub handle: String,
    pub file_name: String,
    /// Declared mime type, or the category name when none was declared
    pub file_type: String,
    pub size: u64,
}

/// Downloaded image bytes waiting for a background choice
#[derive(Clone, PartialEq, Eq)]
pub struct PendingImage {
    pub bytes: Vec<u8>,
}

impl fmt::Debug for PendingImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingImage")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Flow-specific payload held by a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingPayload {
    Description(PendingFile),
    BackgroundChoice(PendingImage),
}

impl PendingPayload {
    pub fn state(&self) -> InteractionState {
        match self {
            PendingPayload::Description(_) => InteractionState::AwaitingDescription,
            PendingPayload::BackgroundChoice(_) => InteractionState::AwaitingBackgroundChoice,
        }
    }

    /// Bytes kept in memory by this payload
    pub fn held_bytes(&self) -> usize {
        match self {
            PendingPayload::Description(_) => 0,
            PendingPayload::BackgroundChoice(image) => image.bytes.len(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub payload: PendingPayload,
    pub created_at: Instant,
}

impl Session {
    pub fn new(payload: PendingPayload) -> Self {
        Self::new_at(payload, Instant::now())
    }

    pub fn new_at(payload: PendingPayload, created_at: Instant) -> Self {
        Self {
            payload,
            created_at,
        }
    }

    pub fn state(&self) -> InteractionState {
        self.payload.state()
    }

    /// Strictly older than `ttl` at `now`
    pub fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > ttl
    }
}

/// Outcome of one expiry sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub removed: usize,
    pub released_bytes: usize,
    pub remaining: usize,
}

/// In-memory session map owned by the coordinator
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: Mutex<HashMap<UserId, Session>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, user_id: UserId) -> Option<Session> {
        self.sessions.lock().get(&user_id).cloned()
    }

    /// Store a session, replacing (last write wins) and returning any previous one.
    pub fn put(&self, user_id: UserId, session: Session) -> Option<Session> {
        let mut sessions = self.sessions.lock();
        let previous = sessions.insert(user_id, session);
        observability::set_active_sessions(sessions.len());
        previous
    }

    /// Remove the session; its payload is released when the result is dropped.
    pub fn remove(&self, user_id: UserId) -> Option<Session> {
        let mut sessions = self.sessions.lock();
        let removed = sessions.remove(&user_id);
        observability::set_active_sessions(sessions.len());
        removed
    }

    pub fn state(&self, user_id: UserId) -> InteractionState {
        self.sessions
            .lock()
            .get(&user_id)
            .map(Session::state)
            .unwrap_or(InteractionState::Idle)
    }

    /// Take the pending upload if the user is awaiting a description.
    pub fn take_pending_file(&self, user_id: UserId) -> AppResult<PendingFile> {
        match self.take_if(user_id, InteractionState::AwaitingDescription) {
            Some(PendingPayload::Description(file)) => Ok(file),
            _ => Err(AppError::Session(format!(
                "no pending upload for user {}",
                user_id
            ))),
        }
    }

    /// Take the pending image if the user is awaiting a background choice.
    pub fn take_pending_image(&self, user_id: UserId) -> AppResult<PendingImage> {
        match self.take_if(user_id, InteractionState::AwaitingBackgroundChoice) {
            Some(PendingPayload::BackgroundChoice(image)) => Ok(image),
            _ => Err(AppError::Session(format!(
                "no pending image for user {}",
                user_id
            ))),
        }
    }

    fn take_if(&self, user_id: UserId, state: InteractionState) -> Option<PendingPayload> {
        let mut sessions = self.sessions.lock();
        if sessions.get(&user_id).map(Session::state) != Some(state) {
            return None;
        }
        let taken = sessions.remove(&user_id).map(|session| session.payload);
        observability::set_active_sessions(sessions.len());
        taken
    }

    /// Remove every session strictly older than `ttl`.
    pub fn sweep_expired(&self, now: Instant, ttl: Duration) -> SweepReport {
        let mut sessions = self.sessions.lock();

        let expired: Vec<UserId> = sessions
            .iter()
            .filter(|(_, session)| session.is_expired(now, ttl))
            .map(|(user_id, _)| *user_id)
            .collect();

        let mut report = SweepReport::default();
        for user_id in expired {
            if let Some(session) = sessions.remove(&user_id) {
                report.removed += 1;
                report.released_bytes += session.payload.held_bytes();
            }
        }
        report.remaining = sessions.len();
        observability::set_active_sessions(report.remaining);
        report
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop all sessions (shutdown)
    pub fn clear(&self) -> usize {
        let mut sessions = self.sessions.lock();
        let count = sessions.len();
        sessions.clear();
        observability::set_active_sessions(0);
        count
    }
}
