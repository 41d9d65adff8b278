//! Announcement sink and the recording fake used in tests.
//!
//! Delivery is fire-and-forget: the manager logs a failed announcement at
//! `warn` and carries on, so an implementation may block briefly or fail
//! but must never panic.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use quorum_protocol::ParticipantId;

use crate::error::AnnounceError;

/// Where game announcements and private notices go.
pub trait Announcer: Send + Sync {
    /// Broadcasts to everyone following `activity`.
    fn announce(&self, activity: &str, text: &str) -> Result<(), AnnounceError>;

    /// Sends a private notice to one participant.
    fn notify(&self, participant: &ParticipantId, text: &str) -> Result<(), AnnounceError>;
}

/// An announcer handle shared by every manager in a venue.
pub type SharedAnnouncer = Arc<dyn Announcer>;

/// Writes announcements to the `tracing` log at `info`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAnnouncer;

impl Announcer for TracingAnnouncer {
    fn announce(&self, activity: &str, text: &str) -> Result<(), AnnounceError> {
        tracing::info!(target: "quorum::announce", %activity, "{text}");
        Ok(())
    }

    fn notify(&self, participant: &ParticipantId, text: &str) -> Result<(), AnnounceError> {
        tracing::info!(target: "quorum::notify", %participant, "{text}");
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RecordingAnnouncer
// ---------------------------------------------------------------------------

/// One delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Announce { activity: String, text: String },
    Notify { participant: ParticipantId, text: String },
}

/// Keeps every message in order. Can be switched to fail every delivery,
/// to check that failures do not disturb game state.
#[derive(Debug, Default)]
pub struct RecordingAnnouncer {
    messages: Mutex<Vec<Message>>,
    failing: AtomicBool,
}

impl RecordingAnnouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later delivery fail (and not be recorded).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock().clone()
    }

    /// Broadcast texts, oldest first.
    pub fn announcements(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|m| match m {
                Message::Announce { text, .. } => Some(text.clone()),
                Message::Notify { .. } => None,
            })
            .collect()
    }

    /// Private notices sent to `participant`, oldest first.
    pub fn notices(&self, participant: &ParticipantId) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|m| match m {
                Message::Notify { participant: p, text } if p == participant => {
                    Some(text.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Forgets everything recorded so far.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Message>> {
        self.messages.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn deliver(&self, message: Message) -> Result<(), AnnounceError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AnnounceError("recording announcer set to fail".into()));
        }
        self.lock().push(message);
        Ok(())
    }
}

impl Announcer for RecordingAnnouncer {
    fn announce(&self, activity: &str, text: &str) -> Result<(), AnnounceError> {
        self.deliver(Message::Announce {
            activity: activity.to_string(),
            text: text.to_string(),
        })
    }

    fn notify(&self, participant: &ParticipantId, text: &str) -> Result<(), AnnounceError> {
        self.deliver(Message::Notify {
            participant: participant.clone(),
            text: text.to_string(),
        })
    }
}
