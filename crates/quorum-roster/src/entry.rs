//! Roster types: configuration and the per-participant record.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RosterConfig
// ---------------------------------------------------------------------------

/// Configuration for presence tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RosterConfig {
    /// How long (in seconds) since a participant was last seen before they
    /// count as idle.
    ///
    /// Default: 600 seconds.
    pub idle_threshold_secs: u64,

    /// How long (in seconds) a participant counts as committed after a game
    /// they are in commences.
    ///
    /// Default: 900 seconds.
    pub commitment_secs: u64,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            idle_threshold_secs: 600,
            commitment_secs: 900,
        }
    }
}

impl RosterConfig {
    /// The idle threshold as a `Duration`.
    pub fn idle_threshold(&self) -> Duration {
        Duration::from_secs(self.idle_threshold_secs)
    }

    /// The commitment length as a `Duration`.
    pub fn commitment(&self) -> Duration {
        Duration::from_secs(self.commitment_secs)
    }
}

// ---------------------------------------------------------------------------
// ParticipantStatus
// ---------------------------------------------------------------------------

/// How a participant looks right now.
///
/// ```text
///   Unknown ──(touch)──→ Active ──(threshold elapses)──→ Idle
///                          ↑                               │
///                          └──────────(touch)──────────────┘
/// ```
///
/// A participant who has never been seen is `Unknown` and is treated as
/// idle by [`Presence::is_idle`](crate::Presence::is_idle): there is no
/// evidence they are around.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticipantStatus {
    /// Never seen.
    Unknown,

    /// Seen within the idle threshold.
    Active { last_seen: DateTime<Utc> },

    /// Last seen longer ago than the idle threshold.
    Idle { last_seen: DateTime<Utc> },
}

// ---------------------------------------------------------------------------
// RosterEntry
// ---------------------------------------------------------------------------

/// What the roster remembers about one participant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterEntry {
    /// When the participant last did anything.
    pub last_seen: Option<DateTime<Utc>>,

    /// If set, the participant is committed to a commenced game until
    /// this time.
    pub committed_until: Option<DateTime<Utc>>,
}
