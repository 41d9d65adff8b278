//! Identity types and the slot key.
//!
//! Everything in here is a small value type: cheap to clone, hashable, and
//! serializable, so the game layer can use them as map keys and the store
//! can write them straight to disk.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A participant's handle, usually their chat username.
///
/// Newtype wrapper so a participant can never be confused with an activity
/// or area name even though all three are strings underneath.
///
/// `#[serde(transparent)]` stores it as a bare string: `"alice"`, not
/// `{ "0": "alice" }`.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ParticipantId(pub String);

impl ParticipantId {
    /// Creates a participant handle.
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// The handle as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ParticipantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ParticipantId {
    fn from(handle: &str) -> Self {
        Self(handle.to_string())
    }
}

/// Identifies one game within a game manager.
///
/// Ids are handed out by each manager from its own counter; they are
/// never reused for the lifetime of the manager.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GameId(pub u64);

impl fmt::Display for GameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G-{}", self.0)
    }
}

/// The opaque handle a store returns when a record is first created.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Slot
// ---------------------------------------------------------------------------

/// The time slot a game is for.
///
/// `Now` sorts before every specific time, so iterating a `BTreeMap<Slot, _>`
/// visits the "now" games first and then the scheduled ones in time order.
/// The derived `Ord` gives exactly that because `Now` is declared first.
///
/// On the wire a slot is an optional timestamp: `null` for now, an RFC 3339
/// string otherwise.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(from = "Option<DateTime<Utc>>", into = "Option<DateTime<Utc>>")]
pub enum Slot {
    /// Play as soon as the game fills.
    Now,
    /// Play at (or after) this time.
    At(DateTime<Utc>),
}

impl Slot {
    /// `true` for the "now" slot.
    pub fn is_now(&self) -> bool {
        matches!(self, Self::Now)
    }

    /// The target time, if this slot has one.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Now => None,
            Self::At(t) => Some(*t),
        }
    }

    /// `true` if this is a specific time that has not yet arrived.
    pub fn is_future(&self, now: DateTime<Utc>) -> bool {
        matches!(self, Self::At(t) if *t > now)
    }

    /// `true` if this is a specific time that has arrived or gone.
    pub fn is_past(&self, now: DateTime<Utc>) -> bool {
        matches!(self, Self::At(t) if *t <= now)
    }
}

impl From<Option<DateTime<Utc>>> for Slot {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        match value {
            None => Self::Now,
            Some(t) => Self::At(t),
        }
    }
}

impl From<Slot> for Option<DateTime<Utc>> {
    fn from(slot: Slot) -> Self {
        slot.time()
    }
}

/// Prints `now` or the time of day as `HH:MM`, the way announcements
/// refer to slots.
impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Now => f.write_str("now"),
            Self::At(t) => write!(f, "{}", t.format("%H:%M")),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
