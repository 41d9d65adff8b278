//! Error types for the game layer.
//!
//! Two classes never mix: [`ActionError`] is something the caller asked
//! for that the rules do not allow, and leaves every game untouched.
//! [`InternalError`] means the engine found its own bookkeeping
//! inconsistent. Store and announcer failures have their own types but are
//! only ever logged, never returned from a game operation.

use quorum_protocol::{GameId, ParticipantId, RecordId, Slot};

use crate::machine::MachineError;

/// A request the rules refuse. Messages are user-facing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActionError {
    /// The participant is already in a game for this slot.
    #[error("You are already registered for a game for {0}")]
    AlreadyRegistered(Slot),

    /// Nothing is scheduled for this slot.
    #[error("There are no games for {0}")]
    NoGames(Slot),

    /// There are games for the slot but the participant is in none.
    #[error("You are not registered for a game for {0}")]
    NotRegistered(Slot),

    /// Ready marks only apply to flexible activities.
    #[error("Cannot use ready for {0}")]
    NotFlexible(String),

    /// Turning the ready mark on needs at least this many participants.
    #[error("Need at least {0} players")]
    NotEnoughPlayers(usize),

    /// A new game cannot be created for a time that has gone.
    #[error("Cannot start a game in the past! ({0})")]
    SlotInPast(Slot),

    /// The game already has a hold on it.
    #[error("Game for {0} is already held by {1}")]
    AlreadyHeld(Slot, ParticipantId),

    /// Clearing a hold that is not there.
    #[error("Game for {0} is not held")]
    NotHeld(Slot),

    /// The game is in a state a hold cannot be placed in.
    #[error("Game for {slot} cannot be held right now ({state})")]
    NotHoldable {
        slot: Slot,
        state: crate::GameState,
    },

    /// No activity with this name.
    #[error("Unknown activity '{0}'")]
    UnknownActivity(String),

    /// No area with this name.
    #[error("Unknown area '{0}'")]
    UnknownArea(String),

    /// The area is full and cannot also be marked busy.
    #[error("Area '{0}' is in use")]
    AreaInUse(String),
}

/// The engine's own invariants do not hold. Always logged at `error`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InternalError {
    /// The state machine refused a trigger outright.
    #[error("game {game}: {source}")]
    Machine {
        game: GameId,
        #[source]
        source: MachineError,
    },

    /// A slot key is present with no games under it.
    #[error("slot {0} maps to an empty game list")]
    EmptySlot(Slot),

    /// An area queue or rolling set names a game its manager does not have.
    #[error("area '{area}' references unknown game {game} of {activity}")]
    UnknownGame {
        area: String,
        activity: String,
        game: GameId,
    },
}

/// Anything a game operation can fail with.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GameError {
    #[error(transparent)]
    Action(#[from] ActionError),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl GameError {
    /// `true` for logic bugs, `false` for refused requests.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }
}

/// A persistence backend failed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The record handle is not known to the store.
    #[error("record {0} not found")]
    NotFound(RecordId),

    /// The backend itself failed (I/O, encoding, ...).
    #[error("store backend failed: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Wraps any backend error.
    pub fn backend(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Backend(Box::new(err))
    }
}

/// An announcement or notice could not be delivered.
#[derive(Debug, Clone, thiserror::Error)]
#[error("announcement not delivered: {0}")]
pub struct AnnounceError(pub String);
