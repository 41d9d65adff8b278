//! Participant presence for Quorum.
//!
//! The game engine asks two questions about a participant before letting
//! a game commence: are they already committed to another game that just
//! started, and have they gone quiet? This crate answers them.
//!
//! # Key types
//!
//! - [`Presence`]: the read-only questions the engine asks
//! - [`Roster`]: an in-memory directory answering them from activity
//!   timestamps and commitment marks
//! - [`RosterConfig`]: idle threshold and commitment length

mod entry;
mod presence;
mod roster;

pub use entry::{ParticipantStatus, RosterConfig, RosterEntry};
pub use presence::Presence;
pub use roster::Roster;
