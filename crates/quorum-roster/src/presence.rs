//! The `Presence` trait: what the game engine needs to know about people.

use quorum_protocol::ParticipantId;

/// Read-only presence queries used as state-machine guard inputs.
///
/// The engine never mutates presence; it only asks. Whoever owns the
/// implementation (usually the venue, through a [`Roster`](crate::Roster))
/// is responsible for recording activity and commitments.
pub trait Presence {
    /// `true` if the participant is playing in a game that has already
    /// commenced elsewhere and so cannot take part in another right now.
    fn is_committed_elsewhere(&self, participant: &ParticipantId) -> bool;

    /// `true` if the participant has not been seen recently enough to
    /// assume they will turn up.
    fn is_idle(&self, participant: &ParticipantId) -> bool;
}
