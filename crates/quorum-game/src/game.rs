//! One game: membership, capacity, hold, and timestamps.
//!
//! A `Game` is plain data. It knows how to answer the guard predicates
//! about itself but never changes its own state; only the
//! [`GameManager`](crate::GameManager) moves it through the machine.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use quorum_protocol::{GameId, GameRecord, ParticipantId, RecordId, Slot};
use serde::Serialize;

use crate::area::{Area, GameRef};
use crate::machine::{GameState, Guards};

// ---------------------------------------------------------------------------
// Capacity
// ---------------------------------------------------------------------------

/// How many more participants a game can take.
///
/// ```text
///   Bounded(n)   at most n participants
///   Unbounded    no limit, until someone issues 'ready'
///   LockedAt(n)  a flexible game marked ready at n participants:
///                no further additions, counts as full
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Capacity {
    Bounded(usize),
    Unbounded,
    LockedAt(usize),
}

impl Capacity {
    /// The unlocked capacity for an activity maximum (0 = unbounded).
    pub fn for_max(max: usize) -> Self {
        if max == 0 { Self::Unbounded } else { Self::Bounded(max) }
    }

    /// Free places, or `None` for no limit.
    pub fn spaces_left(&self, count: usize) -> Option<usize> {
        match self {
            Self::Bounded(max) => Some(max.saturating_sub(count)),
            Self::Unbounded => None,
            Self::LockedAt(_) => Some(0),
        }
    }

    pub fn has_space(&self, count: usize) -> bool {
        self.spaces_left(count).is_none_or(|s| s > 0)
    }

    pub fn is_locked(&self) -> bool {
        matches!(self, Self::LockedAt(_))
    }
}

// ---------------------------------------------------------------------------
// Hold
// ---------------------------------------------------------------------------

/// Who is holding a game back, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hold {
    pub holder: ParticipantId,
    pub reason: Option<String>,
}

// ---------------------------------------------------------------------------
// Game
// ---------------------------------------------------------------------------

/// One instance of an activity for one slot.
#[derive(Debug, Clone)]
pub struct Game {
    pub(crate) id: GameId,
    pub(crate) slot: Slot,
    /// Signup order matters: compaction pulls from the front.
    pub(crate) participants: Vec<ParticipantId>,
    pub(crate) not_ready: HashSet<ParticipantId>,
    pub(crate) max: usize,
    pub(crate) capacity: Capacity,
    pub(crate) hold: Option<Hold>,
    pub(crate) created_time: DateTime<Utc>,
    pub(crate) quorate_time: Option<DateTime<Utc>>,
    pub(crate) commence_time: Option<DateTime<Utc>>,
    pub(crate) state: GameState,
    pub(crate) record_id: Option<RecordId>,
    pub(crate) ready_deadline: Option<DateTime<Utc>>,
}

impl Game {
    pub(crate) fn new(id: GameId, slot: Slot, max: usize, created_time: DateTime<Utc>) -> Self {
        Self {
            id,
            slot,
            participants: Vec::new(),
            not_ready: HashSet::new(),
            max,
            capacity: Capacity::for_max(max),
            hold: None,
            created_time,
            quorate_time: None,
            commence_time: None,
            state: GameState::Empty,
            record_id: None,
            ready_deadline: None,
        }
    }

    pub fn id(&self) -> GameId {
        self.id
    }

    pub fn slot(&self) -> Slot {
        self.slot
    }

    pub fn state(&self) -> GameState {
        self.state
    }

    pub fn participants(&self) -> &[ParticipantId] {
        &self.participants
    }

    pub fn contains(&self, participant: &ParticipantId) -> bool {
        self.participants.contains(participant)
    }

    pub fn len(&self) -> usize {
        self.participants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty()
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    pub fn spaces_left(&self) -> Option<usize> {
        self.capacity.spaces_left(self.participants.len())
    }

    pub fn has_space(&self) -> bool {
        self.capacity.has_space(self.participants.len())
    }

    pub fn is_flexible_ready(&self) -> bool {
        self.capacity.is_locked()
    }

    pub fn hold(&self) -> Option<&Hold> {
        self.hold.as_ref()
    }

    pub fn created_time(&self) -> DateTime<Utc> {
        self.created_time
    }

    pub fn quorate_time(&self) -> Option<DateTime<Utc>> {
        self.quorate_time
    }

    pub fn commence_time(&self) -> Option<DateTime<Utc>> {
        self.commence_time
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn ready_deadline(&self) -> Option<DateTime<Utc>> {
        self.ready_deadline
    }

    /// Participants still to confirm, in signup order.
    pub fn not_ready(&self) -> Vec<ParticipantId> {
        self.participants
            .iter()
            .filter(|p| self.not_ready.contains(*p))
            .cloned()
            .collect()
    }

    pub fn is_not_ready(&self, participant: &ParticipantId) -> bool {
        self.not_ready.contains(participant)
    }

    /// Samples every guard predicate.
    pub fn guards(&self, activity: &str, area: &Area, now: DateTime<Utc>) -> Guards {
        Guards {
            has_players: !self.participants.is_empty(),
            has_space: self.has_space(),
            is_future_game: self.slot.is_future(now),
            is_held: self.hold.is_some(),
            is_area_busy: area.is_busy(&GameRef::new(activity, self.id)),
            are_players_ready: self.not_ready.is_empty(),
        }
    }

    /// Appends whoever fits and is not already in. Returns who was added.
    pub(crate) fn add(&mut self, participants: &[ParticipantId]) -> Vec<ParticipantId> {
        let mut added = Vec::new();
        for p in participants {
            if self.contains(p) || !self.has_space() {
                continue;
            }
            self.participants.push(p.clone());
            added.push(p.clone());
        }
        added
    }

    /// Removes the given participants. Any removal unlocks a ready mark.
    pub(crate) fn remove(&mut self, participants: &[ParticipantId]) -> Vec<ParticipantId> {
        let removed: Vec<_> = participants
            .iter()
            .filter(|p| self.contains(p))
            .cloned()
            .collect();
        if !removed.is_empty() {
            self.participants.retain(|p| !removed.contains(p));
            for p in &removed {
                self.not_ready.remove(p);
            }
            self.unlock();
        }
        removed
    }

    pub(crate) fn lock(&mut self) {
        self.capacity = Capacity::LockedAt(self.participants.len());
    }

    pub(crate) fn unlock(&mut self) {
        self.capacity = Capacity::for_max(self.max);
    }

    /// The persisted mirror of this game.
    pub fn to_record(&self, activity: &str) -> GameRecord {
        GameRecord {
            activity: activity.to_string(),
            slot: self.slot,
            created_time: self.created_time,
            quorate_time: self.quorate_time,
            participants: self.participants.clone(),
            flexible_ready: self.is_flexible_ready(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn nine() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn ps(names: &[&str]) -> Vec<ParticipantId> {
        names.iter().map(|n| ParticipantId::new(*n)).collect()
    }

    #[test]
    fn test_bounded_game_stops_at_max() {
        let mut game = Game::new(GameId(1), Slot::Now, 2, nine());
        let added = game.add(&ps(&["a", "b", "c"]));
        assert_eq!(added, ps(&["a", "b"]));
        assert!(!game.has_space());
        assert_eq!(game.spaces_left(), Some(0));
    }

    #[test]
    fn test_add_skips_existing_members() {
        let mut game = Game::new(GameId(1), Slot::Now, 4, nine());
        game.add(&ps(&["a"]));
        assert!(game.add(&ps(&["a"])).is_empty());
        assert_eq!(game.len(), 1);
    }

    #[test]
    fn test_unbounded_game_always_has_space_until_locked() {
        let mut game = Game::new(GameId(1), Slot::Now, 0, nine());
        game.add(&ps(&["a", "b", "c"]));
        assert!(game.has_space());
        assert_eq!(game.spaces_left(), None);

        game.lock();
        assert!(!game.has_space());
        assert!(game.is_flexible_ready());
        assert_eq!(game.capacity(), Capacity::LockedAt(3));
        assert!(game.add(&ps(&["d"])).is_empty());
    }

    #[test]
    fn test_removal_unlocks_and_clears_not_ready() {
        let mut game = Game::new(GameId(1), Slot::Now, 0, nine());
        game.add(&ps(&["a", "b"]));
        game.lock();
        game.not_ready.insert(ParticipantId::new("b"));

        let removed = game.remove(&ps(&["b", "zed"]));
        assert_eq!(removed, ps(&["b"]));
        assert_eq!(game.capacity(), Capacity::Unbounded);
        assert!(game.not_ready().is_empty());
    }

    #[test]
    fn test_not_ready_keeps_signup_order() {
        let mut game = Game::new(GameId(1), Slot::Now, 4, nine());
        game.add(&ps(&["d", "c", "b", "a"]));
        game.not_ready.extend(ps(&["a", "c"]));
        assert_eq!(game.not_ready(), ps(&["c", "a"]));
    }

    #[test]
    fn test_guards_reflect_game_and_area() {
        let mut game = Game::new(GameId(1), Slot::At(nine()), 2, nine());
        game.add(&ps(&["a", "b"]));
        let mut area = Area::new("table", 1);
        area.admit(GameRef::new("pool", GameId(9)));

        let g = game.guards("pool", &area, nine() - chrono::Duration::minutes(5));
        assert!(g.has_players);
        assert!(!g.has_space);
        assert!(g.is_future_game);
        assert!(!g.is_held);
        assert!(g.is_area_busy);
        assert!(g.are_players_ready);

        let g = game.guards("pool", &area, nine());
        assert!(!g.is_future_game, "a slot is not future once it arrives");
    }

    #[test]
    fn test_record_mirrors_fields() {
        let mut game = Game::new(GameId(1), Slot::Now, 0, nine());
        game.add(&ps(&["a", "b"]));
        game.lock();
        let record = game.to_record("lunch");
        assert_eq!(record.activity, "lunch");
        assert_eq!(record.participants, ps(&["a", "b"]));
        assert!(record.flexible_ready);
        assert_eq!(record.created_time, nine());
    }
}
