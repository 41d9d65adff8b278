//! Area resource arbitration.
//!
//! An area tracks which games hold it ("rolling") and which are waiting
//! for it, in strict arrival order. It holds only [`GameRef`]s; the games
//! themselves belong to their managers, which keep the area in step on
//! every transition that changes residency.

use std::collections::VecDeque;
use std::fmt;

use quorum_protocol::{GameId, ParticipantId};
use serde::Serialize;

/// A non-owning reference to a game in some manager.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GameRef {
    pub activity: String,
    pub game: GameId,
}

impl GameRef {
    pub fn new(activity: impl Into<String>, game: GameId) -> Self {
        Self {
            activity: activity.into(),
            game,
        }
    }
}

impl fmt::Display for GameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.activity, self.game)
    }
}

/// A manual "area is busy" override.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BusyMark {
    pub holder: ParticipantId,
    pub reason: Option<String>,
}

/// A capacity-limited shared resource.
///
/// Invariants:
/// - a game is in at most one of `queue` and `rolling`;
/// - `queue` is FIFO;
/// - with a non-zero capacity, `rolling.len()` plus one for a manual busy
///   mark never exceeds `capacity`.
#[derive(Debug)]
pub struct Area {
    name: String,
    capacity: usize,
    queue: VecDeque<GameRef>,
    rolling: Vec<GameRef>,
    manual_busy: Option<BusyMark>,
}

impl Area {
    /// Creates an idle area. A capacity of 0 means unlimited.
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            name: name.into(),
            capacity,
            queue: VecDeque::new(),
            rolling: Vec::new(),
            manual_busy: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether `game` would have to wait for this area.
    ///
    /// A manual busy mark blocks everyone. Otherwise a game that already
    /// holds the area is never blocked by itself, anyone else waits behind
    /// a non-empty queue, and then capacity decides.
    pub fn is_busy(&self, game: &GameRef) -> bool {
        if self.manual_busy.is_some() {
            return true;
        }
        if self.rolling.contains(game) {
            return false;
        }
        if !self.queue.is_empty() {
            return true;
        }
        self.is_full()
    }

    fn is_full(&self) -> bool {
        self.capacity > 0 && self.occupancy() >= self.capacity
    }

    /// Rolling games plus the manual busy mark.
    pub fn occupancy(&self) -> usize {
        self.rolling.len() + usize::from(self.manual_busy.is_some())
    }

    /// Adds `game` to the back of the queue unless it is already there.
    /// A game that held the area gives it up to wait.
    pub fn enqueue(&mut self, game: GameRef) {
        self.rolling.retain(|g| g != &game);
        if !self.queue.contains(&game) {
            tracing::debug!(area = %self.name, %game, "queued for area");
            self.queue.push_back(game);
        }
    }

    /// Removes `game` from the queue if present.
    pub fn dequeue(&mut self, game: &GameRef) -> bool {
        let before = self.queue.len();
        self.queue.retain(|g| g != game);
        before != self.queue.len()
    }

    /// Reserves the area for `game`, taking it out of the queue.
    pub fn admit(&mut self, game: GameRef) {
        self.dequeue(&game);
        if !self.rolling.contains(&game) {
            tracing::debug!(area = %self.name, %game, "area reserved");
            self.rolling.push(game);
        }
    }

    /// Drops every claim `game` has on the area, queued or rolling.
    pub fn release(&mut self, game: &GameRef) -> bool {
        let queued = self.dequeue(game);
        let before = self.rolling.len();
        self.rolling.retain(|g| g != game);
        let rolled = before != self.rolling.len();
        if rolled {
            tracing::debug!(area = %self.name, %game, "area released");
        }
        queued || rolled
    }

    /// Hands the area to the head of the queue if there is room.
    ///
    /// The granted game moves straight into the rolling set, so when it
    /// re-checks [`is_busy`](Self::is_busy) it finds itself unblocked.
    pub fn grant_next(&mut self) -> Option<GameRef> {
        if self.manual_busy.is_some() || self.is_full() {
            return None;
        }
        let game = self.queue.pop_front()?;
        tracing::debug!(area = %self.name, %game, "area granted to next in queue");
        self.rolling.push(game.clone());
        Some(game)
    }

    /// 1-based queue position, for status lines.
    pub fn queue_position(&self, game: &GameRef) -> Option<usize> {
        self.queue.iter().position(|g| g == game).map(|i| i + 1)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_rolling(&self, game: &GameRef) -> bool {
        self.rolling.contains(game)
    }

    pub fn queued(&self) -> impl Iterator<Item = &GameRef> {
        self.queue.iter()
    }

    pub fn rolling(&self) -> impl Iterator<Item = &GameRef> {
        self.rolling.iter()
    }

    pub fn busy_mark(&self) -> Option<&BusyMark> {
        self.manual_busy.as_ref()
    }

    /// Marks the area busy by hand. Returns `false` if that would exceed
    /// capacity.
    pub fn set_busy(&mut self, holder: ParticipantId, reason: Option<String>) -> bool {
        if self.manual_busy.is_none() && self.is_full() {
            return false;
        }
        tracing::info!(area = %self.name, %holder, "area marked busy");
        self.manual_busy = Some(BusyMark { holder, reason });
        true
    }

    /// Clears the manual busy mark. Returns the mark that was there.
    pub fn clear_busy(&mut self) -> Option<BusyMark> {
        let mark = self.manual_busy.take();
        if mark.is_some() {
            tracing::info!(area = %self.name, "area no longer busy");
        }
        mark
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn g(n: u64) -> GameRef {
        GameRef::new("pool", GameId(n))
    }

    #[test]
    fn test_unlimited_area_is_never_full() {
        let mut area = Area::new("lawn", 0);
        for n in 0..10 {
            area.admit(g(n));
        }
        assert!(!area.is_busy(&g(99)));
    }

    #[test]
    fn test_capacity_blocks_newcomers_but_not_holders() {
        let mut area = Area::new("table", 1);
        area.admit(g(1));
        assert!(!area.is_busy(&g(1)));
        assert!(area.is_busy(&g(2)));
    }

    #[test]
    fn test_queue_blocks_even_with_room() {
        let mut area = Area::new("courts", 2);
        area.enqueue(g(1));
        assert!(area.is_busy(&g(2)), "no cutting the line");
    }

    #[test]
    fn test_manual_busy_blocks_holders_too() {
        let mut area = Area::new("courts", 3);
        area.admit(g(1));
        assert!(area.set_busy(ParticipantId::new("ops"), Some("cleaning".into())));
        assert!(area.is_busy(&g(1)));
        assert_eq!(area.occupancy(), 2);
        assert!(area.clear_busy().is_some());
        assert!(!area.is_busy(&g(1)));
    }

    #[test]
    fn test_manual_busy_refused_when_full() {
        let mut area = Area::new("table", 1);
        area.admit(g(1));
        assert!(!area.set_busy(ParticipantId::new("ops"), None));
        assert!(area.busy_mark().is_none());
    }

    #[test]
    fn test_enqueue_is_idempotent_and_fifo() {
        let mut area = Area::new("table", 1);
        area.enqueue(g(3));
        area.enqueue(g(1));
        area.enqueue(g(3));
        assert_eq!(area.queue_len(), 2);
        assert_eq!(area.queue_position(&g(3)), Some(1));
        assert_eq!(area.queue_position(&g(1)), Some(2));
        assert_eq!(area.queue_position(&g(7)), None);
    }

    #[test]
    fn test_release_drops_queue_and_rolling_claims() {
        let mut area = Area::new("table", 1);
        area.enqueue(g(2));
        assert!(area.release(&g(2)));
        area.admit(g(1));
        assert!(area.release(&g(1)));
        assert!(!area.release(&g(1)));
        assert_eq!(area.occupancy(), 0);
    }

    #[test]
    fn test_admit_moves_game_out_of_queue() {
        let mut area = Area::new("table", 1);
        area.enqueue(g(1));
        area.admit(g(1));
        assert_eq!(area.queue_len(), 0);
        assert!(area.is_rolling(&g(1)));
    }

    #[test]
    fn test_grant_next_respects_capacity_and_order() {
        let mut area = Area::new("table", 1);
        area.admit(g(1));
        area.enqueue(g(2));
        area.enqueue(g(3));
        assert_eq!(area.grant_next(), None);

        area.release(&g(1));
        assert_eq!(area.grant_next(), Some(g(2)));
        assert_eq!(area.grant_next(), None);
        assert!(!area.is_busy(&g(2)));
        assert_eq!(area.queue_position(&g(3)), Some(1));
    }

    #[test]
    fn test_grant_next_waits_for_manual_busy() {
        let mut area = Area::new("table", 0);
        area.enqueue(g(1));
        area.set_busy(ParticipantId::new("ops"), None);
        assert_eq!(area.grant_next(), None);
        area.clear_busy();
        assert_eq!(area.grant_next(), Some(g(1)));
    }
}
