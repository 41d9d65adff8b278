//! The game state machine as a pure function.
//!
//! [`next`] looks at a state, a trigger, and a snapshot of the guard
//! predicates, and says where the game goes and which side effects the
//! move requires. It never touches a game, an area, or a timer; the
//! manager applies the returned [`Effect`]s in order and then sets the new
//! state.
//!
//! ```text
//!            PlayersAdded[space]                    PlayersAdded[full]
//!   Empty ─────────────────────→ NotQuorate ──────────────────────→ Quorate
//!                                    ↑                                │ Roll
//!                    PlayersRemoved  │          ┌─────────────────────┤
//!                    [players,space] │   [future]   [held]   [area busy]   [clear]
//!                                    │      ↓          ↓          ↓          ↓
//!                                    │  WaitingFor  WaitingFor WaitingFor  PlayerCheck ──→ Commencing
//!                                    │    Time        Hold       Area         │  PlayerReady[all ready]
//!                                    │                                        │ TimerFired
//!                                    └──────────────── PlayersNotReady ←──────┘
//! ```
//!
//! `Commencing` is terminal. Any trigger aimed at a commencing game is a
//! [`MachineError::Terminal`], never a silent no-op.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// GameState
// ---------------------------------------------------------------------------

/// Where a game is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GameState {
    /// No participants. A game only sits here for the instant before the
    /// manager deletes it.
    Empty,
    /// Has participants and room for more.
    NotQuorate,
    /// Just filled. Transient: `Roll` fires on entry.
    Quorate,
    /// Full, scheduled for a time that has not arrived.
    WaitingForTime,
    /// Full, but someone placed a hold.
    WaitingForHold,
    /// Full, queued for the area.
    WaitingForArea,
    /// Holding the area while idle participants confirm.
    PlayerCheck,
    /// The ready timeout lapsed with stragglers. Transient: the manager
    /// evicts them on entry.
    PlayersNotReady,
    /// Terminal. The game is announced and deleted.
    Commencing,
}

impl GameState {
    /// Every state, in declaration order.
    pub const ALL: [GameState; 9] = [
        Self::Empty,
        Self::NotQuorate,
        Self::Quorate,
        Self::WaitingForTime,
        Self::WaitingForHold,
        Self::WaitingForArea,
        Self::PlayerCheck,
        Self::PlayersNotReady,
        Self::Commencing,
    ];

    /// `true` once the game is commencing.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Commencing)
    }

    /// `true` for the states a full game parks in while something blocks it.
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            Self::WaitingForTime | Self::WaitingForHold | Self::WaitingForArea
        )
    }
}

impl fmt::Display for GameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Empty => "Empty",
            Self::NotQuorate => "NotQuorate",
            Self::Quorate => "Quorate",
            Self::WaitingForTime => "WaitingForTime",
            Self::WaitingForHold => "WaitingForHold",
            Self::WaitingForArea => "WaitingForArea",
            Self::PlayerCheck => "PlayerCheck",
            Self::PlayersNotReady => "PlayersNotReady",
            Self::Commencing => "Commencing",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Trigger / Guards
// ---------------------------------------------------------------------------

/// Events that can move a game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    PlayersAdded,
    PlayersRemoved,
    TimerFired,
    AreaReady,
    HoldSet,
    HoldCleared,
    PlayerReady,
    /// Fired by the manager on entry to `Quorate`.
    Roll,
}

impl Trigger {
    /// Every trigger, in declaration order.
    pub const ALL: [Trigger; 8] = [
        Self::PlayersAdded,
        Self::PlayersRemoved,
        Self::TimerFired,
        Self::AreaReady,
        Self::HoldSet,
        Self::HoldCleared,
        Self::PlayerReady,
        Self::Roll,
    ];
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Guard predicates, sampled from the game and its area just before the
/// transition is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Guards {
    pub has_players: bool,
    pub has_space: bool,
    pub is_future_game: bool,
    pub is_held: bool,
    pub is_area_busy: bool,
    pub are_players_ready: bool,
}

impl Guards {
    /// Something other than the participants stands between the game and
    /// `PlayerCheck`.
    pub fn is_blocked(&self) -> bool {
        self.is_future_game || self.is_held || self.is_area_busy
    }
}

// ---------------------------------------------------------------------------
// Effects / Transition
// ---------------------------------------------------------------------------

/// A side effect the manager must carry out for a transition.
///
/// Exit effects of the old state come first, then entry effects of the
/// new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Unlock a flexible game's ready mark.
    ClearFlexibleReady,
    ClearQuorumTime,
    /// Record when quorum was reached, keeping an earlier stamp.
    StampQuorumTime,
    /// Queue `Roll` for this game.
    FireRoll,
    StampCommenceTime,
    /// Join the back of the area queue.
    Enqueue,
    /// Leave the area queue.
    Dequeue,
    /// Work out who is not ready, reserving the area and arming the
    /// ready timeout as needed.
    BeginPlayerCheck,
    ClearNotReady,
    /// Give up the area reservation taken in `PlayerCheck`.
    ReleaseRolling,
    CancelReadyTimer,
}

/// The outcome of a trigger that applies to the current state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: GameState,
    pub to: GameState,
    pub trigger: Trigger,
    /// No exit or entry: the state is unchanged and nothing runs.
    pub internal: bool,
    pub effects: Vec<Effect>,
}

impl Transition {
    fn internal(state: GameState, trigger: Trigger) -> Self {
        Self {
            from: state,
            to: state,
            trigger,
            internal: true,
            effects: Vec::new(),
        }
    }

    fn external(from: GameState, to: GameState, trigger: Trigger) -> Self {
        let mut effects = Vec::new();
        exit_effects(from, to, &mut effects);
        entry_effects(to, &mut effects);
        Self {
            from,
            to,
            trigger,
            internal: false,
            effects,
        }
    }
}

/// The machine refused a trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MachineError {
    #[error("no trigger may leave Commencing (got {0})")]
    Terminal(Trigger),
}

// ---------------------------------------------------------------------------
// Transition function
// ---------------------------------------------------------------------------

/// Chooses the transition for `trigger` in `state`.
///
/// Returns `Ok(None)` when the trigger does not apply, which covers stale
/// timer firings and triggers queued before an earlier one moved the game.
///
/// # Errors
/// [`MachineError::Terminal`] for any trigger in `Commencing`.
pub fn next(
    state: GameState,
    trigger: Trigger,
    guards: &Guards,
) -> Result<Option<Transition>, MachineError> {
    use GameState::*;
    use Trigger::*;

    if state.is_terminal() {
        return Err(MachineError::Terminal(trigger));
    }

    let to = match (state, trigger) {
        (Empty, PlayersAdded) if guards.has_players && guards.has_space => NotQuorate,
        (NotQuorate, PlayersAdded) if guards.has_space => NotQuorate,
        (Empty | NotQuorate, PlayersAdded) if !guards.has_space => Quorate,

        (_, PlayersRemoved) if !guards.has_players => Empty,
        (_, PlayersRemoved) if guards.has_space => NotQuorate,

        (NotQuorate | WaitingForTime, HoldSet | HoldCleared) => {
            return Ok(Some(Transition::internal(state, trigger)));
        }
        (WaitingForArea | PlayerCheck, HoldSet) => WaitingForHold,

        // Fixed priority: time, then hold, then area.
        (Quorate, Roll) if guards.is_future_game => WaitingForTime,
        (Quorate, Roll) if guards.is_held => WaitingForHold,
        (Quorate, Roll) if guards.is_area_busy => WaitingForArea,
        (Quorate, Roll) => PlayerCheck,

        (WaitingForTime, TimerFired)
        | (WaitingForHold, HoldCleared)
        | (WaitingForArea, AreaReady) => {
            if guards.is_blocked() {
                Quorate
            } else {
                PlayerCheck
            }
        }

        (PlayerCheck, TimerFired) => PlayersNotReady,
        (PlayerCheck, PlayerReady) if guards.are_players_ready => Commencing,
        (PlayerCheck, PlayerReady) => {
            return Ok(Some(Transition::internal(state, trigger)));
        }

        _ => return Ok(None),
    };

    Ok(Some(Transition::external(state, to, trigger)))
}

fn exit_effects(from: GameState, to: GameState, out: &mut Vec<Effect>) {
    match from {
        GameState::WaitingForArea if to != GameState::PlayerCheck => {
            out.push(Effect::Dequeue);
        }
        GameState::PlayerCheck => {
            // PlayersNotReady still needs the not-ready set, and keeps the
            // area until the manager has evicted the idlers.
            if to != GameState::PlayersNotReady {
                out.push(Effect::ClearNotReady);
            }
            if !matches!(to, GameState::Commencing | GameState::PlayersNotReady) {
                out.push(Effect::ReleaseRolling);
            }
            out.push(Effect::CancelReadyTimer);
        }
        GameState::PlayersNotReady => out.push(Effect::ClearNotReady),
        _ => {}
    }
}

fn entry_effects(to: GameState, out: &mut Vec<Effect>) {
    match to {
        GameState::NotQuorate => {
            out.push(Effect::ClearFlexibleReady);
            out.push(Effect::ClearQuorumTime);
        }
        GameState::Quorate => {
            out.push(Effect::StampQuorumTime);
            out.push(Effect::FireRoll);
        }
        GameState::WaitingForArea => out.push(Effect::Enqueue),
        GameState::PlayerCheck => out.push(Effect::BeginPlayerCheck),
        GameState::Commencing => out.push(Effect::StampCommenceTime),
        _ => {}
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn guards() -> Guards {
        Guards {
            has_players: true,
            has_space: true,
            ..Guards::default()
        }
    }

    fn full() -> Guards {
        Guards {
            has_players: true,
            has_space: false,
            are_players_ready: true,
            ..Guards::default()
        }
    }

    fn to(state: GameState, trigger: Trigger, g: Guards) -> Option<GameState> {
        next(state, trigger, &g).unwrap().map(|t| t.to)
    }

    /// All 64 combinations of the six guard flags.
    fn every_guard_combination() -> impl Iterator<Item = Guards> {
        (0u8..64).map(|bits| Guards {
            has_players: bits & 1 != 0,
            has_space: bits & 2 != 0,
            is_future_game: bits & 4 != 0,
            is_held: bits & 8 != 0,
            is_area_busy: bits & 16 != 0,
            are_players_ready: bits & 32 != 0,
        })
    }

    // -- Filling -----------------------------------------------------------

    #[test]
    fn test_first_player_makes_game_not_quorate() {
        assert_eq!(
            to(GameState::Empty, Trigger::PlayersAdded, guards()),
            Some(GameState::NotQuorate)
        );
    }

    #[test]
    fn test_adding_with_space_left_stays_not_quorate() {
        let t = next(GameState::NotQuorate, Trigger::PlayersAdded, &guards())
            .unwrap()
            .unwrap();
        assert_eq!(t.to, GameState::NotQuorate);
        assert!(!t.internal);
    }

    #[test]
    fn test_filling_goes_quorate_and_rolls() {
        for from in [GameState::Empty, GameState::NotQuorate] {
            let t = next(from, Trigger::PlayersAdded, &full()).unwrap().unwrap();
            assert_eq!(t.to, GameState::Quorate);
            assert_eq!(t.effects, vec![Effect::StampQuorumTime, Effect::FireRoll]);
        }
    }

    #[test]
    fn test_adding_nobody_to_empty_game_does_nothing() {
        let g = Guards {
            has_players: false,
            has_space: true,
            ..Guards::default()
        };
        assert_eq!(to(GameState::Empty, Trigger::PlayersAdded, g), None);
    }

    // -- Removal -----------------------------------------------------------

    #[test]
    fn test_removal_from_any_live_state() {
        for state in GameState::ALL {
            if state.is_terminal() {
                continue;
            }
            assert_eq!(
                to(state, Trigger::PlayersRemoved, guards()),
                Some(GameState::NotQuorate),
                "from {state}"
            );
            let nobody = Guards {
                has_players: false,
                has_space: true,
                ..Guards::default()
            };
            assert_eq!(
                to(state, Trigger::PlayersRemoved, nobody),
                Some(GameState::Empty),
                "from {state}"
            );
        }
    }

    #[test]
    fn test_removal_that_leaves_game_full_does_nothing() {
        assert_eq!(to(GameState::WaitingForArea, Trigger::PlayersRemoved, full()), None);
    }

    #[test]
    fn test_leaving_player_check_releases_everything() {
        let t = next(GameState::PlayerCheck, Trigger::PlayersRemoved, &guards())
            .unwrap()
            .unwrap();
        assert_eq!(
            t.effects,
            vec![
                Effect::ClearNotReady,
                Effect::ReleaseRolling,
                Effect::CancelReadyTimer,
                Effect::ClearFlexibleReady,
                Effect::ClearQuorumTime,
            ]
        );
    }

    // -- Roll priority ------------------------------------------------------

    #[test]
    fn test_roll_priority_is_time_then_hold_then_area() {
        let all = Guards {
            is_future_game: true,
            is_held: true,
            is_area_busy: true,
            ..full()
        };
        assert_eq!(to(GameState::Quorate, Trigger::Roll, all), Some(GameState::WaitingForTime));

        let held_and_busy = Guards {
            is_future_game: false,
            ..all
        };
        assert_eq!(
            to(GameState::Quorate, Trigger::Roll, held_and_busy),
            Some(GameState::WaitingForHold)
        );

        let busy = Guards {
            is_held: false,
            ..held_and_busy
        };
        assert_eq!(to(GameState::Quorate, Trigger::Roll, busy), Some(GameState::WaitingForArea));

        assert_eq!(to(GameState::Quorate, Trigger::Roll, full()), Some(GameState::PlayerCheck));
    }

    #[test]
    fn test_roll_always_lands_in_exactly_one_resolution() {
        for g in every_guard_combination() {
            let dest = to(GameState::Quorate, Trigger::Roll, g).unwrap();
            assert!(
                dest.is_waiting() || dest == GameState::PlayerCheck,
                "{g:?} gave {dest}"
            );
        }
    }

    #[test]
    fn test_roll_outside_quorate_is_ignored() {
        assert_eq!(to(GameState::NotQuorate, Trigger::Roll, full()), None);
        assert_eq!(to(GameState::PlayerCheck, Trigger::Roll, full()), None);
    }

    // -- Unblocking --------------------------------------------------------

    #[test]
    fn test_unblocking_goes_to_player_check_or_back_to_quorate() {
        let cases = [
            (GameState::WaitingForTime, Trigger::TimerFired),
            (GameState::WaitingForHold, Trigger::HoldCleared),
            (GameState::WaitingForArea, Trigger::AreaReady),
        ];
        for (state, trigger) in cases {
            assert_eq!(to(state, trigger, full()), Some(GameState::PlayerCheck));
            let busy = Guards {
                is_area_busy: true,
                ..full()
            };
            assert_eq!(to(state, trigger, busy), Some(GameState::Quorate));
        }
    }

    #[test]
    fn test_area_ready_keeps_queue_entry_for_player_check() {
        let t = next(GameState::WaitingForArea, Trigger::AreaReady, &full())
            .unwrap()
            .unwrap();
        assert!(!t.effects.contains(&Effect::Dequeue));
        assert_eq!(t.effects, vec![Effect::BeginPlayerCheck]);

        let blocked = Guards {
            is_held: true,
            ..full()
        };
        let t = next(GameState::WaitingForArea, Trigger::AreaReady, &blocked)
            .unwrap()
            .unwrap();
        assert_eq!(t.effects[0], Effect::Dequeue);
    }

    // -- Holds ---------------------------------------------------------------

    #[test]
    fn test_hold_before_quorum_is_internal() {
        for state in [GameState::NotQuorate, GameState::WaitingForTime] {
            for trigger in [Trigger::HoldSet, Trigger::HoldCleared] {
                let t = next(state, trigger, &guards()).unwrap().unwrap();
                assert!(t.internal);
                assert_eq!(t.to, state);
                assert!(t.effects.is_empty());
            }
        }
    }

    #[test]
    fn test_hold_interrupts_area_wait_and_player_check() {
        let held = Guards {
            is_held: true,
            ..full()
        };
        let t = next(GameState::WaitingForArea, Trigger::HoldSet, &held)
            .unwrap()
            .unwrap();
        assert_eq!(t.to, GameState::WaitingForHold);
        assert_eq!(t.effects, vec![Effect::Dequeue]);

        let t = next(GameState::PlayerCheck, Trigger::HoldSet, &held)
            .unwrap()
            .unwrap();
        assert_eq!(t.to, GameState::WaitingForHold);
        assert_eq!(
            t.effects,
            vec![
                Effect::ClearNotReady,
                Effect::ReleaseRolling,
                Effect::CancelReadyTimer
            ]
        );
    }

    // -- Player check --------------------------------------------------------

    #[test]
    fn test_ready_timeout_keeps_not_ready_set_and_area() {
        let t = next(GameState::PlayerCheck, Trigger::TimerFired, &full())
            .unwrap()
            .unwrap();
        assert_eq!(t.to, GameState::PlayersNotReady);
        assert_eq!(t.effects, vec![Effect::CancelReadyTimer]);
    }

    #[test]
    fn test_last_player_ready_commences() {
        let t = next(GameState::PlayerCheck, Trigger::PlayerReady, &full())
            .unwrap()
            .unwrap();
        assert_eq!(t.to, GameState::Commencing);
        assert_eq!(
            t.effects,
            vec![
                Effect::ClearNotReady,
                Effect::CancelReadyTimer,
                Effect::StampCommenceTime
            ]
        );
    }

    #[test]
    fn test_player_ready_with_stragglers_is_internal() {
        let waiting = Guards {
            are_players_ready: false,
            ..full()
        };
        let t = next(GameState::PlayerCheck, Trigger::PlayerReady, &waiting)
            .unwrap()
            .unwrap();
        assert!(t.internal);
        assert_eq!(t.to, GameState::PlayerCheck);
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        for state in [
            GameState::NotQuorate,
            GameState::WaitingForHold,
            GameState::WaitingForArea,
        ] {
            assert_eq!(to(state, Trigger::TimerFired, full()), None);
        }
    }

    // -- Terminal state ------------------------------------------------------

    #[test]
    fn test_commencing_rejects_every_trigger() {
        for trigger in Trigger::ALL {
            for g in every_guard_combination() {
                assert_eq!(
                    next(GameState::Commencing, trigger, &g),
                    Err(MachineError::Terminal(trigger))
                );
            }
        }
    }

    #[test]
    fn test_only_player_ready_reaches_commencing() {
        for state in GameState::ALL {
            if state.is_terminal() {
                continue;
            }
            for trigger in Trigger::ALL {
                for g in every_guard_combination() {
                    if let Some(t) = next(state, trigger, &g).unwrap() {
                        if t.to == GameState::Commencing {
                            assert_eq!(state, GameState::PlayerCheck);
                            assert_eq!(trigger, Trigger::PlayerReady);
                            assert!(g.are_players_ready);
                        }
                        if t.to == GameState::Empty {
                            assert_eq!(trigger, Trigger::PlayersRemoved);
                        }
                        assert_eq!(t.from, state);
                    }
                }
            }
        }
    }

    #[test]
    fn test_display_names() {
        assert_eq!(GameState::PlayersNotReady.to_string(), "PlayersNotReady");
        assert_eq!(Trigger::HoldCleared.to_string(), "HoldCleared");
    }
}
