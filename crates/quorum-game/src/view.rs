//! Read-only snapshots of games and areas, and their status lines.

use std::fmt;

use chrono::{DateTime, Utc};
use quorum_protocol::{GameId, ParticipantId, Slot};
use serde::Serialize;

use crate::area::{Area, BusyMark, GameRef};
use crate::config::ActivityConfig;
use crate::game::{Game, Hold};
use crate::machine::GameState;

// ---------------------------------------------------------------------------
// GameView
// ---------------------------------------------------------------------------

/// A game as it looked at one instant.
///
/// `Display` renders the one-line status used in announcements, e.g.
/// `Game for 12:30 <2> -- amy, bo +2`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GameView {
    pub activity: String,
    pub id: GameId,
    pub slot: Slot,
    /// Position among the games for the same slot, from 0.
    pub index: usize,
    pub state: GameState,
    pub participants: Vec<ParticipantId>,
    /// `None` when the activity is unbounded and not marked ready.
    pub spaces_left: Option<usize>,
    pub flexible_ready: bool,
    pub hold: Option<Hold>,
    /// `(position, queue length)` while waiting for the area.
    pub queue_position: Option<(usize, usize)>,
    /// Seconds left for idle participants to confirm.
    pub ready_secs_left: Option<i64>,
    pub not_ready: Vec<ParticipantId>,
    /// Seconds until a scheduled slot arrives.
    pub starts_in_secs: Option<i64>,
    pub created_time: DateTime<Utc>,
    /// Set when the game was created on an earlier day than `now`.
    pub created_earlier: bool,
    pub team_size: usize,
}

impl GameView {
    /// Captures `game` as seen from its activity and area.
    pub fn capture(
        activity: &ActivityConfig,
        game: &Game,
        index: usize,
        area: &Area,
        now: DateTime<Utc>,
    ) -> Self {
        let gref = GameRef::new(activity.name.clone(), game.id());
        Self {
            activity: activity.name.clone(),
            id: game.id(),
            slot: game.slot(),
            index,
            state: game.state(),
            participants: game.participants().to_vec(),
            spaces_left: game.spaces_left(),
            flexible_ready: game.is_flexible_ready(),
            hold: game.hold().cloned(),
            queue_position: area
                .queue_position(&gref)
                .map(|pos| (pos, area.queue_len())),
            ready_secs_left: game
                .ready_deadline()
                .map(|deadline| (deadline - now).num_seconds().max(0)),
            not_ready: game.not_ready(),
            starts_in_secs: game
                .slot()
                .time()
                .filter(|t| *t > now)
                .map(|t| (t - now).num_seconds()),
            created_time: game.created_time(),
            created_earlier: game.created_time().date_naive() != now.date_naive(),
            team_size: activity.team_size,
        }
    }

    fn players(&self) -> String {
        player_list(&self.participants, self.team_size)
    }

    fn time(&self) -> String {
        let mut time = self.slot.to_string();
        if self.index > 0 {
            time.push_str(&format!(" <{}>", self.index + 1));
        }
        if self.created_earlier {
            time.push_str(&format!(
                " (created {})",
                self.created_time.format("%Y-%m-%d %H:%M:%S")
            ));
        }
        time
    }
}

impl fmt::Display for GameView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.time();
        let players = self.players();
        match self.state {
            GameState::NotQuorate => match self.spaces_left {
                Some(spaces) => write!(f, "Game for {time} -- {players} +{spaces}"),
                None => write!(f, "Game for {time} -- {players} +any (until 'ready' issued)"),
            },
            GameState::WaitingForTime => write!(
                f,
                "Game for {time} -- {players}. Starting in {}",
                format_delta(self.starts_in_secs.unwrap_or(0))
            ),
            GameState::WaitingForArea => {
                let (place, length) = self.queue_position.unwrap_or((0, 0));
                write!(
                    f,
                    "Game for {time} -- {players}. Waiting until area is free -- queue position {place}/{length}"
                )
            }
            GameState::WaitingForHold => {
                let holder = self
                    .hold
                    .as_ref()
                    .map(|h| h.holder.to_string())
                    .unwrap_or_default();
                write!(f, "Game for {time} -- {players}. Waiting for unhold placed by {holder}")
            }
            GameState::PlayerCheck => write!(
                f,
                "Game for {time} -- {players}. Waiting {} secs for idle players: {}",
                self.ready_secs_left.unwrap_or(0),
                player_list(&self.not_ready, 0)
            ),
            GameState::Commencing => write!(f, "Game for {time} -- {players}. **ROLL**"),
            state => write!(f, "Game for {} state is {state}", self.slot),
        }
    }
}

/// Joins names with commas, or `a v b` for a singles match.
pub fn player_list(participants: &[ParticipantId], team_size: usize) -> String {
    if team_size == 1 && participants.len() == 2 {
        return format!("{} v {}", participants[0], participants[1]);
    }
    participants
        .iter()
        .map(ParticipantId::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// `H:MM:SS`, with a day count in front past 24 hours.
pub fn format_delta(secs: i64) -> String {
    let secs = secs.max(0);
    let (days, rest) = (secs / 86_400, secs % 86_400);
    let (h, m, s) = (rest / 3600, rest % 3600 / 60, rest % 60);
    match days {
        0 => format!("{h}:{m:02}:{s:02}"),
        1 => format!("1 day, {h}:{m:02}:{s:02}"),
        d => format!("{d} days, {h}:{m:02}:{s:02}"),
    }
}

// ---------------------------------------------------------------------------
// AreaView
// ---------------------------------------------------------------------------

/// An area's occupancy at one instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AreaView {
    pub name: String,
    pub capacity: usize,
    pub rolling: Vec<GameRef>,
    pub queued: Vec<GameRef>,
    pub busy: Option<BusyMark>,
}

impl AreaView {
    pub fn capture(area: &Area) -> Self {
        Self {
            name: area.name().to_string(),
            capacity: area.capacity(),
            rolling: area.rolling().cloned().collect(),
            queued: area.queued().cloned().collect(),
            busy: area.busy_mark().cloned(),
        }
    }
}

impl fmt::Display for AreaView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let capacity = match self.capacity {
            0 => "unlimited".to_string(),
            n => n.to_string(),
        };
        write!(
            f,
            "Area {}: {} rolling of {capacity}, {} queued",
            self.name,
            self.rolling.len(),
            self.queued.len()
        )?;
        if let Some(mark) = &self.busy {
            write!(f, ", busy ({}", mark.holder)?;
            if let Some(reason) = &mark.reason {
                write!(f, ": {reason}")?;
            }
            f.write_str(")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn view(state: GameState) -> GameView {
        GameView {
            activity: "pool".into(),
            id: GameId(1),
            slot: Slot::At(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()),
            index: 0,
            state,
            participants: vec!["amy".into(), "bo".into()],
            spaces_left: Some(2),
            flexible_ready: false,
            hold: None,
            queue_position: None,
            ready_secs_left: None,
            not_ready: Vec::new(),
            starts_in_secs: None,
            created_time: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
            created_earlier: false,
            team_size: 2,
        }
    }

    #[test]
    fn test_not_quorate_lines() {
        assert_eq!(
            view(GameState::NotQuorate).to_string(),
            "Game for 12:30 -- amy, bo +2"
        );
        let open = GameView {
            spaces_left: None,
            ..view(GameState::NotQuorate)
        };
        assert_eq!(
            open.to_string(),
            "Game for 12:30 -- amy, bo +any (until 'ready' issued)"
        );
    }

    #[test]
    fn test_second_game_for_slot_is_numbered() {
        let v = GameView {
            index: 1,
            ..view(GameState::NotQuorate)
        };
        assert!(v.to_string().starts_with("Game for 12:30 <2> --"));
    }

    #[test]
    fn test_waiting_lines() {
        let v = GameView {
            starts_in_secs: Some(25 * 60),
            ..view(GameState::WaitingForTime)
        };
        assert_eq!(v.to_string(), "Game for 12:30 -- amy, bo. Starting in 0:25:00");

        let v = GameView {
            queue_position: Some((1, 2)),
            ..view(GameState::WaitingForArea)
        };
        assert!(v.to_string().ends_with("queue position 1/2"));

        let v = GameView {
            hold: Some(Hold {
                holder: "cat".into(),
                reason: None,
            }),
            ..view(GameState::WaitingForHold)
        };
        assert!(v.to_string().ends_with("Waiting for unhold placed by cat"));
    }

    #[test]
    fn test_player_check_and_roll_lines() {
        let v = GameView {
            ready_secs_left: Some(42),
            not_ready: vec!["bo".into()],
            ..view(GameState::PlayerCheck)
        };
        assert_eq!(
            v.to_string(),
            "Game for 12:30 -- amy, bo. Waiting 42 secs for idle players: bo"
        );
        assert_eq!(
            view(GameState::Commencing).to_string(),
            "Game for 12:30 -- amy, bo. **ROLL**"
        );
    }

    #[test]
    fn test_singles_use_versus() {
        let v = GameView {
            team_size: 1,
            ..view(GameState::Commencing)
        };
        assert_eq!(v.to_string(), "Game for 12:30 -- amy v bo. **ROLL**");
    }

    #[test]
    fn test_format_delta() {
        assert_eq!(format_delta(59), "0:00:59");
        assert_eq!(format_delta(3 * 3600 + 61), "3:01:01");
        assert_eq!(format_delta(86_400 + 60), "1 day, 0:01:00");
        assert_eq!(format_delta(-5), "0:00:00");
    }

    #[test]
    fn test_area_view_line() {
        let mut area = Area::new("table", 1);
        area.admit(GameRef::new("pool", GameId(1)));
        area.enqueue(GameRef::new("pool", GameId(2)));
        assert_eq!(
            AreaView::capture(&area).to_string(),
            "Area table: 1 rolling of 1, 1 queued"
        );
    }
}
