//! Persisted game records.
//!
//! A record is a mirror of the fields of a game that cannot be re-derived
//! on restart: who signed up, in what order, for which slot, and when.
//! The state itself is never stored; replaying the participants through
//! the state machine reproduces it.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ParticipantId, ProtocolError, RecordId, Slot};

/// The persisted form of one outstanding game.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    /// Name of the activity this game belongs to.
    pub activity: String,

    /// The slot the game is currently filed under. Games promoted from a
    /// stale slot are rewritten with [`Slot::Now`].
    pub slot: Slot,

    /// When the game was first created.
    pub created_time: DateTime<Utc>,

    /// When the game last reached quorum, if it is quorate.
    pub quorate_time: Option<DateTime<Utc>>,

    /// Participants in signup order.
    pub participants: Vec<ParticipantId>,

    /// Whether a flexible game was marked ready. Absent in records for
    /// fixed-size activities.
    #[serde(default)]
    pub flexible_ready: bool,
}

impl GameRecord {
    /// Sort key used when restoring: quorate games first (earliest quorum
    /// first), then the rest, ties broken by creation time.
    ///
    /// Replaying in this order hands area queue positions out the same way
    /// they were handed out before the restart.
    pub fn restore_key(&self) -> (bool, Option<DateTime<Utc>>, DateTime<Utc>) {
        (
            self.quorate_time.is_none(),
            self.quorate_time,
            self.created_time,
        )
    }

    /// Rejects records that could never have been written by a live game.
    ///
    /// # Errors
    /// Returns [`ProtocolError::InvalidRecord`] if the activity name is
    /// empty, the participant list is empty, or a participant is listed
    /// twice.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.activity.is_empty() {
            return Err(ProtocolError::InvalidRecord(
                "record has no activity".into(),
            ));
        }
        if self.participants.is_empty() {
            return Err(ProtocolError::InvalidRecord(format!(
                "record for {} at {} has no participants",
                self.activity, self.slot
            )));
        }
        let mut seen = HashSet::new();
        for p in &self.participants {
            if !seen.insert(p) {
                return Err(ProtocolError::InvalidRecord(format!(
                    "participant {p} listed twice"
                )));
            }
        }
        Ok(())
    }
}

/// A record together with the id the store filed it under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Store-assigned id.
    pub id: RecordId,
    /// The record contents.
    pub record: GameRecord,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn record(quorate: Option<u32>, created: u32) -> GameRecord {
        GameRecord {
            activity: "tt".into(),
            slot: Slot::Now,
            created_time: Utc.with_ymd_and_hms(2024, 5, 1, 9, created, 0).unwrap(),
            quorate_time: quorate
                .map(|m| Utc.with_ymd_and_hms(2024, 5, 1, 10, m, 0).unwrap()),
            participants: vec!["a".into(), "b".into()],
            flexible_ready: false,
        }
    }

    #[test]
    fn test_restore_key_puts_quorate_games_first() {
        let mut recs = vec![record(None, 1), record(Some(5), 3), record(Some(2), 4)];
        recs.sort_by_key(GameRecord::restore_key);
        assert_eq!(recs[0].quorate_time, record(Some(2), 0).quorate_time);
        assert_eq!(recs[1].quorate_time, record(Some(5), 0).quorate_time);
        assert!(recs[2].quorate_time.is_none());
    }

    #[test]
    fn test_restore_key_breaks_ties_on_creation() {
        let mut recs = vec![record(None, 7), record(None, 2)];
        recs.sort_by_key(GameRecord::restore_key);
        assert_eq!(recs[0].created_time, record(None, 2).created_time);
    }

    #[test]
    fn test_validate_rejects_duplicates_and_empties() {
        assert!(record(None, 0).validate().is_ok());

        let mut dup = record(None, 0);
        dup.participants.push("a".into());
        assert!(matches!(dup.validate(), Err(ProtocolError::InvalidRecord(_))));

        let mut empty = record(None, 0);
        empty.participants.clear();
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_flexible_ready_defaults_when_absent() {
        let json = r#"{"activity":"tt","slot":null,
            "created_time":"2024-05-01T09:00:00Z","quorate_time":null,
            "participants":["a"]}"#;
        let rec: GameRecord = serde_json::from_str(json).unwrap();
        assert!(!rec.flexible_ready);
        assert_eq!(rec.slot, Slot::Now);
    }
}
