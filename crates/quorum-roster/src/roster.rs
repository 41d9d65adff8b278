//! The roster: tracks when participants were last seen and which of them
//! are committed to a game that has already commenced.
//!
//! # Concurrency note
//!
//! `Roster` is a plain `HashMap` owned by the venue. The venue runs in a
//! single task, so nothing here needs locking.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use quorum_clock::SharedClock;
use quorum_protocol::ParticipantId;

use crate::{ParticipantStatus, Presence, RosterConfig, RosterEntry};

/// Presence directory for every participant the venue has heard from.
pub struct Roster {
    entries: HashMap<ParticipantId, RosterEntry>,
    config: RosterConfig,
    clock: SharedClock,
}

impl Roster {
    /// Creates an empty roster reading time from `clock`.
    pub fn new(config: RosterConfig, clock: SharedClock) -> Self {
        Self {
            entries: HashMap::new(),
            config,
            clock,
        }
    }

    /// Records that `participant` just did something.
    ///
    /// Returns `true` if they were idle (or unknown) beforehand, which is
    /// the caller's cue to mark them ready in any game waiting on them.
    pub fn touch(&mut self, participant: &ParticipantId) -> bool {
        let was_idle = self.is_idle(participant);
        let now = self.clock.now();
        self.entries
            .entry(participant.clone())
            .or_default()
            .last_seen = Some(now);
        if was_idle {
            tracing::debug!(%participant, "participant active again");
        }
        was_idle
    }

    /// Marks `participant` as committed to a commenced game for the
    /// configured commitment length.
    pub fn commit(&mut self, participant: &ParticipantId) {
        let until = self.clock.now()
            + chrono::Duration::from_std(self.config.commitment())
                .unwrap_or(chrono::Duration::zero());
        self.entries
            .entry(participant.clone())
            .or_default()
            .committed_until = Some(until);
        tracing::debug!(%participant, %until, "participant committed");
    }

    /// Clears a commitment early (for example, the game was abandoned).
    pub fn release(&mut self, participant: &ParticipantId) {
        if let Some(entry) = self.entries.get_mut(participant) {
            entry.committed_until = None;
        }
    }

    /// Clears every commitment that has run out and returns whose.
    pub fn expire_commitments(&mut self) -> Vec<ParticipantId> {
        let now = self.clock.now();
        let mut expired = Vec::new();
        for (participant, entry) in &mut self.entries {
            if entry.committed_until.is_some_and(|until| until <= now) {
                entry.committed_until = None;
                expired.push(participant.clone());
            }
        }
        expired
    }

    /// The participant's current status.
    pub fn status(&self, participant: &ParticipantId) -> ParticipantStatus {
        let Some(last_seen) = self.entries.get(participant).and_then(|e| e.last_seen)
        else {
            return ParticipantStatus::Unknown;
        };
        if self.idle_since(last_seen) {
            ParticipantStatus::Idle { last_seen }
        } else {
            ParticipantStatus::Active { last_seen }
        }
    }

    /// Looks up the raw entry for a participant.
    pub fn get(&self, participant: &ParticipantId) -> Option<&RosterEntry> {
        self.entries.get(participant)
    }

    /// The configuration in force.
    pub fn config(&self) -> &RosterConfig {
        &self.config
    }

    /// Number of participants the roster knows about.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if nobody has been seen yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn idle_since(&self, last_seen: DateTime<Utc>) -> bool {
        let quiet = self.clock.now() - last_seen;
        quiet.to_std().is_ok_and(|q| q > self.config.idle_threshold())
    }
}

impl Presence for Roster {
    fn is_committed_elsewhere(&self, participant: &ParticipantId) -> bool {
        let now = self.clock.now();
        self.entries
            .get(participant)
            .and_then(|e| e.committed_until)
            .is_some_and(|until| until > now)
    }

    fn is_idle(&self, participant: &ParticipantId) -> bool {
        !matches!(self.status(participant), ParticipantStatus::Active { .. })
    }
}
