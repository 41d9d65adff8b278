//! The venue: every activity, the areas they share, and the roster.
//!
//! A `Venue` owns all mutable game state for one deployment. Each
//! operation borrows one manager together with its area and the roster,
//! runs it, then settles the venue: participants of games that just
//! commenced are marked committed, and any area with room is handed to
//! the next queued game. Settling repeats until nothing changes, since a
//! handed-over game may itself commence and free the area again.
//!
//! Not thread-safe on its own. The `quorum` crate runs it inside a single
//! actor task.

use quorum_clock::SharedClock;
use quorum_protocol::{GameId, ParticipantId, Slot, StoredRecord};
use quorum_roster::Roster;

use crate::announce::SharedAnnouncer;
use crate::area::{Area, BusyMark, GameRef};
use crate::config::{ConfigError, VenueConfig};
use crate::error::{ActionError, GameError, InternalError};
use crate::manager::{Commenced, Env, GameManager};
use crate::store::SharedStore;
use crate::view::{AreaView, GameView};

pub struct Venue {
    areas: Vec<Area>,
    managers: Vec<GameManager>,
    /// `area_of[i]` indexes the area of `managers[i]`.
    area_of: Vec<usize>,
    roster: Roster,
    commenced: Vec<Commenced>,
}

impl Venue {
    /// Builds a venue from a validated configuration.
    ///
    /// An activity with no area gets an unlimited area of its own, named
    /// after the activity.
    pub fn new(
        config: &VenueConfig,
        clock: SharedClock,
        store: SharedStore,
        announcer: SharedAnnouncer,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut areas: Vec<Area> = config
            .areas
            .iter()
            .map(|a| Area::new(a.name.clone(), a.capacity))
            .collect();
        let mut managers = Vec::with_capacity(config.activities.len());
        let mut area_of = Vec::with_capacity(config.activities.len());

        for activity in &config.activities {
            let area = match &activity.area {
                Some(name) => areas.iter().position(|a| a.name() == name).ok_or_else(|| {
                    ConfigError::UnknownArea {
                        activity: activity.name.clone(),
                        area: name.clone(),
                    }
                })?,
                None => {
                    areas.push(Area::new(activity.name.clone(), 0));
                    areas.len() - 1
                }
            };
            managers.push(GameManager::new(
                activity.clone(),
                config.ready_timeout(),
                clock.clone(),
                store.clone(),
                announcer.clone(),
            ));
            area_of.push(area);
        }

        tracing::info!(
            activities = managers.len(),
            areas = areas.len(),
            "venue ready"
        );
        Ok(Self {
            areas,
            managers,
            area_of,
            roster: Roster::new(config.roster.clone(), clock),
            commenced: Vec::new(),
        })
    }

    // -----------------------------------------------------------------------
    // Participant commands
    // -----------------------------------------------------------------------

    /// Signs `participant` up for `activity` at `slot`.
    pub fn register(
        &mut self,
        activity: &str,
        slot: Slot,
        participant: &ParticipantId,
    ) -> Result<GameId, GameError> {
        let index = self.index_of(activity)?;
        self.touch(participant)?;
        self.run(index, |manager, env| manager.register(slot, participant, env))
    }

    pub fn unregister(
        &mut self,
        activity: &str,
        slot: Slot,
        participant: &ParticipantId,
    ) -> Result<GameId, GameError> {
        let index = self.index_of(activity)?;
        let id = self.run(index, |manager, env| {
            manager.unregister(slot, participant, env)
        })?;
        self.touch(participant)?;
        Ok(id)
    }

    pub fn set_ready_mark(
        &mut self,
        activity: &str,
        slot: Slot,
        participant: &ParticipantId,
        on: bool,
    ) -> Result<(), GameError> {
        let index = self.index_of(activity)?;
        self.touch(participant)?;
        self.run(index, |manager, env| {
            manager.set_ready_mark(slot, participant, on, env)
        })
    }

    pub fn set_hold(
        &mut self,
        activity: &str,
        slot: Slot,
        participant: &ParticipantId,
        reason: Option<String>,
    ) -> Result<(), GameError> {
        let index = self.index_of(activity)?;
        self.touch(participant)?;
        self.run(index, |manager, env| {
            manager.set_hold(slot, participant, reason, env)
        })
    }

    pub fn clear_hold(
        &mut self,
        activity: &str,
        slot: Slot,
        participant: &ParticipantId,
    ) -> Result<(), GameError> {
        let index = self.index_of(activity)?;
        self.touch(participant)?;
        self.run(index, |manager, env| manager.clear_hold(slot, participant, env))
    }

    /// Records activity from `participant` and marks them ready in every
    /// game waiting on them. Returns how many games that was.
    ///
    /// Call this for anything the participant says, not only commands.
    pub fn touch(&mut self, participant: &ParticipantId) -> Result<usize, GameError> {
        self.roster.touch(participant);
        let mut ready = 0;
        let mut first_error = None;
        for index in 0..self.managers.len() {
            match self.run(index, |manager, env| {
                manager.participant_ready(participant, env)
            }) {
                Ok(n) => ready += n,
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
        first_error.map_or(Ok(ready), Err)
    }

    // -----------------------------------------------------------------------
    // Area commands
    // -----------------------------------------------------------------------

    /// Marks an area busy by hand, e.g. someone is using the table without
    /// a game.
    ///
    /// # Errors
    /// [`ActionError::UnknownArea`], or [`ActionError::AreaInUse`] when the
    /// area is already at capacity.
    pub fn set_area_busy(
        &mut self,
        area: &str,
        holder: &ParticipantId,
        reason: Option<String>,
    ) -> Result<(), GameError> {
        let index = self.area_index(area)?;
        if !self.areas[index].set_busy(holder.clone(), reason) {
            return Err(ActionError::AreaInUse(area.to_string()).into());
        }
        Ok(())
    }

    /// Clears a manual busy mark and lets the queue move.
    pub fn clear_area_busy(&mut self, area: &str) -> Result<Option<BusyMark>, GameError> {
        let index = self.area_index(area)?;
        let mark = self.areas[index].clear_busy();
        self.settle()?;
        Ok(mark)
    }

    // -----------------------------------------------------------------------
    // Time and restore
    // -----------------------------------------------------------------------

    /// Fires every due timer in every activity.
    ///
    /// Every activity gets its turn even if an earlier one fails; the first
    /// error is returned.
    pub fn fire_due(&mut self) -> Result<(), GameError> {
        let expired = self.roster.expire_commitments();
        if !expired.is_empty() {
            tracing::debug!(count = expired.len(), "commitments expired");
        }
        let mut first_error = None;
        for index in 0..self.managers.len() {
            if let Err(err) = self.run(index, |manager, env| manager.fire_due(env)) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// The earliest timer across all activities.
    pub fn next_deadline(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        self.managers
            .iter()
            .filter_map(GameManager::next_deadline)
            .min()
    }

    /// Rebuilds games from stored records. Returns how many were restored.
    ///
    /// Quorate games go first, oldest quorum first, then the rest by
    /// creation time, so games that were ahead before a restart stay
    /// ahead in area queues. Invalid records, records for activities that
    /// no longer exist, and records whose participants are all already
    /// signed up are skipped. Restored participants count as active as of
    /// the restore.
    pub fn restore(&mut self, mut records: Vec<StoredRecord>) -> Result<usize, GameError> {
        records.sort_by_key(|stored| stored.record.restore_key());
        let mut restored = 0;
        for stored in &records {
            if let Err(err) = stored.record.validate() {
                tracing::warn!(record = %stored.id, error = %err, "invalid record skipped");
                continue;
            }
            let Ok(index) = self.index_of(&stored.record.activity) else {
                tracing::warn!(record = %stored.id, activity = %stored.record.activity, "record for unknown activity skipped");
                continue;
            };
            // A restart is not idleness: the idle clock starts over for
            // everyone still signed up.
            for participant in &stored.record.participants {
                self.roster.touch(participant);
            }
            if self
                .run(index, |manager, env| manager.restore_record(stored, env))?
                .is_some()
            {
                restored += 1;
            }
        }
        tracing::info!(restored, skipped = records.len() - restored, "games restored");
        Ok(restored)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn manager(&self, activity: &str) -> Option<&GameManager> {
        self.managers.iter().find(|m| m.activity().name == activity)
    }

    pub fn activities(&self) -> impl Iterator<Item = &str> {
        self.managers.iter().map(|m| m.activity().name.as_str())
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn area(&self, name: &str) -> Option<&Area> {
        self.areas.iter().find(|a| a.name() == name)
    }

    /// Status of every game of one activity.
    pub fn views(&self, activity: &str) -> Result<Vec<GameView>, ActionError> {
        let index = self.index_of(activity)?;
        Ok(self.managers[index].views(&self.areas[self.area_of[index]]))
    }

    /// Status of every game in the venue.
    pub fn all_views(&self) -> Vec<GameView> {
        self.managers
            .iter()
            .zip(&self.area_of)
            .flat_map(|(manager, area)| manager.views(&self.areas[*area]))
            .collect()
    }

    /// The activity's earliest game, if any.
    pub fn get_next_game(&self, activity: &str) -> Result<Option<GameView>, ActionError> {
        let index = self.index_of(activity)?;
        let manager = &self.managers[index];
        Ok(manager
            .get_next_game()
            .and_then(|game| manager.view(game.id(), &self.areas[self.area_of[index]])))
    }

    pub fn area_views(&self) -> Vec<AreaView> {
        self.areas.iter().map(AreaView::capture).collect()
    }

    /// Games that commenced since the last call, across all activities.
    pub fn take_commenced(&mut self) -> Vec<Commenced> {
        std::mem::take(&mut self.commenced)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    fn index_of(&self, activity: &str) -> Result<usize, ActionError> {
        self.managers
            .iter()
            .position(|m| m.activity().name == activity)
            .ok_or_else(|| ActionError::UnknownActivity(activity.to_string()))
    }

    fn area_index(&self, area: &str) -> Result<usize, ActionError> {
        self.areas
            .iter()
            .position(|a| a.name() == area)
            .ok_or_else(|| ActionError::UnknownArea(area.to_string()))
    }

    /// Runs `op` on one manager with its area and the roster, then settles.
    fn run<T>(
        &mut self,
        index: usize,
        op: impl FnOnce(&mut GameManager, &mut Env<'_>) -> Result<T, GameError>,
    ) -> Result<T, GameError> {
        let result = {
            let Self {
                areas,
                managers,
                area_of,
                roster,
                ..
            } = self;
            let mut env = Env {
                area: &mut areas[area_of[index]],
                presence: &*roster,
            };
            op(&mut managers[index], &mut env)
        };
        let settled = self.settle();
        let value = result?;
        settled?;
        Ok(value)
    }

    /// Commits participants of commenced games and hands free areas to
    /// queued games, until neither changes anything.
    fn settle(&mut self) -> Result<(), GameError> {
        let mut first_error = None;
        loop {
            self.commit_commenced();
            let mut granted = false;
            for area in 0..self.areas.len() {
                while let Some(game) = self.areas[area].grant_next() {
                    granted = true;
                    if let Err(err) = self.hand_over(area, &game) {
                        first_error.get_or_insert(err);
                    }
                }
            }
            if !granted {
                break;
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn commit_commenced(&mut self) {
        for manager in &mut self.managers {
            for game in manager.take_commenced() {
                for participant in &game.participants {
                    self.roster.commit(participant);
                }
                self.commenced.push(game);
            }
        }
    }

    fn hand_over(&mut self, area: usize, game: &GameRef) -> Result<(), GameError> {
        let owner = self
            .managers
            .iter()
            .position(|m| m.activity().name == game.activity)
            .filter(|index| self.area_of[*index] == area);
        let Some(index) = owner else {
            self.areas[area].release(game);
            tracing::error!(area = %self.areas[area].name(), %game, "area granted to a game no activity owns");
            return Err(InternalError::UnknownGame {
                area: self.areas[area].name().to_string(),
                activity: game.activity.clone(),
                game: game.game,
            }
            .into());
        };

        let Self {
            areas,
            managers,
            roster,
            ..
        } = self;
        let mut env = Env {
            area: &mut areas[area],
            presence: &*roster,
        };
        managers[index].area_ready(game.game, &mut env)
    }
}
