//! The game manager: owns every game of one activity.
//!
//! The manager is the only thing that moves games. Every public operation
//! follows the same shape:
//!
//! 1. check the request against the rules and mutate membership or hold;
//! 2. queue the matching [`Trigger`];
//! 3. [`drain`](GameManager::drain): pop triggers one at a time, ask
//!    [`machine::next`] for the transition, apply its effects, and run the
//!    finalize step, which may queue further triggers (`Roll` on entry to
//!    `Quorate`, `PlayersRemoved` when evicting idlers, ...);
//! 4. once no triggers are left, run any queued reorganization (stale-slot
//!    promotion, compaction), which queues more triggers, and go back to 3.
//!
//! Reorganization requests made while one is running are queued and
//! deduplicated rather than dropped, so the loop always reaches the same
//! fixed point no matter which call site asked first.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::time::Duration;

use chrono::{DateTime, Utc};
use quorum_clock::{SharedClock, TimerWheel};
use quorum_protocol::{GameId, ParticipantId, Slot, StoredRecord};
use quorum_roster::Presence;

use crate::announce::SharedAnnouncer;
use crate::area::{Area, GameRef};
use crate::config::ActivityConfig;
use crate::error::{ActionError, GameError, InternalError};
use crate::game::{Game, Hold};
use crate::machine::{self, Effect, GameState, Transition, Trigger};
use crate::store::SharedStore;
use crate::view::{GameView, player_list};

/// What a manager borrows from its venue for the length of one operation.
pub struct Env<'a> {
    /// The area this manager's activity plays in.
    pub area: &'a mut Area,
    pub presence: &'a dyn Presence,
}

/// The manager's timers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKey {
    /// Idle participants of this game have run out of time.
    ReadyTimeout(GameId),
    /// The earliest scheduled slot has arrived.
    FutureSlot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Event {
    game: GameId,
    trigger: Trigger,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Reorg {
    Promote(Slot),
    Compact(Slot),
}

/// A game that reached `Commencing` and was removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commenced {
    pub activity: String,
    pub game: GameId,
    pub slot: Slot,
    pub participants: Vec<ParticipantId>,
    pub commence_time: DateTime<Utc>,
}

/// Owns the games of one activity, keyed by slot.
///
/// Within a slot, games are kept in insertion order; a second game for a
/// slot only appears once the first is full.
pub struct GameManager {
    activity: ActivityConfig,
    /// Never holds an empty list; the key is removed instead.
    games: BTreeMap<Slot, Vec<Game>>,
    slots: HashMap<GameId, Slot>,
    events: VecDeque<Event>,
    reorgs: VecDeque<Reorg>,
    reorg_active: bool,
    timers: TimerWheel<TimerKey>,
    ready_timeout: Duration,
    clock: SharedClock,
    store: SharedStore,
    announcer: SharedAnnouncer,
    next_id: u64,
    commenced: Vec<Commenced>,
}

impl GameManager {
    pub fn new(
        activity: ActivityConfig,
        ready_timeout: Duration,
        clock: SharedClock,
        store: SharedStore,
        announcer: SharedAnnouncer,
    ) -> Self {
        Self {
            activity,
            games: BTreeMap::new(),
            slots: HashMap::new(),
            events: VecDeque::new(),
            reorgs: VecDeque::new(),
            reorg_active: false,
            timers: TimerWheel::new(),
            ready_timeout,
            clock,
            store,
            announcer,
            next_id: 0,
            commenced: Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Public operations
    // -----------------------------------------------------------------------

    /// Signs `participant` up for `slot`.
    ///
    /// Joins the last game for the slot if it still has room, otherwise
    /// starts a new one.
    ///
    /// # Errors
    /// - [`ActionError::AlreadyRegistered`] if they are in a game for the
    ///   slot already.
    /// - [`ActionError::SlotInPast`] if a new game would be needed for a
    ///   time that has gone.
    pub fn register(
        &mut self,
        slot: Slot,
        participant: &ParticipantId,
        env: &mut Env<'_>,
    ) -> Result<GameId, GameError> {
        if self.member_of(slot, participant).is_some() {
            return Err(ActionError::AlreadyRegistered(slot).into());
        }
        let open = self
            .games
            .get(&slot)
            .and_then(|games| games.last())
            .filter(|g| g.state == GameState::NotQuorate)
            .map(|g| g.id);
        let id = match open {
            Some(id) => id,
            None => self.create_game(slot, false)?,
        };
        tracing::info!(activity = %self.activity.name, game = %id, %slot, %participant, "registered");
        self.add_participants(id, std::slice::from_ref(participant));
        self.drain(env)?;
        Ok(id)
    }

    /// Takes `participant` out of their game for `slot`.
    ///
    /// # Errors
    /// [`ActionError::NoGames`] or [`ActionError::NotRegistered`].
    pub fn unregister(
        &mut self,
        slot: Slot,
        participant: &ParticipantId,
        env: &mut Env<'_>,
    ) -> Result<GameId, GameError> {
        let id = self.find_member(slot, participant)?;
        tracing::info!(activity = %self.activity.name, game = %id, %slot, %participant, "unregistered");
        self.remove_participants(id, std::slice::from_ref(participant));
        self.drain(env)?;
        Ok(id)
    }

    /// Turns the ready mark of a flexible game on or off.
    ///
    /// A marked game counts as full: it goes quorate at its current size
    /// and takes nobody else.
    ///
    /// # Errors
    /// [`ActionError::NotFlexible`] for fixed-size activities,
    /// [`ActionError::NotEnoughPlayers`] when marking a game below the
    /// minimum, or the lookup errors of [`unregister`](Self::unregister).
    pub fn set_ready_mark(
        &mut self,
        slot: Slot,
        participant: &ParticipantId,
        on: bool,
        env: &mut Env<'_>,
    ) -> Result<(), GameError> {
        if !self.activity.is_flexible() {
            return Err(ActionError::NotFlexible(self.activity.name.clone()).into());
        }
        let id = self.find_member(slot, participant)?;
        let min = self.activity.min_players();
        let Some(game) = self.game_mut(id) else {
            return Ok(());
        };
        if on && game.len() < min {
            return Err(ActionError::NotEnoughPlayers(min).into());
        }
        let trigger = if on && !game.is_flexible_ready() && game.state == GameState::NotQuorate {
            game.lock();
            Some(Trigger::PlayersAdded)
        } else if !on && game.is_flexible_ready() {
            game.unlock();
            Some(Trigger::PlayersRemoved)
        } else {
            None
        };
        if let Some(trigger) = trigger {
            tracing::info!(activity = %self.activity.name, game = %id, on, "ready mark changed");
            self.push_event(id, trigger);
        }
        self.drain(env)
    }

    /// Places a hold on the participant's game for `slot`.
    ///
    /// # Errors
    /// [`ActionError::AlreadyHeld`], [`ActionError::NotHoldable`], or the
    /// lookup errors.
    pub fn set_hold(
        &mut self,
        slot: Slot,
        participant: &ParticipantId,
        reason: Option<String>,
        env: &mut Env<'_>,
    ) -> Result<(), GameError> {
        let id = self.find_member(slot, participant)?;
        let Some(game) = self.game_mut(id) else {
            return Ok(());
        };
        if let Some(hold) = &game.hold {
            return Err(ActionError::AlreadyHeld(slot, hold.holder.clone()).into());
        }
        if !matches!(
            game.state,
            GameState::NotQuorate
                | GameState::WaitingForTime
                | GameState::WaitingForArea
                | GameState::PlayerCheck
        ) {
            return Err(ActionError::NotHoldable {
                slot,
                state: game.state,
            }
            .into());
        }
        game.hold = Some(Hold {
            holder: participant.clone(),
            reason,
        });
        tracing::info!(activity = %self.activity.name, game = %id, holder = %participant, "hold set");
        self.push_event(id, Trigger::HoldSet);
        self.drain(env)
    }

    /// Clears the hold on the participant's game for `slot`.
    ///
    /// # Errors
    /// [`ActionError::NotHeld`] or the lookup errors.
    pub fn clear_hold(
        &mut self,
        slot: Slot,
        participant: &ParticipantId,
        env: &mut Env<'_>,
    ) -> Result<(), GameError> {
        let id = self.find_member(slot, participant)?;
        let Some(game) = self.game_mut(id) else {
            return Ok(());
        };
        if game.hold.take().is_none() {
            return Err(ActionError::NotHeld(slot).into());
        }
        tracing::info!(activity = %self.activity.name, game = %id, by = %participant, "hold cleared");
        self.push_event(id, Trigger::HoldCleared);
        self.drain(env)
    }

    /// Marks `participant` ready in every game waiting on them. Returns how
    /// many games that was.
    pub fn participant_ready(
        &mut self,
        participant: &ParticipantId,
        env: &mut Env<'_>,
    ) -> Result<usize, GameError> {
        let mut waiting = Vec::new();
        for game in self.games.values_mut().flatten() {
            if game.state == GameState::PlayerCheck && game.not_ready.remove(participant) {
                waiting.push(game.id);
            }
        }
        for id in &waiting {
            tracing::debug!(activity = %self.activity.name, game = %id, %participant, "participant ready");
            self.push_event(*id, Trigger::PlayerReady);
        }
        self.drain(env)?;
        Ok(waiting.len())
    }

    /// Tells a game its area has been granted.
    ///
    /// # Errors
    /// [`InternalError::UnknownGame`] if the area handed over a game this
    /// manager does not have. The stale claim is released first.
    pub fn area_ready(&mut self, id: GameId, env: &mut Env<'_>) -> Result<(), GameError> {
        if self.game(id).is_none() {
            let gref = self.gref(id);
            env.area.release(&gref);
            tracing::error!(area = %env.area.name(), game = %gref, "area granted to unknown game");
            return Err(InternalError::UnknownGame {
                area: env.area.name().to_string(),
                activity: self.activity.name.clone(),
                game: id,
            }
            .into());
        }
        self.push_event(id, Trigger::AreaReady);
        self.drain(env)
    }

    /// Rebuilds a game from its stored record.
    ///
    /// The slot is not checked against the clock: a record for a time that
    /// has passed restores fine and is then promoted like any stale game.
    ///
    /// Returns `None` when every participant of the record is already
    /// signed up for the slot; no game is created for it.
    pub fn restore_record(
        &mut self,
        stored: &StoredRecord,
        env: &mut Env<'_>,
    ) -> Result<Option<GameId>, GameError> {
        let record = &stored.record;
        let fresh: Vec<ParticipantId> = record
            .participants
            .iter()
            .filter(|p| self.member_of(record.slot, p).is_none())
            .cloned()
            .collect();
        if fresh.len() < record.participants.len() {
            tracing::warn!(
                activity = %self.activity.name,
                record = %stored.id,
                "restored record repeats participants already in the slot"
            );
        }

        if fresh.is_empty() {
            if let Err(err) = self.store.delete(stored.id) {
                tracing::warn!(activity = %self.activity.name, record = %stored.id, error = %err, "failed to delete duplicate record");
            }
            return Ok(None);
        }

        let id = self.create_game(record.slot, true)?;
        let flexible = self.activity.is_flexible();
        if let Some(game) = self.game_mut(id) {
            game.created_time = record.created_time;
            game.quorate_time = record.quorate_time;
            game.record_id = Some(stored.id);
            game.add(&fresh);
            if record.flexible_ready && flexible {
                game.lock();
            }
        }
        tracing::info!(activity = %self.activity.name, game = %id, record = %stored.id, "game restored");
        self.push_event(id, Trigger::PlayersAdded);
        self.drain(env)?;
        Ok(Some(id))
    }

    /// Fires every timer that is due.
    pub fn fire_due(&mut self, env: &mut Env<'_>) -> Result<(), GameError> {
        let now = self.clock.now();
        for key in self.timers.pop_due(now) {
            match key {
                TimerKey::ReadyTimeout(id) => {
                    tracing::info!(activity = %self.activity.name, game = %id, "ready timeout");
                    self.push_event(id, Trigger::TimerFired);
                }
                TimerKey::FutureSlot => self.on_future_timer(now),
            }
        }
        self.drain(env)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn activity(&self) -> &ActivityConfig {
        &self.activity
    }

    pub fn game(&self, id: GameId) -> Option<&Game> {
        let slot = self.slots.get(&id)?;
        self.games.get(slot)?.iter().find(|g| g.id == id)
    }

    /// Every game, by slot and then position within the slot.
    pub fn games(&self) -> impl Iterator<Item = &Game> {
        self.games.values().flatten()
    }

    /// The games for one slot, in order.
    pub fn games_for(&self, slot: Slot) -> &[Game] {
        self.games.get(&slot).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The earliest game: earliest slot, then earliest created.
    pub fn get_next_game(&self) -> Option<&Game> {
        self.games
            .values()
            .next()?
            .iter()
            .min_by_key(|g| g.created_time)
    }

    /// A status snapshot of one game.
    pub fn view(&self, id: GameId, area: &Area) -> Option<GameView> {
        let slot = self.slots.get(&id)?;
        let games = self.games.get(slot)?;
        let index = games.iter().position(|g| g.id == id)?;
        Some(GameView::capture(
            &self.activity,
            &games[index],
            index,
            area,
            self.clock.now(),
        ))
    }

    /// Status snapshots of every game.
    pub fn views(&self, area: &Area) -> Vec<GameView> {
        let now = self.clock.now();
        self.games
            .values()
            .flat_map(|games| {
                games
                    .iter()
                    .enumerate()
                    .map(move |(index, game)| GameView::capture(&self.activity, game, index, area, now))
            })
            .collect()
    }

    /// When the next timer is due.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.next_deadline()
    }

    /// Games that commenced since the last call.
    pub fn take_commenced(&mut self) -> Vec<Commenced> {
        std::mem::take(&mut self.commenced)
    }

    // -----------------------------------------------------------------------
    // Event loop
    // -----------------------------------------------------------------------

    /// Runs queued triggers and reorganizations to a fixed point, then
    /// re-arms the future-slot timer.
    ///
    /// On an internal error the queues are dropped: the operation stops
    /// where it failed rather than build on a broken invariant.
    fn drain(&mut self, env: &mut Env<'_>) -> Result<(), GameError> {
        let result = self.run_queues(env);
        if let Err(err) = &result {
            tracing::error!(activity = %self.activity.name, error = %err, "operation abandoned");
            self.events.clear();
            self.reorgs.clear();
        }
        self.reorg_active = false;
        self.rearm_future_timer();
        result
    }

    fn run_queues(&mut self, env: &mut Env<'_>) -> Result<(), GameError> {
        loop {
            while let Some(event) = self.events.pop_front() {
                self.step(event, env)?;
            }
            let Some(reorg) = self.reorgs.pop_front() else {
                return Ok(());
            };
            self.reorg_active = true;
            match reorg {
                Reorg::Promote(slot) => self.promote(slot)?,
                Reorg::Compact(slot) => self.compact(slot)?,
            }
        }
    }

    fn step(&mut self, event: Event, env: &mut Env<'_>) -> Result<(), GameError> {
        let now = self.clock.now();
        let Some(game) = self.game(event.game) else {
            tracing::debug!(activity = %self.activity.name, game = %event.game, trigger = %event.trigger, "trigger for deleted game ignored");
            return Ok(());
        };
        let state = game.state;
        let guards = game.guards(&self.activity.name, env.area, now);

        let transition = match machine::next(state, event.trigger, &guards) {
            Ok(Some(t)) => t,
            Ok(None) => {
                tracing::debug!(activity = %self.activity.name, game = %event.game, %state, trigger = %event.trigger, "trigger does not apply");
                return Ok(());
            }
            Err(source) => {
                tracing::error!(activity = %self.activity.name, game = %event.game, %state, trigger = %event.trigger, "transition out of terminal state");
                return Err(InternalError::Machine {
                    game: event.game,
                    source,
                }
                .into());
            }
        };

        tracing::debug!(activity = %self.activity.name, game = %event.game, ?guards, "guards sampled");
        self.apply(event.game, &transition, env, now);
        if !transition.internal {
            tracing::info!(
                activity = %self.activity.name,
                game = %event.game,
                from = ?transition.from,
                to = ?transition.to,
                trigger = %transition.trigger,
                "game transition"
            );
        }
        self.finalize(event.game, &transition, env);
        Ok(())
    }

    /// Carries out a transition's effects, then sets the new state.
    fn apply(&mut self, id: GameId, t: &Transition, env: &mut Env<'_>, now: DateTime<Utc>) {
        let gref = self.gref(id);
        let Self {
            games,
            slots,
            events,
            timers,
            ready_timeout,
            ..
        } = self;
        let Some(game) = slots
            .get(&id)
            .and_then(|slot| games.get_mut(slot))
            .and_then(|list| list.iter_mut().find(|g| g.id == id))
        else {
            return;
        };

        for effect in &t.effects {
            match effect {
                Effect::ClearFlexibleReady => game.unlock(),
                Effect::ClearQuorumTime => game.quorate_time = None,
                Effect::StampQuorumTime => {
                    game.quorate_time.get_or_insert(now);
                }
                Effect::FireRoll => push_unique(events, id, Trigger::Roll),
                Effect::StampCommenceTime => game.commence_time = Some(now),
                Effect::Enqueue => env.area.enqueue(gref.clone()),
                Effect::Dequeue => {
                    env.area.dequeue(&gref);
                }
                Effect::BeginPlayerCheck => {
                    game.not_ready = game
                        .participants
                        .iter()
                        .filter(|p| env.presence.is_committed_elsewhere(p))
                        .cloned()
                        .collect();
                    if !game.not_ready.is_empty() {
                        // The finalize step evicts them.
                        continue;
                    }
                    // Reserve the area now so a queued game cannot jump in
                    // while participants confirm.
                    env.area.admit(gref.clone());
                    game.not_ready = game
                        .participants
                        .iter()
                        .filter(|p| env.presence.is_idle(p))
                        .cloned()
                        .collect();
                    if game.not_ready.is_empty() {
                        push_unique(events, id, Trigger::PlayerReady);
                    } else {
                        let deadline = now
                            + chrono::Duration::from_std(*ready_timeout)
                                .unwrap_or(chrono::Duration::zero());
                        timers.schedule_at(TimerKey::ReadyTimeout(id), deadline);
                        game.ready_deadline = Some(deadline);
                        tracing::debug!(game = %id, idle = game.not_ready.len(), %deadline, "waiting for idle participants");
                    }
                }
                Effect::ClearNotReady => game.not_ready.clear(),
                Effect::ReleaseRolling => {
                    env.area.release(&gref);
                }
                Effect::CancelReadyTimer => {
                    timers.cancel(&TimerKey::ReadyTimeout(id));
                    game.ready_deadline = None;
                }
            }
        }
        game.state = t.to;
    }

    /// State-specific handling after a transition, then announcement,
    /// reorganization requests, area clean-up, and persistence.
    fn finalize(&mut self, id: GameId, t: &Transition, env: &mut Env<'_>) {
        let announce = match t.to {
            GameState::Empty => {
                if let Some(game) = self.delete_game(id, env) {
                    // A game relocated by a reorganization empties quietly.
                    if !self.reorg_active {
                        self.say(&format!("Game for {} removed!", game.slot));
                    }
                }
                return;
            }
            GameState::Commencing => {
                self.on_commencing(id, env);
                return;
            }
            GameState::Quorate => false,
            GameState::PlayerCheck => self.on_player_check(id, t, env),
            GameState::PlayersNotReady => self.on_players_not_ready(id),
            _ => true,
        };

        if announce {
            self.announce_game(id, env.area);
        }

        let Some(slot) = self.slots.get(&id).copied() else {
            return;
        };
        // A grant that arrives while the game is blocked is handed back.
        if t.from == GameState::WaitingForArea && t.to != GameState::PlayerCheck {
            env.area.release(&self.gref(id));
        }
        if t.to == GameState::NotQuorate {
            self.request(Reorg::Promote(slot));
            if t.trigger == Trigger::PlayersRemoved {
                self.request(Reorg::Compact(slot));
            }
            // The area stays reserved through PlayersNotReady until the
            // idlers are gone.
            if matches!(t.from, GameState::PlayerCheck | GameState::PlayersNotReady) {
                env.area.release(&self.gref(id));
            }
        }

        if matches!(
            t.trigger,
            Trigger::PlayersAdded | Trigger::PlayersRemoved | Trigger::HoldSet | Trigger::HoldCleared
        ) {
            self.save(id);
        }
    }

    fn on_player_check(&mut self, id: GameId, t: &Transition, env: &Env<'_>) -> bool {
        let now = self.clock.now();
        let Some(game) = self.game(id) else {
            return false;
        };
        let not_ready = game.not_ready();
        let deadline = game.ready_deadline;
        let slot = game.slot;

        let clashed: Vec<ParticipantId> = not_ready
            .iter()
            .filter(|p| env.presence.is_committed_elsewhere(p))
            .cloned()
            .collect();
        if !clashed.is_empty() {
            self.say(&format!(
                "Unreg {} as they are currently playing another game.",
                player_list(&clashed, 0)
            ));
            // The removal announces the game.
            self.remove_participants(id, &clashed);
            return false;
        }

        if t.internal {
            return true;
        }

        if !not_ready.is_empty() {
            let secs = deadline.map_or(0, |d| (d - now).num_seconds().max(0));
            let text = format!(
                "{} {} game for {slot} ready to roll, but you are idle. Say something in the next {secs} secs or get dropped!",
                self.activity.tag(),
                self.activity.name
            );
            for participant in &not_ready {
                self.tell(participant, &text);
            }
        }
        !not_ready.is_empty()
    }

    fn on_players_not_ready(&mut self, id: GameId) -> bool {
        let Some(game) = self.game(id) else {
            return false;
        };
        let idlers = game.not_ready();
        if idlers.is_empty() {
            tracing::warn!(activity = %self.activity.name, game = %id, "ready timeout with nobody idle");
            return true;
        }
        self.say(&format!("Unreg {} due to idleness", player_list(&idlers, 0)));
        self.remove_participants(id, &idlers);
        false
    }

    fn on_commencing(&mut self, id: GameId, env: &mut Env<'_>) {
        let Some(view) = self.view(id, env.area) else {
            return;
        };
        let line = view.to_string();
        self.say(&line);
        let direct = format!("{} {line}", self.activity.tag());
        for participant in &view.participants {
            self.tell(participant, &direct);
        }

        env.area.release(&self.gref(id));
        if let Some(game) = self.delete_game(id, env) {
            tracing::info!(activity = %self.activity.name, game = %id, slot = %game.slot, players = game.len(), "game commenced");
            self.commenced.push(Commenced {
                activity: self.activity.name.clone(),
                game: id,
                slot: game.slot,
                participants: game.participants,
                commence_time: game.commence_time.unwrap_or_else(|| self.clock.now()),
            });
        }
    }

    // -----------------------------------------------------------------------
    // Reorganization
    // -----------------------------------------------------------------------

    fn request(&mut self, reorg: Reorg) {
        if !self.reorgs.contains(&reorg) {
            self.reorgs.push_back(reorg);
        }
    }

    /// Moves every still-`NotQuorate` game of a past slot to "now".
    ///
    /// Games that are quorate or further along stay where they are so
    /// their participant group is kept intact.
    fn promote(&mut self, slot: Slot) -> Result<(), GameError> {
        if !slot.is_past(self.clock.now()) {
            return Ok(());
        }
        let Some(list) = self.games.remove(&slot) else {
            return Ok(());
        };
        if list.is_empty() {
            return Err(InternalError::EmptySlot(slot).into());
        }
        let (moving, staying): (Vec<Game>, Vec<Game>) = list
            .into_iter()
            .partition(|g| g.state == GameState::NotQuorate);
        if !staying.is_empty() {
            self.games.insert(slot, staying);
        }
        if moving.is_empty() {
            return Ok(());
        }

        let count = moving.len();
        let moved: Vec<GameId> = moving.iter().map(|g| g.id).collect();
        let now_games = self.games.entry(Slot::Now).or_default();
        for mut game in moving {
            game.slot = Slot::Now;
            self.slots.insert(game.id, Slot::Now);
            now_games.push(game);
        }
        now_games.sort_by_key(|g| g.created_time);
        for id in moved {
            self.save(id);
        }
        tracing::info!(activity = %self.activity.name, %slot, count, "stale games promoted to now");
        self.say(&format!(
            "Changed {count} past game(s) for {slot} into games for now"
        ));

        // Someone may now be in two games for "now": keep them only in the
        // earliest created.
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for game in self.games_for(Slot::Now) {
            let dups: Vec<ParticipantId> = game
                .participants
                .iter()
                .filter(|p| seen.contains(*p))
                .cloned()
                .collect();
            seen.extend(game.participants.iter().cloned());
            if !dups.is_empty() {
                duplicates.push((game.id, dups));
            }
        }
        for (id, dups) in duplicates {
            tracing::info!(activity = %self.activity.name, game = %id, count = dups.len(), "duplicate participants removed");
            self.remove_participants(id, &dups);
        }

        self.request(Reorg::Compact(Slot::Now));
        Ok(())
    }

    /// Pulls participants forward into earlier games of the same slot
    /// that have room, keeping their relative order.
    fn compact(&mut self, slot: Slot) -> Result<(), GameError> {
        let Some(list) = self.games.get(&slot) else {
            return Ok(());
        };
        if list.is_empty() {
            return Err(InternalError::EmptySlot(slot).into());
        }
        let mut order: Vec<GameId> = list.iter().map(|g| g.id).collect();
        let mut announced = false;

        loop {
            let mut moved = false;
            for pair in 0..order.len().saturating_sub(1) {
                let (into, from) = (order[pair], order[pair + 1]);
                let pulled = match (self.game(into), self.game(from)) {
                    (Some(a), Some(b)) if !a.is_empty() && a.has_space() && !b.is_empty() => {
                        let take = a.spaces_left().unwrap_or(b.len()).min(b.len());
                        b.participants[..take].to_vec()
                    }
                    _ => continue,
                };
                if pulled.is_empty() {
                    continue;
                }
                if !announced {
                    self.say(&format!(
                        "Checking to see if any players can be promoted for games for {slot}..."
                    ));
                    announced = true;
                }
                tracing::info!(activity = %self.activity.name, %slot, from = %from, into = %into, count = pulled.len(), "participants promoted between games");
                self.remove_participants(from, &pulled);
                self.add_participants(into, &pulled);
                moved = true;
            }
            if !moved {
                return Ok(());
            }
            order.retain(|id| self.game(*id).is_some_and(|g| !g.is_empty()));
        }
    }

    /// Handles the future-slot timer: prods games whose time has come and
    /// sweeps their slots.
    fn on_future_timer(&mut self, now: DateTime<Utc>) {
        let past: Vec<Slot> = self
            .games
            .keys()
            .filter(|slot| slot.is_past(now))
            .copied()
            .collect();
        tracing::info!(activity = %self.activity.name, past = past.len(), "future timer fired");

        let due: Vec<GameId> = past
            .iter()
            .flat_map(|slot| self.games_for(*slot))
            .filter(|g| g.state == GameState::WaitingForTime)
            .map(|g| g.id)
            .collect();
        for id in due {
            self.push_event(id, Trigger::TimerFired);
        }
        for slot in past {
            self.request(Reorg::Promote(slot));
        }
    }

    /// Keeps exactly one future-slot timer, for the earliest timed slot
    /// that still needs it: one in the future, or one whose time has come
    /// but which still holds games waiting on the sweep.
    fn rearm_future_timer(&mut self) {
        let now = self.clock.now();
        let earliest = self.games.iter().find_map(|(slot, games)| match slot {
            Slot::At(t) if *t > now => Some(*t),
            Slot::At(t) if games.iter().any(|g| awaits_sweep(g.state)) => Some(*t),
            _ => None,
        });
        match earliest {
            Some(at) if self.timers.deadline(&TimerKey::FutureSlot) != Some(at) => {
                tracing::debug!(activity = %self.activity.name, %at, "future timer armed");
                self.timers.schedule_at(TimerKey::FutureSlot, at);
            }
            Some(_) => {}
            None => {
                self.timers.cancel(&TimerKey::FutureSlot);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn create_game(&mut self, slot: Slot, restoring: bool) -> Result<GameId, ActionError> {
        let now = self.clock.now();
        if !restoring && slot.is_past(now) {
            return Err(ActionError::SlotInPast(slot));
        }
        self.next_id += 1;
        let id = GameId(self.next_id);
        let game = Game::new(id, slot, self.activity.max_players(), now);
        self.games.entry(slot).or_default().push(game);
        self.slots.insert(id, slot);
        tracing::info!(activity = %self.activity.name, game = %id, %slot, "game created");
        Ok(id)
    }

    /// Unlinks a game from the slot map, the area, its timer, and the
    /// store.
    fn delete_game(&mut self, id: GameId, env: &mut Env<'_>) -> Option<Game> {
        let slot = self.slots.remove(&id)?;
        let list = self.games.get_mut(&slot)?;
        let pos = list.iter().position(|g| g.id == id)?;
        let game = list.remove(pos);
        if list.is_empty() {
            self.games.remove(&slot);
        }
        self.timers.cancel(&TimerKey::ReadyTimeout(id));
        env.area.release(&self.gref(id));
        if let Some(record) = game.record_id {
            if let Err(err) = self.store.delete(record) {
                tracing::warn!(activity = %self.activity.name, game = %id, %record, error = %err, "failed to delete game record");
            }
        }
        tracing::info!(activity = %self.activity.name, game = %id, %slot, "game deleted");
        Some(game)
    }

    fn save(&mut self, id: GameId) {
        let Some(game) = self.game(id) else {
            return;
        };
        let record = game.to_record(&self.activity.name);
        match game.record_id {
            Some(record_id) => {
                if let Err(err) = self.store.update(record_id, &record) {
                    tracing::warn!(activity = %self.activity.name, game = %id, error = %err, "failed to update game record");
                }
            }
            None => match self.store.create(&record) {
                Ok(record_id) => {
                    if let Some(game) = self.game_mut(id) {
                        game.record_id = Some(record_id);
                    }
                }
                Err(err) => {
                    tracing::warn!(activity = %self.activity.name, game = %id, error = %err, "failed to create game record");
                }
            },
        }
    }

    fn add_participants(&mut self, id: GameId, participants: &[ParticipantId]) {
        let added = self.game_mut(id).map(|g| g.add(participants)).unwrap_or_default();
        if !added.is_empty() {
            self.push_event(id, Trigger::PlayersAdded);
        }
    }

    fn remove_participants(&mut self, id: GameId, participants: &[ParticipantId]) {
        let removed = self
            .game_mut(id)
            .map(|g| g.remove(participants))
            .unwrap_or_default();
        if !removed.is_empty() {
            self.push_event(id, Trigger::PlayersRemoved);
        }
    }

    fn push_event(&mut self, game: GameId, trigger: Trigger) {
        push_unique(&mut self.events, game, trigger);
    }

    fn member_of(&self, slot: Slot, participant: &ParticipantId) -> Option<GameId> {
        self.games
            .get(&slot)?
            .iter()
            .find(|g| g.contains(participant))
            .map(|g| g.id)
    }

    fn find_member(&self, slot: Slot, participant: &ParticipantId) -> Result<GameId, ActionError> {
        if !self.games.contains_key(&slot) {
            return Err(ActionError::NoGames(slot));
        }
        self.member_of(slot, participant)
            .ok_or(ActionError::NotRegistered(slot))
    }

    fn game_mut(&mut self, id: GameId) -> Option<&mut Game> {
        let slot = self.slots.get(&id)?;
        self.games.get_mut(slot)?.iter_mut().find(|g| g.id == id)
    }

    fn gref(&self, id: GameId) -> GameRef {
        GameRef::new(self.activity.name.clone(), id)
    }

    fn announce_game(&self, id: GameId, area: &Area) {
        if let Some(view) = self.view(id, area) {
            self.say(&view.to_string());
        }
    }

    fn say(&self, text: &str) {
        if let Err(err) = self.announcer.announce(&self.activity.name, text) {
            tracing::warn!(activity = %self.activity.name, error = %err, "announcement failed");
        }
    }

    fn tell(&self, participant: &ParticipantId, text: &str) {
        if let Err(err) = self.announcer.notify(participant, text) {
            tracing::warn!(activity = %self.activity.name, %participant, error = %err, "notice failed");
        }
    }
}

/// States a timed slot's sweep still has work for: waiting on the clock,
/// or short of players and due for promotion.
fn awaits_sweep(state: GameState) -> bool {
    matches!(state, GameState::WaitingForTime | GameState::NotQuorate)
}

fn push_unique(events: &mut VecDeque<Event>, game: GameId, trigger: Trigger) {
    let event = Event { game, trigger };
    if !events.contains(&event) {
        events.push_back(event);
    }
}
