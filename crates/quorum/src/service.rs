//! The venue actor and its handle.
//!
//! One Tokio task owns the [`Venue`]. Commands arrive over an mpsc channel
//! and each carries a oneshot reply channel where it needs an answer.
//! Between commands the task sleeps until the venue's next timer is due,
//! then fires it, so timeouts and scheduled slots need no outside prodding.

use std::sync::Arc;

use quorum_clock::{SharedClock, TokioClock, sleep_until_deadline};
use quorum_game::{
    AreaView, Announcer, BusyMark, Commenced, GameError, GameStore, GameView, MemoryStore,
    TracingAnnouncer, Venue, VenueConfig,
};
use quorum_protocol::{GameId, ParticipantId, Slot};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::QuorumError;

/// How many commands may wait for the actor before senders block.
const COMMAND_BUFFER: usize = 64;

type Reply<T> = oneshot::Sender<Result<T, GameError>>;

/// Commands sent to the venue actor.
pub(crate) enum VenueCommand {
    Register {
        activity: String,
        slot: Slot,
        participant: ParticipantId,
        reply: Reply<GameId>,
    },
    Unregister {
        activity: String,
        slot: Slot,
        participant: ParticipantId,
        reply: Reply<GameId>,
    },
    SetReadyMark {
        activity: String,
        slot: Slot,
        participant: ParticipantId,
        on: bool,
        reply: Reply<()>,
    },
    SetHold {
        activity: String,
        slot: Slot,
        participant: ParticipantId,
        reason: Option<String>,
        reply: Reply<()>,
    },
    ClearHold {
        activity: String,
        slot: Slot,
        participant: ParticipantId,
        reply: Reply<()>,
    },
    /// Fire-and-forget: the participant said something.
    Touch { participant: ParticipantId },
    SetAreaBusy {
        area: String,
        holder: ParticipantId,
        reason: Option<String>,
        reply: Reply<()>,
    },
    ClearAreaBusy {
        area: String,
        reply: Reply<Option<BusyMark>>,
    },
    Views {
        activity: Option<String>,
        reply: Reply<Vec<GameView>>,
    },
    NextGame {
        activity: String,
        reply: Reply<Option<GameView>>,
    },
    Areas {
        reply: oneshot::Sender<Vec<AreaView>>,
    },
    TakeCommenced {
        reply: oneshot::Sender<Vec<Commenced>>,
    },
    Shutdown,
}

// ---------------------------------------------------------------------------
// Handle
// ---------------------------------------------------------------------------

/// Handle to a running venue actor.
///
/// Cheap to clone; every clone talks to the same venue.
#[derive(Clone)]
pub struct VenueHandle {
    sender: mpsc::Sender<VenueCommand>,
}

impl VenueHandle {
    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> VenueCommand,
    ) -> Result<T, QuorumError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| QuorumError::Unavailable)?;
        let result = reply_rx.await.map_err(|_| QuorumError::Unavailable)?;
        Ok(result?)
    }

    async fn query<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> VenueCommand,
    ) -> Result<T, QuorumError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(make(reply_tx))
            .await
            .map_err(|_| QuorumError::Unavailable)?;
        reply_rx.await.map_err(|_| QuorumError::Unavailable)
    }

    /// Signs a participant up for an activity at a slot.
    pub async fn register(
        &self,
        activity: &str,
        slot: Slot,
        participant: &ParticipantId,
    ) -> Result<GameId, QuorumError> {
        self.request(|reply| VenueCommand::Register {
            activity: activity.to_string(),
            slot,
            participant: participant.clone(),
            reply,
        })
        .await
    }

    pub async fn unregister(
        &self,
        activity: &str,
        slot: Slot,
        participant: &ParticipantId,
    ) -> Result<GameId, QuorumError> {
        self.request(|reply| VenueCommand::Unregister {
            activity: activity.to_string(),
            slot,
            participant: participant.clone(),
            reply,
        })
        .await
    }

    /// Turns a flexible game's ready mark on or off.
    pub async fn set_ready_mark(
        &self,
        activity: &str,
        slot: Slot,
        participant: &ParticipantId,
        on: bool,
    ) -> Result<(), QuorumError> {
        self.request(|reply| VenueCommand::SetReadyMark {
            activity: activity.to_string(),
            slot,
            participant: participant.clone(),
            on,
            reply,
        })
        .await
    }

    pub async fn set_hold(
        &self,
        activity: &str,
        slot: Slot,
        participant: &ParticipantId,
        reason: Option<String>,
    ) -> Result<(), QuorumError> {
        self.request(|reply| VenueCommand::SetHold {
            activity: activity.to_string(),
            slot,
            participant: participant.clone(),
            reason,
            reply,
        })
        .await
    }

    pub async fn clear_hold(
        &self,
        activity: &str,
        slot: Slot,
        participant: &ParticipantId,
    ) -> Result<(), QuorumError> {
        self.request(|reply| VenueCommand::ClearHold {
            activity: activity.to_string(),
            slot,
            participant: participant.clone(),
            reply,
        })
        .await
    }

    /// Reports activity from a participant (fire-and-forget).
    pub async fn touch(&self, participant: &ParticipantId) -> Result<(), QuorumError> {
        self.sender
            .send(VenueCommand::Touch {
                participant: participant.clone(),
            })
            .await
            .map_err(|_| QuorumError::Unavailable)
    }

    pub async fn set_area_busy(
        &self,
        area: &str,
        holder: &ParticipantId,
        reason: Option<String>,
    ) -> Result<(), QuorumError> {
        self.request(|reply| VenueCommand::SetAreaBusy {
            area: area.to_string(),
            holder: holder.clone(),
            reason,
            reply,
        })
        .await
    }

    pub async fn clear_area_busy(&self, area: &str) -> Result<Option<BusyMark>, QuorumError> {
        self.request(|reply| VenueCommand::ClearAreaBusy {
            area: area.to_string(),
            reply,
        })
        .await
    }

    /// Status of every game, or of one activity's games.
    pub async fn views(&self, activity: Option<&str>) -> Result<Vec<GameView>, QuorumError> {
        self.request(|reply| VenueCommand::Views {
            activity: activity.map(str::to_string),
            reply,
        })
        .await
    }

    /// The activity's earliest game.
    pub async fn get_next_game(&self, activity: &str) -> Result<Option<GameView>, QuorumError> {
        self.request(|reply| VenueCommand::NextGame {
            activity: activity.to_string(),
            reply,
        })
        .await
    }

    pub async fn areas(&self) -> Result<Vec<AreaView>, QuorumError> {
        self.query(|reply| VenueCommand::Areas { reply }).await
    }

    /// Games that commenced since the last call.
    pub async fn take_commenced(&self) -> Result<Vec<Commenced>, QuorumError> {
        self.query(|reply| VenueCommand::TakeCommenced { reply }).await
    }

    /// Tells the actor to stop. Pending commands ahead of this one are
    /// still handled.
    pub async fn shutdown(&self) -> Result<(), QuorumError> {
        self.sender
            .send(VenueCommand::Shutdown)
            .await
            .map_err(|_| QuorumError::Unavailable)
    }
}

// ---------------------------------------------------------------------------
// Actor
// ---------------------------------------------------------------------------

struct VenueActor {
    venue: Venue,
    clock: SharedClock,
    receiver: mpsc::Receiver<VenueCommand>,
}

impl VenueActor {
    async fn run(mut self) {
        tracing::info!("venue actor started");

        loop {
            let deadline = self.venue.next_deadline();
            tokio::select! {
                cmd = self.receiver.recv() => match cmd {
                    Some(VenueCommand::Shutdown) | None => break,
                    Some(cmd) => self.handle(cmd),
                },
                () = sleep_until_deadline(deadline, &*self.clock) => {
                    if let Err(err) = self.venue.fire_due() {
                        tracing::error!(error = %err, "timer handling failed");
                    }
                }
            }
        }

        tracing::info!("venue actor stopped");
    }

    fn handle(&mut self, cmd: VenueCommand) {
        match cmd {
            VenueCommand::Register {
                activity,
                slot,
                participant,
                reply,
            } => {
                let result = self.venue.register(&activity, slot, &participant);
                respond(reply, result);
            }
            VenueCommand::Unregister {
                activity,
                slot,
                participant,
                reply,
            } => {
                let result = self.venue.unregister(&activity, slot, &participant);
                respond(reply, result);
            }
            VenueCommand::SetReadyMark {
                activity,
                slot,
                participant,
                on,
                reply,
            } => {
                let result = self
                    .venue
                    .set_ready_mark(&activity, slot, &participant, on);
                respond(reply, result);
            }
            VenueCommand::SetHold {
                activity,
                slot,
                participant,
                reason,
                reply,
            } => {
                let result = self.venue.set_hold(&activity, slot, &participant, reason);
                respond(reply, result);
            }
            VenueCommand::ClearHold {
                activity,
                slot,
                participant,
                reply,
            } => {
                let result = self.venue.clear_hold(&activity, slot, &participant);
                respond(reply, result);
            }
            VenueCommand::Touch { participant } => {
                if let Err(err) = self.venue.touch(&participant) {
                    tracing::error!(%participant, error = %err, "activity handling failed");
                }
            }
            VenueCommand::SetAreaBusy {
                area,
                holder,
                reason,
                reply,
            } => {
                let result = self.venue.set_area_busy(&area, &holder, reason);
                respond(reply, result);
            }
            VenueCommand::ClearAreaBusy { area, reply } => {
                let result = self.venue.clear_area_busy(&area);
                respond(reply, result);
            }
            VenueCommand::Views { activity, reply } => {
                let result = match activity {
                    Some(activity) => self.venue.views(&activity).map_err(GameError::from),
                    None => Ok(self.venue.all_views()),
                };
                respond(reply, result);
            }
            VenueCommand::NextGame { activity, reply } => {
                let result = self.venue.get_next_game(&activity).map_err(GameError::from);
                respond(reply, result);
            }
            VenueCommand::Areas { reply } => {
                let _ = reply.send(self.venue.area_views());
            }
            VenueCommand::TakeCommenced { reply } => {
                let _ = reply.send(self.venue.take_commenced());
            }
            VenueCommand::Shutdown => {}
        }
    }
}

/// Sends a result back, logging engine faults on the way.
fn respond<T>(reply: Reply<T>, result: Result<T, GameError>) {
    if let Err(err) = &result {
        if err.is_internal() {
            tracing::error!(error = %err, "internal error");
        } else {
            tracing::debug!(error = %err, "request refused");
        }
    }
    // The caller may have given up waiting.
    let _ = reply.send(result);
}

/// Runs `venue` in its own task. Timers are read from `clock`.
pub fn spawn_venue(venue: Venue, clock: SharedClock) -> (VenueHandle, JoinHandle<()>) {
    let (sender, receiver) = mpsc::channel(COMMAND_BUFFER);
    let actor = VenueActor {
        venue,
        clock,
        receiver,
    };
    let task = tokio::spawn(actor.run());
    (VenueHandle { sender }, task)
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for a running Quorum service.
///
/// # Example
///
/// ```rust,ignore
/// use quorum::prelude::*;
///
/// let quorum = Quorum::builder()
///     .config(load_config("venue.json")?)
///     .store(Arc::new(FileStore::json("games.json")?))
///     .start()?;
/// quorum.handle().register("pool", Slot::Now, &"amy".into()).await?;
/// ```
pub struct QuorumBuilder {
    config: VenueConfig,
    clock: Option<SharedClock>,
    store: Option<Arc<dyn GameStore>>,
    announcer: Option<Arc<dyn Announcer>>,
}

impl QuorumBuilder {
    /// Creates a builder with an empty configuration.
    pub fn new() -> Self {
        Self {
            config: VenueConfig::default(),
            clock: None,
            store: None,
            announcer: None,
        }
    }

    pub fn config(mut self, config: VenueConfig) -> Self {
        self.config = config;
        self
    }

    /// Default: a [`TokioClock`] anchored at start-up.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Default: a [`MemoryStore`], which forgets everything on restart.
    pub fn store(mut self, store: Arc<dyn GameStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Default: a [`TracingAnnouncer`].
    pub fn announcer(mut self, announcer: Arc<dyn Announcer>) -> Self {
        self.announcer = Some(announcer);
        self
    }

    /// Builds the venue, restores outstanding games from the store, and
    /// spawns the actor. Must be called inside a Tokio runtime.
    pub fn start(self) -> Result<Quorum, QuorumError> {
        let clock: SharedClock = match self.clock {
            Some(clock) => clock,
            None => Arc::new(TokioClock::new()),
        };
        let store: Arc<dyn GameStore> = match self.store {
            Some(store) => store,
            None => Arc::new(MemoryStore::new()),
        };
        let announcer: Arc<dyn Announcer> = match self.announcer {
            Some(announcer) => announcer,
            None => Arc::new(TracingAnnouncer),
        };

        let mut venue = Venue::new(&self.config, clock.clone(), store.clone(), announcer)?;
        let records = store.find_all()?;
        if !records.is_empty() {
            venue.restore(records)?;
        }

        let (handle, task) = spawn_venue(venue, clock);
        Ok(Quorum { handle, task })
    }
}

impl Default for QuorumBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A running Quorum service.
pub struct Quorum {
    handle: VenueHandle,
    task: JoinHandle<()>,
}

impl Quorum {
    pub fn builder() -> QuorumBuilder {
        QuorumBuilder::new()
    }

    /// A handle for sending commands. Clone it freely.
    pub fn handle(&self) -> VenueHandle {
        self.handle.clone()
    }

    /// Stops the actor and waits for it to finish.
    pub async fn shutdown(self) -> Result<(), QuorumError> {
        self.handle.shutdown().await?;
        self.task.await.map_err(|_| QuorumError::Unavailable)
    }
}
