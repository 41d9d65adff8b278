//! # Quorum
//!
//! Pickup-game coordination for a shared office or club.
//!
//! Participants sign up for an activity "now" or at a time of day. Once a
//! game is full, its time has come, its area (the table, the court) is
//! free and nobody is holding it back, Quorum checks that everyone is
//! actually around and announces the roll.
//!
//! This crate runs a [`Venue`](quorum_game::Venue) inside a Tokio actor
//! and adds file persistence and configuration loading on top of the
//! lower layers:
//!
//! ```text
//! quorum-protocol → quorum-clock → quorum-roster → quorum-game → quorum
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use quorum::prelude::*;
//!
//! # async fn demo() -> Result<(), QuorumError> {
//! let config = parse_config(r#"{
//!     "areas": [{ "name": "table" }],
//!     "activities": [{ "name": "pool", "area": "table", "team_size": 1 }]
//! }"#)?;
//! let quorum = Quorum::builder().config(config).start()?;
//! let venue = quorum.handle();
//! venue.register("pool", Slot::Now, &ParticipantId::new("amy")).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod logging;
mod service;
mod store;

pub use config::{load_config, parse_config};
pub use error::QuorumError;
pub use logging::init_tracing;
pub use service::{Quorum, QuorumBuilder, VenueHandle, spawn_venue};
pub use store::FileStore;

/// Everything needed to run a venue.
pub mod prelude {
    pub use quorum_clock::{Clock, ManualClock, SharedClock, SystemClock, TokioClock};
    pub use quorum_game::{
        ActionError, ActivityConfig, Announcer, AreaConfig, AreaView, Commenced, GameError,
        GameState, GameStore, GameView, MemoryStore, RecordingAnnouncer, TracingAnnouncer,
        Venue, VenueConfig,
    };
    pub use quorum_protocol::{GameId, ParticipantId, Slot};
    pub use quorum_roster::{ParticipantStatus, RosterConfig};

    pub use crate::{
        FileStore, Quorum, QuorumBuilder, QuorumError, VenueHandle, init_tracing, load_config,
        parse_config, spawn_venue,
    };
}
