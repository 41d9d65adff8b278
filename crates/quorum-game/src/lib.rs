//! Game lifecycle management for Quorum.
//!
//! Games gather participants for a slot, wait until they are full, the
//! slot arrives, the area is free and nobody is holding them back, check
//! that everyone is actually around, then commence. Each activity has one
//! [`GameManager`]; a [`Venue`] ties managers to the [`Area`]s they share
//! and to the participant roster.
//!
//! # Key types
//!
//! - [`GameState`], [`Trigger`], [`machine::next`] - the pure transition
//!   table
//! - [`GameManager`] - owns the games of one activity and drives them
//! - [`Area`] - a shared resource with limited concurrent games
//! - [`Venue`] - every activity, area and participant in one place
//! - [`GameStore`] / [`Announcer`] - where game records and messages go
//! - [`VenueConfig`] - activities, areas and timings

mod announce;
mod area;
mod config;
mod error;
mod game;
pub mod machine;
mod manager;
mod store;
mod venue;
mod view;

pub use announce::{Announcer, Message, RecordingAnnouncer, SharedAnnouncer, TracingAnnouncer};
pub use area::{Area, BusyMark, GameRef};
pub use config::{ActivityConfig, AreaConfig, ConfigError, VenueConfig};
pub use error::{ActionError, AnnounceError, GameError, InternalError, StoreError};
pub use game::{Capacity, Game, Hold};
pub use machine::{Effect, GameState, Guards, MachineError, Transition, Trigger};
pub use manager::{Commenced, Env, GameManager, TimerKey};
pub use store::{GameStore, MemoryStore, SharedStore};
pub use venue::Venue;
pub use view::{AreaView, GameView, format_delta, player_list};
