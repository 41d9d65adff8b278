//! Shared vocabulary for Quorum.
//!
//! This crate defines the types every other layer speaks:
//!
//! - **Identities** ([`ParticipantId`], [`GameId`], [`RecordId`]): who
//!   and what is being coordinated.
//! - **Slots** ([`Slot`]): the time-of-day key games are grouped under,
//!   either "now" or a specific timestamp.
//! - **Records** ([`GameRecord`], [`StoredRecord`]): the mirror of a
//!   game's mutable fields that survives a restart.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how records are turned
//!   into bytes for a store.
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! The protocol layer knows nothing about state machines or areas. It only
//! knows how to name things and how to serialize them.
//!
//! ```text
//! Protocol (ids, slots, records) → Game (state machine, areas) → Quorum (actor)
//! ```

mod codec;
mod error;
mod record;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use record::{GameRecord, StoredRecord};
pub use types::{GameId, ParticipantId, RecordId, Slot};
