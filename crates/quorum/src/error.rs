//! Unified error type for the Quorum service.

use quorum_game::{ConfigError, GameError, StoreError};
use quorum_protocol::ProtocolError;

/// Top-level error that wraps every layer's errors.
///
/// `#[from]` on each variant lets `?` convert layer errors directly.
#[derive(Debug, thiserror::Error)]
pub enum QuorumError {
    /// A game operation was refused or failed.
    #[error(transparent)]
    Game(#[from] GameError),

    /// The venue configuration is inconsistent.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// A record or config file could not be encoded or decoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The game store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The venue actor has stopped.
    #[error("venue is not running")]
    Unavailable,
}

impl QuorumError {
    /// The refused action, if that is what this is. Its message is meant
    /// for the participant who asked.
    pub fn as_action(&self) -> Option<&quorum_game::ActionError> {
        match self {
            Self::Game(GameError::Action(err)) => Some(err),
            _ => None,
        }
    }
}
