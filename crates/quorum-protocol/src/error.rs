//! Error types for the protocol layer.

/// Errors from encoding, decoding or validating records.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A value could not be written out by the codec.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Stored bytes could not be read back.
    ///
    /// Common causes: a truncated store file, or a file written by an
    /// incompatible version.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The record decoded fine but describes a game that cannot exist:
    /// no participants, or the same participant twice.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}
