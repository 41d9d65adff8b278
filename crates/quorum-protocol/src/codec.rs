//! Codec trait and implementations for turning records into bytes.
//!
//! A store is generic over [`Codec`]. [`JsonCodec`] keeps the file store
//! human-readable, so an operator can inspect or hand-edit the outstanding
//! games.

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Turns values into bytes for a store, and back.
///
/// `Send + Sync + 'static` so a store holding a codec can live inside the
/// venue actor's task.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses pretty-printed JSON (via `serde_json`).
///
/// Requires the default `json` feature.
///
/// ## Example
///
/// ```rust
/// use quorum_protocol::{Codec, JsonCodec, Slot};
///
/// let codec = JsonCodec;
/// let bytes = codec.encode(&Slot::Now).unwrap();
/// let slot: Slot = codec.decode(&bytes).unwrap();
/// assert_eq!(slot, Slot::Now);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec_pretty(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}

#[cfg(all(test, feature = "json"))]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::{GameRecord, RecordId, Slot, StoredRecord};

    #[test]
    fn test_json_codec_keeps_signup_order() {
        let stored = StoredRecord {
            id: RecordId(4),
            record: GameRecord {
                activity: "foosball".into(),
                slot: Slot::At(Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap()),
                created_time: Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap(),
                quorate_time: None,
                participants: vec!["zed".into(), "amy".into(), "kim".into()],
                flexible_ready: false,
            },
        };

        let bytes = JsonCodec.encode(&vec![stored.clone()]).unwrap();
        let back: Vec<StoredRecord> = JsonCodec.decode(&bytes).unwrap();
        assert_eq!(back, vec![stored]);
        assert_eq!(back[0].record.participants[0].as_str(), "zed");
    }

    #[test]
    fn test_json_codec_decode_garbage_fails() {
        let result: Result<StoredRecord, _> = JsonCodec.decode(b"{not json");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }
}
