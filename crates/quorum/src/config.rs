//! Loading a venue configuration from JSON.
//!
//! ```json
//! {
//!   "ready_timeout_secs": 60,
//!   "idle_threshold_secs": 600,
//!   "areas": [{ "name": "table", "capacity": 1 }],
//!   "activities": [
//!     { "name": "pool", "area": "table", "team_size": 1 },
//!     { "name": "lunch", "team_size": 0 }
//!   ]
//! }
//! ```
//!
//! Omitted fields take their defaults. The result is validated before it
//! is returned.

use std::path::Path;

use quorum_game::VenueConfig;
use quorum_protocol::{Codec, JsonCodec};

use crate::QuorumError;

/// Parses and validates a configuration.
pub fn parse_config(text: &str) -> Result<VenueConfig, QuorumError> {
    let config: VenueConfig = JsonCodec.decode(text.as_bytes())?;
    config.validate()?;
    Ok(config)
}

/// Reads, parses and validates a configuration file.
pub fn load_config(path: impl AsRef<Path>) -> Result<VenueConfig, QuorumError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let config = parse_config(&text)?;
    tracing::info!(
        path = %path.display(),
        activities = config.activities.len(),
        areas = config.areas.len(),
        "configuration loaded"
    );
    Ok(config)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use quorum_game::ConfigError;

    use super::*;

    #[test]
    fn test_parse_fills_defaults() {
        let config = parse_config(
            r#"{
                "areas": [{ "name": "table" }],
                "activities": [{ "name": "pool", "area": "table", "team_size": 1 }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.ready_timeout(), Duration::from_secs(60));
        assert_eq!(config.areas[0].capacity, 1);
        assert_eq!(config.activities[0].max_players(), 2);
        assert_eq!(config.roster.idle_threshold(), Duration::from_secs(600));
    }

    #[test]
    fn test_parse_reads_roster_settings() {
        let config = parse_config(r#"{ "idle_threshold_secs": 30, "commitment_secs": 45 }"#)
            .unwrap();
        assert_eq!(config.roster.idle_threshold(), Duration::from_secs(30));
        assert_eq!(config.roster.commitment(), Duration::from_secs(45));
    }

    #[test]
    fn test_parse_rejects_unknown_area() {
        let err = parse_config(
            r#"{ "activities": [{ "name": "pool", "area": "table", "team_size": 1 }] }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            QuorumError::Config(ConfigError::UnknownArea { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(matches!(
            parse_config("{ not json"),
            Err(QuorumError::Protocol(_))
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_config(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, QuorumError::Io(_)));
    }
}
