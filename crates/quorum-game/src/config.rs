//! Venue configuration: areas, activities, and timing.

use std::collections::HashSet;
use std::time::Duration;

use quorum_roster::RosterConfig;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// AreaConfig
// ---------------------------------------------------------------------------

/// A shared physical resource, e.g. a table or a court.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaConfig {
    pub name: String,

    /// How many games may hold the area at once. 0 means unlimited.
    ///
    /// Default: 1.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    1
}

// ---------------------------------------------------------------------------
// ActivityConfig
// ---------------------------------------------------------------------------

/// One kind of game, e.g. foosball doubles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityConfig {
    pub name: String,

    /// The area games of this activity need. Activities without one share
    /// an implicit area with unlimited capacity.
    #[serde(default)]
    pub area: Option<String>,

    /// Players per team. 0 makes the activity unbounded.
    pub team_size: usize,

    /// Default: 2.
    #[serde(default = "default_team_count")]
    pub team_count: usize,

    /// Fewest players that may commence early with a ready mark.
    #[serde(default)]
    pub min_players: Option<usize>,
}

fn default_team_count() -> usize {
    2
}

impl ActivityConfig {
    /// Creates a fixed-size activity with no area.
    pub fn new(name: impl Into<String>, team_size: usize, team_count: usize) -> Self {
        Self {
            name: name.into(),
            area: None,
            team_size,
            team_count,
            min_players: None,
        }
    }

    /// Places the activity in a named area.
    pub fn in_area(mut self, area: impl Into<String>) -> Self {
        self.area = Some(area.into());
        self
    }

    /// Sets the early-commencement minimum.
    pub fn with_min_players(mut self, min: usize) -> Self {
        self.min_players = Some(min);
        self
    }

    /// Maximum participants per game. 0 means unbounded.
    pub fn max_players(&self) -> usize {
        self.team_size.saturating_mul(self.team_count)
    }

    /// Whether games can be started early with a ready mark.
    pub fn is_flexible(&self) -> bool {
        let max = self.max_players();
        max == 0 || self.min_players.is_some_and(|min| min < max)
    }

    /// The ready-mark minimum: the configured one, or 1 for unbounded
    /// activities, or the maximum for fixed ones.
    pub fn min_players(&self) -> usize {
        match self.min_players {
            Some(min) => min,
            None if self.max_players() == 0 => 1,
            None => self.max_players(),
        }
    }

    /// The `[NAME]` prefix used on announcements.
    pub fn tag(&self) -> String {
        format!("[{}]", self.name.to_uppercase())
    }
}

// ---------------------------------------------------------------------------
// VenueConfig
// ---------------------------------------------------------------------------

/// Everything needed to build a [`Venue`](crate::Venue).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueConfig {
    /// How long idle participants get to confirm before being dropped.
    ///
    /// Default: 60 seconds.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_secs: u64,

    /// Idle threshold and commitment length.
    #[serde(flatten)]
    pub roster: RosterConfig,

    #[serde(default)]
    pub areas: Vec<AreaConfig>,

    #[serde(default)]
    pub activities: Vec<ActivityConfig>,
}

fn default_ready_timeout() -> u64 {
    60
}

impl Default for VenueConfig {
    fn default() -> Self {
        Self {
            ready_timeout_secs: default_ready_timeout(),
            roster: RosterConfig::default(),
            areas: Vec::new(),
            activities: Vec::new(),
        }
    }
}

impl VenueConfig {
    /// The ready timeout as a `Duration`.
    pub fn ready_timeout(&self) -> Duration {
        Duration::from_secs(self.ready_timeout_secs)
    }

    /// Checks names are unique, areas exist, and team sizes fit.
    ///
    /// An activity without an area gets one named after itself, so that
    /// name may not also be a configured area.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut areas = HashSet::new();
        for area in &self.areas {
            if !areas.insert(area.name.as_str()) {
                return Err(ConfigError::DuplicateArea(area.name.clone()));
            }
        }

        let mut activities = HashSet::new();
        for activity in &self.activities {
            if !activities.insert(activity.name.as_str()) {
                return Err(ConfigError::DuplicateActivity(activity.name.clone()));
            }
            match &activity.area {
                Some(area) if !areas.contains(area.as_str()) => {
                    return Err(ConfigError::UnknownArea {
                        activity: activity.name.clone(),
                        area: area.clone(),
                    });
                }
                None if areas.contains(activity.name.as_str()) => {
                    return Err(ConfigError::ImplicitAreaClash(activity.name.clone()));
                }
                _ => {}
            }
            let Some(max) = activity.team_size.checked_mul(activity.team_count) else {
                return Err(ConfigError::TooManyPlayers(activity.name.clone()));
            };
            if max > 0 && activity.min_players() > max {
                return Err(ConfigError::MinAboveMax {
                    activity: activity.name.clone(),
                    min: activity.min_players(),
                    max,
                });
            }
        }
        Ok(())
    }
}

/// A venue configuration that cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("area '{0}' is configured twice")]
    DuplicateArea(String),

    #[error("activity '{0}' is configured twice")]
    DuplicateActivity(String),

    #[error("activity '{activity}' uses unknown area '{area}'")]
    UnknownArea { activity: String, area: String },

    /// An activity without an area shares its name with a configured area.
    #[error("activity '{0}' has no area but an area of that name is configured")]
    ImplicitAreaClash(String),

    #[error("activity '{0}' has more players per game than can be counted")]
    TooManyPlayers(String),

    #[error("activity '{activity}' needs at least {min} players but holds at most {max}")]
    MinAboveMax {
        activity: String,
        min: usize,
        max: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_sizes() {
        let doubles = ActivityConfig::new("foosball", 2, 2);
        assert_eq!(doubles.max_players(), 4);
        assert!(!doubles.is_flexible());
        assert_eq!(doubles.min_players(), 4);
        assert_eq!(doubles.tag(), "[FOOSBALL]");

        let open = ActivityConfig::new("lunch", 0, 1);
        assert_eq!(open.max_players(), 0);
        assert!(open.is_flexible());
        assert_eq!(open.min_players(), 1);

        let squash = ActivityConfig::new("pool", 1, 4).with_min_players(2);
        assert!(squash.is_flexible());
        assert_eq!(squash.min_players(), 2);
    }

    #[test]
    fn test_venue_config_defaults_from_json() {
        let config: VenueConfig = serde_json::from_str(
            r#"{
                "areas": [{ "name": "table" }],
                "activities": [{ "name": "foosball", "area": "table", "team_size": 2 }]
            }"#,
        )
        .unwrap();
        assert_eq!(config.ready_timeout_secs, 60);
        assert_eq!(config.roster.idle_threshold_secs, 600);
        assert_eq!(config.areas[0].capacity, 1);
        assert_eq!(config.activities[0].team_count, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unknown_area() {
        let config = VenueConfig {
            activities: vec![ActivityConfig::new("pool", 1, 2).in_area("basement")],
            ..VenueConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::UnknownArea { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicates_and_bad_minimum() {
        let config = VenueConfig {
            activities: vec![
                ActivityConfig::new("pool", 1, 2),
                ActivityConfig::new("pool", 1, 2),
            ],
            ..VenueConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::DuplicateActivity("pool".into()))
        );

        let config = VenueConfig {
            activities: vec![ActivityConfig::new("pool", 1, 2).with_min_players(3)],
            ..VenueConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::MinAboveMax { .. })));
    }

    #[test]
    fn test_validate_rejects_implicit_area_clash() {
        let config = VenueConfig {
            areas: vec![AreaConfig {
                name: "lunch".into(),
                capacity: 2,
            }],
            activities: vec![ActivityConfig::new("lunch", 0, 2)],
            ..VenueConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::ImplicitAreaClash("lunch".into()))
        );
    }

    #[test]
    fn test_validate_rejects_overflowing_team_size() {
        let config = VenueConfig {
            activities: vec![ActivityConfig::new("crowd", usize::MAX, 2)],
            ..VenueConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::TooManyPlayers("crowd".into()))
        );
        assert_eq!(config.activities[0].max_players(), usize::MAX);
    }
}
