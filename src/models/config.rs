//! Typed tournament configuration, validated once at load.

use crate::models::tournament::TournamentError;
use crate::models::world::Location;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Longest duration any timer setting may ask for: one week.
pub const MAX_DURATION_SECS: u64 = 7 * 24 * 60 * 60;
const MAX_DURATION_MS: u64 = MAX_DURATION_SECS * 1000;

/// Lobby announcement cadence.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LobbyConfig {
    /// Seconds between "starting in N seconds" announcements.
    pub announcement_interval_secs: u64,
    /// Number of announcements before the lobby closes.
    pub announcement_times: u32,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            announcement_interval_secs: 10,
            announcement_times: 3,
        }
    }
}

impl LobbyConfig {
    /// Total lobby length: one extra interval after the last announcement.
    pub fn total_secs(&self) -> u64 {
        (u64::from(self.announcement_times) + 1).saturating_mul(self.announcement_interval_secs)
    }
}

/// Locations the tournament cannot run without.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArenaLocations {
    pub lobby: Option<Location>,
    pub exit: Option<Location>,
    pub arena_entrances: Vec<Location>,
}

/// Shrinking arena boundary.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BorderConfig {
    pub center: Location,
    pub initial_size: u32,
    pub final_size: u32,
    pub shrink_size: u32,
    pub interval_secs: u64,
    #[serde(default)]
    pub damage: f64,
}

/// Stand-in ("proxy") policy for participants who drop mid-duel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StandInConfig {
    pub enabled: bool,
    pub max_disconnections: u32,
    pub max_offline_ms: u64,
    pub combat_timeout_ms: u64,
    /// Visual / mob type requested from the stand-in provider.
    pub appearance: String,
}

impl Default for StandInConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_disconnections: 3,
            max_offline_ms: 300_000,
            combat_timeout_ms: 15_000,
            appearance: "villager".to_string(),
        }
    }
}

/// Which rule set drives the tournament.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum RuleKind {
    #[default]
    Elimination,
    /// A hit only counts once the attacker has landed `hit_amount` of them.
    HitCount { hit_amount: u32 },
}

/// Full configuration for one tournament run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TournamentConfig {
    pub name: String,
    pub group_mode: bool,
    pub minimum_players: usize,
    pub maximum_players: usize,
    pub minimum_groups: usize,
    pub minimum_playtime_secs: u64,
    /// Trim the pool from the tail to a power of two before the first pairing.
    pub power_of_two: bool,
    pub lobby: LobbyConfig,
    pub preparation_secs: u64,
    pub expiration_secs: u64,
    /// Pause between a resolved duel and the next preparation.
    pub next_duel_delay_ms: u64,
    pub locations: ArenaLocations,
    pub border: Option<BorderConfig>,
    pub commands_before_battle: Vec<String>,
    pub commands_after_battle: Vec<String>,
    pub stand_in: StandInConfig,
    pub rules: RuleKind,
    /// Fixed seed for reproducible pairings; random when absent.
    pub shuffle_seed: Option<u64>,
}

impl Default for TournamentConfig {
    fn default() -> Self {
        Self {
            name: "tournament".to_string(),
            group_mode: false,
            minimum_players: 2,
            maximum_players: 100,
            minimum_groups: 2,
            minimum_playtime_secs: 0,
            power_of_two: false,
            lobby: LobbyConfig::default(),
            preparation_secs: 10,
            expiration_secs: 3600,
            next_duel_delay_ms: 1000,
            locations: ArenaLocations::default(),
            border: None,
            commands_before_battle: Vec::new(),
            commands_after_battle: Vec::new(),
            stand_in: StandInConfig::default(),
            rules: RuleKind::default(),
            shuffle_seed: None,
        }
    }
}

impl TournamentConfig {
    /// Parse and validate a JSON configuration.
    pub fn from_json_str(raw: &str) -> Result<Self, TournamentError> {
        let config: TournamentConfig =
            serde_json::from_str(raw).map_err(|e| TournamentError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TournamentError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            TournamentError::InvalidConfig(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// Structural checks. Missing locations are not checked here: they are a start-time error.
    pub fn validate(&self) -> Result<(), TournamentError> {
        let invalid = |msg: &str| Err(TournamentError::InvalidConfig(msg.to_string()));
        if self.name.trim().is_empty() {
            return invalid("name must not be empty");
        }
        if self.minimum_players < 2 {
            return invalid("minimum_players must be at least 2");
        }
        if self.maximum_players < self.minimum_players {
            return invalid("maximum_players must be >= minimum_players");
        }
        if self.group_mode && self.minimum_groups < 2 {
            return invalid("minimum_groups must be at least 2 in group mode");
        }
        if self.lobby.announcement_interval_secs == 0 {
            return invalid("lobby.announcement_interval_secs must be positive");
        }
        if self.lobby.total_secs() > MAX_DURATION_SECS {
            return invalid("lobby must not last longer than a week");
        }
        if self.expiration_secs == 0 {
            return invalid("expiration_secs must be positive");
        }
        if self.expiration_secs > MAX_DURATION_SECS || self.preparation_secs > MAX_DURATION_SECS {
            return invalid("expiration_secs and preparation_secs must not exceed a week");
        }
        if self.next_duel_delay_ms > MAX_DURATION_MS
            || self.stand_in.max_offline_ms > MAX_DURATION_MS
            || self.stand_in.combat_timeout_ms > MAX_DURATION_MS
        {
            return invalid("delays must not exceed a week");
        }
        if let Some(border) = &self.border {
            if border.final_size > border.initial_size {
                return invalid("border.final_size must be <= border.initial_size");
            }
            if border.interval_secs == 0 {
                return invalid("border.interval_secs must be positive");
            }
            if border.interval_secs > MAX_DURATION_SECS {
                return invalid("border.interval_secs must not exceed a week");
            }
        }
        if self.stand_in.max_disconnections == 0 {
            return invalid("stand_in.max_disconnections must be at least 1");
        }
        if let RuleKind::HitCount { hit_amount } = self.rules {
            if hit_amount == 0 {
                return invalid("rules.hit_amount must be at least 1");
            }
        }
        Ok(())
    }

    /// Lobby, exit and at least one arena entrance are set.
    pub fn locations_set(&self) -> bool {
        self.locations.lobby.is_some()
            && self.locations.exit.is_some()
            && !self.locations.arena_entrances.is_empty()
    }
}
