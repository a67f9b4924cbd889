//! Round parameters and tuning constants
//!
//! Everything that shapes gameplay feel lives here so that a settings file can
//! override it without touching the simulation. The defaults reproduce the
//! classic arcade timings at 60 ticks per second.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Well-known UDP port the authority listens on
pub const DEFAULT_PORT: u16 = 4893;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read settings file: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid settings file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unknown difficulty '{0}' (expected easy, medium or hard)")]
    UnknownDifficulty(String),
}

/// AI difficulty tier. Only fire cadence and hesitation differ between tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    /// Chance out of ten that an AI passes on a clear shot
    pub fn hesitation(self) -> u32 {
        match self {
            Difficulty::Easy => 8,
            Difficulty::Medium => 5,
            Difficulty::Hard => 1,
        }
    }

    /// Minimum seconds between two fire attempts
    pub fn fire_cooldown_secs(self) -> u32 {
        match self {
            Difficulty::Easy => 3,
            Difficulty::Medium => 2,
            Difficulty::Hard => 1,
        }
    }
}

impl FromStr for Difficulty {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(ConfigError::UnknownDifficulty(s.to_string())),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        f.write_str(name)
    }
}

/// Overlap thresholds used by the movement validator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    /// Perpendicular distance under which two characters share a lane
    pub lateral_tolerance: f32,
    /// Leading distance that blocks vertical travel
    pub vertical_reach: f32,
    /// Leading distance that blocks horizontal travel
    pub horizontal_reach: f32,
    /// How far past the tile center a character may drift before a hard stop
    pub boundary_slack: f32,
    /// Tiles carrying the mover's own color cannot be re-entered
    pub own_color_blocks: bool,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            lateral_tolerance: 0.8,
            vertical_reach: 1.0,
            horizontal_reach: 1.1,
            boundary_slack: 0.7,
            own_color_blocks: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub lives: u32,
    pub difficulty: Difficulty,
    pub tick_rate: u32,
    pub movement_step: f32,
    pub collision: CollisionConfig,
    pub weapon_step: f32,
    pub weapon_flight_ticks: u32,
    pub weapon_linger_ticks: u32,
    pub tile_recovery_ticks: u32,
    pub tile_recovery_stagger: u32,
    pub max_flood_tiles: usize,
    /// Ticks before a claimed tile fades back; zero keeps claims forever
    pub claim_ticks: u32,
    pub character_recovery_ticks: u32,
    pub countdown_seconds: u32,
    pub round_reset_ticks: u32,
    pub snapshot_interval_ticks: u32,
    pub peer_timeout_secs: u64,
    pub ping_interval_ticks: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            lives: 5,
            difficulty: Difficulty::default(),
            tick_rate: 60,
            movement_step: 0.08,
            collision: CollisionConfig::default(),
            weapon_step: 0.75,
            weapon_flight_ticks: 30,
            weapon_linger_ticks: 20,
            tile_recovery_ticks: 129,
            tile_recovery_stagger: 10,
            max_flood_tiles: 7,
            claim_ticks: 180,
            character_recovery_ticks: 90,
            countdown_seconds: 3,
            round_reset_ticks: 240,
            snapshot_interval_ticks: 30,
            peer_timeout_secs: 5,
            ping_interval_ticks: 60,
        }
    }
}

impl GameConfig {
    /// Reads a JSON settings file. Missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.tick_rate.max(1)))
    }

    pub fn peer_timeout(&self) -> Duration {
        Duration::from_secs(self.peer_timeout_secs)
    }

    pub fn countdown_ticks(&self) -> u32 {
        self.countdown_seconds * self.tick_rate.max(1)
    }
}
