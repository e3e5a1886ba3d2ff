//! Gameplay constants.
//!
//! All tunable rules of the game live in a single immutable [`Constants`]
//! value that is constructed once (from defaults or a JSON file) and passed
//! by reference into every component that needs it. Nothing mutates it after
//! game start.

use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::game::Energy;

/// Gameplay constants that may be tweaked, though they should be at their
/// default values in a tournament setting.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Constants {
    /// Whether strict error checking mode is enabled. In strict mode,
    /// normally-ignorable command errors (an unaffordable move, a
    /// self-collision) end the game instead of being logged and skipped.
    pub strict_errors: bool,

    /// The maximum number of players.
    pub max_players: usize,

    /// The maximum amount of energy per entity (carrying capacity).
    pub max_energy: Energy,
    /// The cost of a new entity.
    pub new_entity_cost: Energy,
    /// The initial energy balance for a player.
    pub initial_energy: Energy,

    /// The cost of a dropoff construction.
    pub dropoff_cost: Energy,
    /// The cost of a move is the source cell's energy divided by this.
    pub move_cost_ratio: Energy,
    /// Divisor applied to energy deposited onto another player's cell; the
    /// cell owner receives `amount / dropoff_penalty_ratio` and the
    /// depositing entity's owner keeps the remainder.
    pub dropoff_penalty_ratio: Energy,
    /// The ratio of energy extracted from a cell per turn.
    pub extract_ratio: Energy,

    /// Turn limit for the smallest maps.
    pub min_turns: u32,
    /// Map dimension at or below which `min_turns` applies.
    pub min_turn_threshold: u16,
    /// Turn limit for the largest maps.
    pub max_turns: u32,
    /// Map dimension at which `max_turns` applies.
    pub max_turn_threshold: u16,

    /// Whether the capture mechanic is enabled.
    pub capture_enabled: bool,
    /// The distance within which entities count toward a capture.
    pub capture_radius: i32,
    /// An entity is captured when some single opposing player has at least
    /// this many more entities than the owner within the capture radius.
    pub ships_above_for_capture: usize,

    /// Whether the inspiration mechanic is enabled.
    pub inspiration_enabled: bool,
    /// Maximum distance at which opposing entities count toward inspiration.
    pub inspiration_radius: i32,
    /// Number of opposing entities required within the radius to inspire.
    pub inspiration_ship_count: usize,
    /// Alternative extraction ratio for inspired entities.
    pub inspired_extract_ratio: Energy,
    /// Alternative move cost ratio for inspired entities.
    pub inspired_move_cost_ratio: Energy,
    /// Bonus multiplier for inspired extraction: removing Y energy from a
    /// cell additionally credits `multiplier * Y` to the entity.
    pub inspired_bonus_multiplier: f64,

    /// Deadline in milliseconds for each per-player command request.
    pub turn_deadline_ms: u64,
}

impl Default for Constants {
    fn default() -> Self {
        Self {
            strict_errors: false,
            max_players: 16,
            max_energy: 1000,
            new_entity_cost: 1000,
            initial_energy: 5000,
            dropoff_cost: 4000,
            move_cost_ratio: 10,
            dropoff_penalty_ratio: 4,
            extract_ratio: 4,
            min_turns: 400,
            min_turn_threshold: 32,
            max_turns: 500,
            max_turn_threshold: 64,
            capture_enabled: false,
            capture_radius: 3,
            ships_above_for_capture: 3,
            inspiration_enabled: true,
            inspiration_radius: 4,
            inspiration_ship_count: 2,
            inspired_extract_ratio: 4,
            inspired_move_cost_ratio: 10,
            inspired_bonus_multiplier: 2.0,
            turn_deadline_ms: 2000,
        }
    }
}

impl Constants {
    /// Load constants from a JSON file. Missing fields fall back to their
    /// default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> io::Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(io::Error::other)
    }

    /// Turn limit for a map of the given dimensions.
    ///
    /// Interpolates between `min_turns` (at `min_turn_threshold`) and
    /// `max_turns` (at `max_turn_threshold`) by the larger map dimension.
    #[must_use]
    pub fn turn_limit(&self, width: u16, height: u16) -> u32 {
        let dimension = width.max(height);
        if dimension <= self.min_turn_threshold {
            return self.min_turns;
        }
        let span = f64::from(self.max_turn_threshold - self.min_turn_threshold);
        let above = f64::from(dimension - self.min_turn_threshold);
        let extra = (above / span) * f64::from(self.max_turns - self.min_turns);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            (self.min_turns + extra as u32).min(self.max_turns)
        }
    }
}
