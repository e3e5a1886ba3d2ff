//! Replay recording.
//!
//! Because command retrieval crosses a process boundary, a replay cannot be
//! reconstructed from a seed alone; the engine records one frame per turn
//! (the events that happened, the cells whose energy changed, and an
//! end-of-turn snapshot of every player) plus the final statistics. Replays
//! are serialized as JSON.

use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::Constants;
use crate::engine::PlayerStatistics;
use crate::game::{Energy, EntityId, GameEvent, Location, PlayerId};

/// Snapshot of one entity at the end of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    /// The entity's id.
    pub id: EntityId,
    /// The entity's owner.
    pub owner: PlayerId,
    /// Where the entity is.
    pub location: Location,
    /// Carried energy.
    pub energy: Energy,
    /// Whether the entity is inspired this turn.
    pub is_inspired: bool,
}

/// A cell whose energy changed during a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellUpdate {
    /// The cell's location.
    pub location: Location,
    /// The cell's energy after the turn.
    pub energy: Energy,
}

/// End-of-turn snapshot of one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    /// The player's id.
    pub player: PlayerId,
    /// Energy balance at the end of the turn.
    pub energy: Energy,
    /// Cumulative energy deposited so far.
    pub deposited: Energy,
}

/// Everything that happened during one turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// The turn number, starting at 1.
    pub turn: u32,
    /// Events emitted while the turn committed, in commit order.
    pub events: Vec<GameEvent>,
    /// Cells whose energy changed this turn.
    pub cells: Vec<CellUpdate>,
    /// All live entities at the end of the turn.
    pub entities: Vec<EntityState>,
    /// Per-player balances at the end of the turn.
    pub players: Vec<PlayerSnapshot>,
}

/// Static description of a player recorded at game start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayPlayer {
    /// The player's id.
    pub id: PlayerId,
    /// The player's reported name.
    pub name: String,
    /// The player's factory location.
    pub factory: Location,
    /// Whether the player was terminated for a transport failure.
    pub terminated: bool,
}

/// A complete recorded game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replay {
    /// Replay format version.
    pub version: u32,
    /// The constants the game ran with.
    pub constants: Constants,
    /// Map generation seed.
    pub seed: u64,
    /// Map width.
    pub map_width: u16,
    /// Map height.
    pub map_height: u16,
    /// Initial cell energies in row-major order, recorded after factory
    /// cells are cleared.
    pub initial_cells: Vec<Energy>,
    /// The players, ordered by id.
    pub players: Vec<ReplayPlayer>,
    /// One frame per turn.
    pub frames: Vec<Frame>,
    /// Final per-player statistics, ordered by id, with ranks assigned.
    pub statistics: Vec<PlayerStatistics>,
}

/// Current replay format version.
pub const REPLAY_VERSION: u32 = 1;

impl Replay {
    /// Save the replay to a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save(&self, path: &Path) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer(BufWriter::new(file), self).map_err(io::Error::other)
    }

    /// Load a replay from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid replay.
    pub fn load(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        serde_json::from_reader(BufReader::new(file)).map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_replay() -> Replay {
        Replay {
            version: REPLAY_VERSION,
            constants: Constants::default(),
            seed: 42,
            map_width: 8,
            map_height: 8,
            initial_cells: vec![0; 64],
            players: vec![ReplayPlayer {
                id: 0,
                name: "bot".to_string(),
                factory: Location::new(1, 1),
                terminated: false,
            }],
            frames: vec![Frame {
                turn: 1,
                events: vec![GameEvent::Spawn {
                    location: Location::new(1, 1),
                    owner: 0,
                    id: 0,
                    energy: 0,
                }],
                cells: vec![CellUpdate {
                    location: Location::new(2, 2),
                    energy: 17,
                }],
                entities: vec![EntityState {
                    id: 0,
                    owner: 0,
                    location: Location::new(1, 1),
                    energy: 0,
                    is_inspired: false,
                }],
                players: vec![PlayerSnapshot {
                    player: 0,
                    energy: 4000,
                    deposited: 0,
                }],
            }],
            statistics: Vec::new(),
        }
    }

    #[test]
    fn test_save_load_round_trip() {
        let replay = sample_replay();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("game.json");

        replay.save(&path).unwrap();
        let loaded = Replay::load(&path).unwrap();

        assert_eq!(loaded.version, replay.version);
        assert_eq!(loaded.seed, 42);
        assert_eq!(loaded.frames, replay.frames);
        assert_eq!(loaded.players, replay.players);
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "not json").unwrap();
        assert!(Replay::load(&path).is_err());
    }
}
