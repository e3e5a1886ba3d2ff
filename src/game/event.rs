//! Domain events emitted during transaction commit.
//!
//! Events are write-once: ledgers append them to the turn's sink during
//! commit and the engine forwards them to the replay frame. They are never
//! mutated afterwards.

use serde::{Deserialize, Serialize};

use crate::game::{Energy, EntityId, Location, PlayerId};

/// Something that happened during game simulation, recorded for the replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GameEvent {
    /// A new entity materialized at a factory.
    Spawn {
        /// Where the entity appeared.
        location: Location,
        /// The spawning player.
        owner: PlayerId,
        /// The new entity's id.
        id: EntityId,
        /// The new entity's starting energy.
        energy: Energy,
    },
    /// Two or more entities were destroyed contending for one cell.
    Collision {
        /// The contended cell.
        location: Location,
        /// All destroyed entities, sorted by id for determinism.
        entities: Vec<EntityId>,
    },
    /// An entity was converted into a dropoff.
    Construction {
        /// The new dropoff's cell.
        location: Location,
        /// The constructing player.
        owner: PlayerId,
        /// The consumed entity's id.
        id: EntityId,
    },
    /// An entity changed hands through the capture mechanic.
    Capture {
        /// Where the capture happened.
        location: Location,
        /// The player that lost the entity.
        old_owner: PlayerId,
        /// The destroyed entity's id.
        old_id: EntityId,
        /// The player that gained the entity.
        new_owner: PlayerId,
        /// The replacement entity's id.
        new_id: EntityId,
    },
}

impl GameEvent {
    /// The location the event happened at.
    #[must_use]
    pub const fn location(&self) -> Location {
        match self {
            Self::Spawn { location, .. }
            | Self::Collision { location, .. }
            | Self::Construction { location, .. }
            | Self::Capture { location, .. } => *location,
        }
    }
}
