//! Player and dropoff state.

use std::collections::BTreeMap;

use crate::game::{Energy, EntityId, Location};

/// Unique identifier for a player.
pub type PlayerId = u8;

/// Unique identifier for a dropoff.
pub type DropoffId = u32;

/// A constructed deposit point. Dropoffs are created by a committed
/// Construct command and never destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dropoff {
    /// Unique identifier for this dropoff.
    pub id: DropoffId,
    /// Fixed location of this dropoff.
    pub location: Location,
    /// Cumulative energy deposited through this dropoff (statistics only).
    pub deposited: Energy,
}

/// State for a single player.
///
/// A terminated player stays in the roster (final ranking needs it) but
/// submits no further commands and owns no entities.
#[derive(Debug, Clone)]
pub struct Player {
    /// Unique identifier for this player.
    pub id: PlayerId,
    /// Location of the player's factory.
    pub factory: Location,
    /// Current energy balance.
    pub energy: Energy,
    /// Dropoffs constructed by this player.
    pub dropoffs: Vec<Dropoff>,
    /// Owned entities and their current locations.
    pub entities: BTreeMap<EntityId, Location>,
    /// Set when the player is removed from the game for a transport or
    /// protocol failure.
    pub terminated: bool,
    /// Cleared the first turn the player has no entities and cannot afford
    /// to spawn one.
    pub can_play: bool,
    /// Cumulative energy deposited by this player (statistics only).
    pub total_deposited: Energy,
    /// Cumulative energy deposited at the factory (statistics only).
    pub factory_deposited: Energy,
}

impl Player {
    /// Create a new player with the given id, factory location, and starting
    /// balance.
    #[must_use]
    pub fn new(id: PlayerId, factory: Location, energy: Energy) -> Self {
        Self {
            id,
            factory,
            energy,
            dropoffs: Vec::new(),
            entities: BTreeMap::new(),
            terminated: false,
            can_play: true,
            total_deposited: 0,
            factory_deposited: 0,
        }
    }

    /// Whether this player owns the given entity.
    #[must_use]
    pub fn has_entity(&self, entity: EntityId) -> bool {
        self.entities.contains_key(&entity)
    }

    /// The location of an owned entity.
    #[must_use]
    pub fn entity_location(&self, entity: EntityId) -> Option<Location> {
        self.entities.get(&entity).copied()
    }

    /// Record ownership of an entity at a location.
    pub fn add_entity(&mut self, entity: EntityId, location: Location) {
        self.entities.insert(entity, location);
    }

    /// Release ownership of an entity.
    pub fn remove_entity(&mut self, entity: EntityId) {
        self.entities.remove(&entity);
    }

    /// Whether this player still participates in turns.
    #[must_use]
    pub const fn is_eligible(&self) -> bool {
        !self.terminated && self.can_play
    }
}
