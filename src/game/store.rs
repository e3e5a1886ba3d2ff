//! The canonical mutable world state.
//!
//! The store holds pure data and accessors, no game rules. Players and
//! entities live in ordered maps so that every iteration over them is
//! deterministic regardless of insertion history.

use std::collections::{BTreeMap, BTreeSet};

use crate::game::{Dropoff, DropoffId, Energy, Entity, EntityId, Location, Player, PlayerId};

/// Canonical game state outside the map grid: players, entities, and the
/// bookkeeping that spans them.
#[derive(Debug, Clone, Default)]
pub struct Store {
    /// All players, keyed by id. Players are never removed, only terminated.
    pub players: BTreeMap<PlayerId, Player>,
    /// All live entities, keyed by id.
    pub entities: BTreeMap<EntityId, Entity>,
    /// Total energy remaining on map cells. Owned cells hold none outside
    /// of a commit, so this is also the harvestable pool.
    pub map_total_energy: Energy,
    /// Cells whose energy changed during the current turn.
    pub changed_cells: BTreeSet<Location>,
    next_entity_id: EntityId,
    next_dropoff_id: DropoffId,
}

impl Store {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a player by id.
    ///
    /// # Panics
    ///
    /// Panics if the player does not exist; player ids are fixed at game
    /// start, so a miss is an engine bug.
    #[must_use]
    pub fn player(&self, id: PlayerId) -> &Player {
        self.players.get(&id).expect("player not in store")
    }

    /// Get a player by id, mutably.
    ///
    /// # Panics
    ///
    /// Panics if the player does not exist.
    pub fn player_mut(&mut self, id: PlayerId) -> &mut Player {
        self.players.get_mut(&id).expect("player not in store")
    }

    /// Get an entity by id.
    ///
    /// # Panics
    ///
    /// Panics if the entity does not exist; callers only hold ids of live
    /// entities, so a miss is an engine bug.
    #[must_use]
    pub fn entity(&self, id: EntityId) -> &Entity {
        self.entities.get(&id).expect("entity not in store")
    }

    /// Get an entity by id, mutably.
    ///
    /// # Panics
    ///
    /// Panics if the entity does not exist.
    pub fn entity_mut(&mut self, id: EntityId) -> &mut Entity {
        self.entities.get_mut(&id).expect("entity not in store")
    }

    /// Create a new entity with the given energy and owner, returning its id.
    pub fn new_entity(&mut self, energy: Energy, owner: PlayerId) -> EntityId {
        let id = self.next_entity_id;
        self.next_entity_id += 1;
        self.entities.insert(id, Entity::new(id, owner, energy));
        id
    }

    /// Delete an entity from the store.
    pub fn delete_entity(&mut self, id: EntityId) {
        self.entities.remove(&id);
    }

    /// Create a new dropoff record at the given location.
    pub fn new_dropoff(&mut self, location: Location) -> Dropoff {
        let id = self.next_dropoff_id;
        self.next_dropoff_id += 1;
        Dropoff {
            id,
            location,
            deposited: 0,
        }
    }

    /// Sum of all player balances.
    #[must_use]
    pub fn total_player_energy(&self) -> Energy {
        self.players.values().map(|player| player.energy).sum()
    }

    /// Sum of energy carried by all live entities.
    #[must_use]
    pub fn total_carried_energy(&self) -> Energy {
        self.entities.values().map(|entity| entity.energy).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_ids_monotonic() {
        let mut store = Store::new();
        let a = store.new_entity(0, 0);
        let b = store.new_entity(10, 1);
        assert!(b > a);

        store.delete_entity(a);
        let c = store.new_entity(0, 0);
        assert!(c > b, "ids are never reused");
    }

    #[test]
    fn test_entity_lookup() {
        let mut store = Store::new();
        let id = store.new_entity(42, 3);
        assert_eq!(store.entity(id).energy, 42);
        assert_eq!(store.entity(id).owner, 3);

        store.entity_mut(id).energy = 7;
        assert_eq!(store.entity(id).energy, 7);
    }

    #[test]
    fn test_energy_totals() {
        let mut store = Store::new();
        store
            .players
            .insert(0, Player::new(0, Location::new(0, 0), 1000));
        store
            .players
            .insert(1, Player::new(1, Location::new(5, 5), 500));
        store.new_entity(30, 0);
        store.new_entity(70, 1);

        assert_eq!(store.total_player_energy(), 1500);
        assert_eq!(store.total_carried_energy(), 100);
    }

    #[test]
    fn test_dropoff_ids_monotonic() {
        let mut store = Store::new();
        let first = store.new_dropoff(Location::new(1, 1));
        let second = store.new_dropoff(Location::new(2, 2));
        assert!(second.id > first.id);
        assert_eq!(first.deposited, 0);
    }
}
