//! Engine invariants - sanity checks that detect bugs.
//!
//! These should NEVER trigger in a correctly implemented engine: a
//! violation indicates an implementation bug, not a player fault, and the
//! engine halts with a diagnostic rather than attempting recovery.

use std::fmt;

use crate::config::Constants;
use crate::game::{Energy, Map, Store};

/// Running account of every documented way energy enters or leaves the
/// economy. The conservation invariant checks the world total against it.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnergyLedger {
    /// Energy present at game start (map plus starting balances).
    pub initial: Energy,
    /// Energy minted by inspiration bonuses.
    pub minted: Energy,
    /// Energy destroyed by command fees (move costs, spawn fees, full
    /// construction fees).
    pub spent: Energy,
    /// Energy destroyed by player termination (zeroed balances).
    pub destroyed: Energy,
}

impl EnergyLedger {
    /// The world total the ledger predicts.
    #[must_use]
    pub const fn expected_total(&self) -> Energy {
        self.initial + self.minted - self.spent - self.destroyed
    }
}

/// Invariant violation error.
#[derive(Debug, Clone)]
pub struct InvariantViolation {
    /// Description of the violated invariant.
    pub message: String,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invariant violation: {}", self.message)
    }
}

impl std::error::Error for InvariantViolation {}

/// Check all engine invariants.
///
/// Returns the violations found, or empty if all invariants hold.
#[must_use]
pub fn check_invariants(
    store: &Store,
    map: &Map,
    constants: &Constants,
    ledger: &EnergyLedger,
) -> Vec<InvariantViolation> {
    let mut violations = Vec::new();
    let mut push = |message: String| violations.push(InvariantViolation { message });

    // Cell-side occupancy: every occupant id resolves to a live entity
    // whose owner places it on this cell.
    for (location, cell) in map.iter() {
        if cell.energy < 0 {
            push(format!(
                "cell ({}, {}) has negative energy {}",
                location.x, location.y, cell.energy
            ));
        }
        if let Some(entity_id) = cell.entity {
            match store.entities.get(&entity_id) {
                None => push(format!(
                    "cell ({}, {}) references dead entity {entity_id}",
                    location.x, location.y
                )),
                Some(entity) => {
                    let recorded = store
                        .players
                        .get(&entity.owner)
                        .and_then(|player| player.entity_location(entity_id));
                    if recorded != Some(location) {
                        push(format!(
                            "entity {entity_id} occupies ({}, {}) but its owner records {recorded:?}",
                            location.x, location.y
                        ));
                    }
                }
            }
        }
    }

    // Entity-side: each entity appears in exactly its owner's set, on
    // exactly the cell that points back at it.
    let mut recorded_entities = 0usize;
    for (player_id, player) in &store.players {
        recorded_entities += player.entities.len();
        if player.terminated && !player.entities.is_empty() {
            push(format!(
                "terminated player {player_id} still owns {} entities",
                player.entities.len()
            ));
        }
        for (&entity_id, &location) in &player.entities {
            match store.entities.get(&entity_id) {
                None => push(format!(
                    "player {player_id} records dead entity {entity_id}"
                )),
                Some(entity) if entity.owner != *player_id => push(format!(
                    "entity {entity_id} is owned by {} but listed under player {player_id}",
                    entity.owner
                )),
                Some(_) => {
                    if map.at(location).entity != Some(entity_id) {
                        push(format!(
                            "entity {entity_id} recorded at ({}, {}) but the cell disagrees",
                            location.x, location.y
                        ));
                    }
                }
            }
        }
    }
    if recorded_entities != store.entities.len() {
        push(format!(
            "{} live entities but {recorded_entities} ownership records",
            store.entities.len()
        ));
    }

    for entity in store.entities.values() {
        if entity.energy < 0 || entity.energy > constants.max_energy {
            push(format!(
                "entity {} carries {} energy, outside 0..={}",
                entity.id, entity.energy, constants.max_energy
            ));
        }
    }

    if store.map_total_energy != map.total_energy() {
        push(format!(
            "store tracks {} map energy but cells sum to {}",
            store.map_total_energy,
            map.total_energy()
        ));
    }

    // Conservation: the world total moves only by documented production,
    // costs, and destruction.
    let total =
        store.total_player_energy() + store.total_carried_energy() + map.total_energy();
    if total != ledger.expected_total() {
        push(format!(
            "world holds {total} energy but the ledger predicts {} \
             (initial {} + minted {} - spent {} - destroyed {})",
            ledger.expected_total(),
            ledger.initial,
            ledger.minted,
            ledger.spent,
            ledger.destroyed
        ));
    }

    violations
}

/// Assert all engine invariants hold, panicking if any are violated.
///
/// Only active in debug builds. No-op in release builds.
///
/// # Panics
///
/// Panics with a detailed message if any invariant is violated.
#[cfg(debug_assertions)]
pub fn assert_invariants(store: &Store, map: &Map, constants: &Constants, ledger: &EnergyLedger) {
    let violations = check_invariants(store, map, constants, ledger);
    if !violations.is_empty() {
        let messages: Vec<_> = violations.iter().map(|v| v.message.as_str()).collect();
        panic!("Engine invariant violations:\n  - {}", messages.join("\n  - "));
    }
}

/// No-op in release builds.
#[cfg(not(debug_assertions))]
pub fn assert_invariants(
    _store: &Store,
    _map: &Map,
    _constants: &Constants,
    _ledger: &EnergyLedger,
) {
}
