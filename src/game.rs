//! Game layer for Ember.
//!
//! Implements the world model and the turn transaction:
//! - Map of cells (energy, ownership, occupancy) on a torus
//! - Players, entities, and dropoffs
//! - Commands and their wire syntax
//! - Command ledgers and the atomic per-turn transaction
//! - Invariant checks

mod command;
mod entity;
mod error;
mod event;
mod invariants;
mod map;
mod player;
mod store;
mod transaction;

pub use command::{Command, ParseError, parse_commands};
pub use entity::{Entity, EntityId};
pub use error::{CommandError, CommandErrorKind};
pub use event::GameEvent;
pub use invariants::{EnergyLedger, InvariantViolation, assert_invariants, check_invariants};
pub use map::{Cell, Direction, Location, Map};
pub use player::{Dropoff, DropoffId, Player, PlayerId};
pub use store::Store;
pub use transaction::{TurnSink, TurnTransaction};

/// The single collectible and spendable resource.
pub type Energy = i64;
