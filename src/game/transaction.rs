//! The turn transaction: command ledgers, cross-cutting checks, and the
//! shared deposit rule.
//!
//! Each command kind has a ledger holding the commands of one round. A
//! ledger's `check` is pure and reports violations into the sink; `commit`
//! mutates the store and emits events. [`TurnTransaction`] aggregates the
//! four ledgers, enforces the rules no single ledger can see (duplicate
//! entity use, per-player expense limits, ownership), and commits them in a
//! fixed order: Construct, then Move, then auto-Deposit, then Spawn.
//! Construction resolves first so a just-converted cell is already owned
//! when movement contention is resolved; deposit runs right after movement
//! so an entity that just moved onto a dropoff banks the same turn; spawn
//! runs last so it sees the turn's final factory occupancy.
//!
//! Nothing here terminates players or retries: the engine drives the
//! retry-without-offenders loop by rebuilding a fresh transaction without
//! the offenders' commands.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::Constants;
use crate::game::{
    Command, CommandError, CommandErrorKind, Direction, Energy, EntityId, GameEvent, Location,
    Map, PlayerId, Store,
};

/// Accumulator for everything a transaction produces besides store
/// mutations: events for the replay, errors for diagnostics and offender
/// tracking, and bookkeeping the post-commit economy rules need.
#[derive(Debug, Default)]
pub struct TurnSink {
    /// Domain events, in commit order.
    pub events: Vec<GameEvent>,
    /// Accumulated command errors. Never causes an early exit.
    pub errors: Vec<CommandError>,
    /// Entities placed, spawned, or deposited-from by the committed
    /// transaction. These do not extract this turn.
    pub changed_entities: BTreeSet<EntityId>,
    /// Owner and cargo of every entity destroyed in a collision, for
    /// statistics.
    pub destroyed_cargo: Vec<(PlayerId, Energy)>,
    /// Energy removed from the economy by command fees this turn (move
    /// costs, spawn fees, full construction fees).
    pub spent: Energy,
}

impl TurnSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Players with at least one non-ignored error.
    #[must_use]
    pub fn offenders(&self) -> BTreeSet<PlayerId> {
        self.errors
            .iter()
            .filter(|error| !error.ignored)
            .map(|error| error.player)
            .collect()
    }
}

/// Deposit energy onto a cell.
///
/// The single rule shared by auto-deposit, collision destruction, and
/// construction: an unowned cell absorbs the energy back into the map; the
/// owner of an owned cell is credited in full when the depositing entity is
/// theirs, and otherwise receives `amount / dropoff_penalty_ratio` with the
/// remainder going back to the entity's own player.
pub(crate) fn deposit_energy(
    store: &mut Store,
    map: &mut Map,
    constants: &Constants,
    location: Location,
    source: PlayerId,
    amount: Energy,
) {
    match map.at(location).owner {
        None => {
            map.at_mut(location).energy += amount;
            store.map_total_energy += amount;
            store.changed_cells.insert(location);
        }
        Some(owner) if owner == source => credit_player(store, owner, location, amount),
        Some(owner) => {
            let share = amount / constants.dropoff_penalty_ratio;
            credit_player(store, owner, location, share);
            store.player_mut(source).energy += amount - share;
        }
    }
}

/// Credit a deposit to a player, tracking the factory/dropoff it came
/// through for statistics.
fn credit_player(store: &mut Store, owner: PlayerId, location: Location, amount: Energy) {
    let player = store.player_mut(owner);
    player.energy += amount;
    player.total_deposited += amount;
    if location == player.factory {
        player.factory_deposited += amount;
    } else if let Some(dropoff) = player
        .dropoffs
        .iter_mut()
        .find(|dropoff| dropoff.location == location)
    {
        dropoff.deposited += amount;
    } else {
        debug_assert!(false, "owned cell with neither factory nor dropoff");
    }
}

/// Ledger for Construct commands.
#[derive(Debug, Default)]
struct ConstructLedger {
    commands: BTreeMap<PlayerId, Vec<EntityId>>,
}

impl ConstructLedger {
    fn add(&mut self, player: PlayerId, entity: EntityId) {
        self.commands.entry(player).or_default().push(entity);
    }

    /// Valid iff every targeted cell is unowned. Ownership of the entity was
    /// already established when the command entered the transaction.
    fn check(&self, store: &Store, map: &Map, sink: &mut TurnSink) -> bool {
        let mut success = true;
        for (&player_id, entities) in &self.commands {
            for &entity_id in entities {
                let Some(location) = store.player(player_id).entity_location(entity_id) else {
                    continue;
                };
                if let Some(owner) = map.at(location).owner {
                    sink.errors.push(CommandError::new(
                        player_id,
                        Command::Construct { entity: entity_id },
                        CommandErrorKind::CellOwned { location, owner },
                    ));
                    success = false;
                }
            }
        }
        success
    }

    fn commit(&self, store: &mut Store, map: &mut Map, constants: &Constants, sink: &mut TurnSink) {
        for (&player_id, entities) in &self.commands {
            for &entity_id in entities {
                let location = store
                    .player(player_id)
                    .entity_location(entity_id)
                    .expect("constructing entity has a location");
                let cargo = store.entity(entity_id).energy;
                let cell_energy = map.at(location).energy;

                // Claim the cell and clear it.
                let cell = map.at_mut(location);
                cell.owner = Some(player_id);
                cell.energy = 0;
                cell.entity = None;

                let dropoff = store.new_dropoff(location);
                store.player_mut(player_id).dropoffs.push(dropoff);
                store.map_total_energy -= cell_energy;
                store.changed_cells.insert(location);

                sink.events.push(GameEvent::Construction {
                    location,
                    owner: player_id,
                    id: entity_id,
                });

                // The offset goes through the shared deposit rule so the new
                // dropoff's counters see it; the full fee is charged, making
                // the net charge the reduced fee.
                deposit_energy(store, map, constants, location, player_id, cell_energy + cargo);
                store.player_mut(player_id).energy -= constants.dropoff_cost;
                sink.spent += constants.dropoff_cost;

                store.player_mut(player_id).remove_entity(entity_id);
                store.delete_entity(entity_id);
            }
        }
    }
}

/// Ledger for Move commands. `Still` moves never reach it.
#[derive(Debug, Default)]
struct MoveLedger {
    commands: BTreeMap<PlayerId, Vec<(EntityId, Direction)>>,
}

impl MoveLedger {
    fn add(&mut self, player: PlayerId, entity: EntityId, direction: Direction) {
        self.commands
            .entry(player)
            .or_default()
            .push((entity, direction));
    }

    fn commit(&self, store: &mut Store, map: &mut Map, constants: &Constants, sink: &mut TurnSink) {
        // Destination cell -> entities contending for it.
        let mut destinations: BTreeMap<Location, Vec<EntityId>> = BTreeMap::new();
        // Entity -> the command that moved it, for diagnostics.
        let mut causes: BTreeMap<EntityId, Command> = BTreeMap::new();

        // Lift every affordable mover off its source cell.
        for (&player_id, moves) in &self.commands {
            for &(entity_id, direction) in moves {
                let location = store
                    .player(player_id)
                    .entity_location(entity_id)
                    .expect("moving entity has a location");
                let command = Command::Move {
                    entity: entity_id,
                    direction,
                };
                let (inspired, carried) = {
                    let entity = store.entity(entity_id);
                    (entity.is_inspired, entity.energy)
                };
                let ratio = if inspired {
                    constants.inspired_move_cost_ratio
                } else {
                    constants.move_cost_ratio
                };
                let required = map.at(location).energy / ratio;
                if carried < required {
                    // Unaffordable move: drop it and leave the entity put.
                    sink.errors.push(
                        CommandError::new(
                            player_id,
                            command,
                            CommandErrorKind::InsufficientEntityEnergy {
                                available: carried,
                                required,
                            },
                        )
                        .ignored(!constants.strict_errors),
                    );
                    continue;
                }
                causes.insert(entity_id, command);
                store.entity_mut(entity_id).energy -= required;
                sink.spent += required;
                map.at_mut(location).entity = None;
                let destination = map.offset(location, direction);
                destinations.entry(destination).or_default().push(entity_id);
                store.player_mut(player_id).remove_entity(entity_id);
            }
        }

        // Entities already resting on a contested destination are lifted
        // into contention too.
        for (&destination, contenders) in &mut destinations {
            if let Some(resting) = map.at(destination).entity {
                contenders.push(resting);
                let owner = store.entity(resting).owner;
                store.player_mut(owner).remove_entity(resting);
                map.at_mut(destination).entity = None;
            }
        }

        // A sole contender lands; any larger group is destroyed.
        for (destination, mut contenders) in destinations {
            if contenders.len() == 1 {
                let entity_id = contenders[0];
                map.at_mut(destination).entity = Some(entity_id);
                let owner = store.entity(entity_id).owner;
                store.player_mut(owner).add_entity(entity_id, destination);
                sink.changed_entities.insert(entity_id);
                continue;
            }

            contenders.sort_unstable();

            let mut by_owner: BTreeMap<PlayerId, Vec<EntityId>> = BTreeMap::new();
            for &entity_id in &contenders {
                by_owner
                    .entry(store.entity(entity_id).owner)
                    .or_default()
                    .push(entity_id);
            }
            for (&owner, group) in &by_owner {
                if group.len() > 1 {
                    let mut commands: Vec<Command> = group
                        .iter()
                        .filter_map(|entity_id| causes.get(entity_id).copied())
                        .collect();
                    if let Some(first) = commands.first().copied() {
                        let context = commands.split_off(1);
                        sink.errors.push(
                            CommandError::new(
                                owner,
                                first,
                                CommandErrorKind::SelfCollision {
                                    location: destination,
                                    entities: group.clone(),
                                },
                            )
                            .with_context(context)
                            .ignored(!constants.strict_errors),
                        );
                    }
                }
            }

            sink.events.push(GameEvent::Collision {
                location: destination,
                entities: contenders.clone(),
            });
            for entity_id in contenders {
                let (owner, cargo) = {
                    let entity = store.entity(entity_id);
                    (entity.owner, entity.energy)
                };
                sink.destroyed_cargo.push((owner, cargo));
                deposit_energy(store, map, constants, destination, owner, cargo);
                store.delete_entity(entity_id);
            }
            store.changed_cells.insert(destination);
        }
    }
}

/// Ledger for the auto-deposit pass. It holds no commands: every entity
/// resting on a cell owned by its own player banks its cargo.
#[derive(Debug, Default)]
struct DepositLedger;

impl DepositLedger {
    #[allow(clippy::unused_self)]
    fn commit(&self, store: &mut Store, map: &mut Map, constants: &Constants, sink: &mut TurnSink) {
        let entity_ids: Vec<EntityId> = store.entities.keys().copied().collect();
        for entity_id in entity_ids {
            let (owner, cargo) = {
                let entity = store.entity(entity_id);
                (entity.owner, entity.energy)
            };
            let location = store
                .player(owner)
                .entity_location(entity_id)
                .expect("entity has a location");
            if map.at(location).owner == Some(owner) {
                store.entity_mut(entity_id).energy = 0;
                deposit_energy(store, map, constants, location, owner, cargo);
                store.changed_cells.insert(location);
                sink.changed_entities.insert(entity_id);
            }
        }
    }
}

/// Ledger for Spawn commands.
#[derive(Debug, Default)]
struct SpawnLedger {
    commands: BTreeMap<PlayerId, usize>,
}

impl SpawnLedger {
    fn add(&mut self, player: PlayerId) {
        *self.commands.entry(player).or_default() += 1;
    }

    /// At most one spawn per player per turn. The first submission is kept
    /// as context; the second is the faulty command.
    fn check(&self, sink: &mut TurnSink) -> bool {
        let mut success = true;
        for (&player_id, &count) in &self.commands {
            if count > 1 {
                sink.errors.push(
                    CommandError::new(player_id, Command::Spawn, CommandErrorKind::ExcessiveSpawns)
                        .with_context(vec![Command::Spawn; count - 1]),
                );
                success = false;
            }
        }
        success
    }

    fn commit(&self, store: &mut Store, map: &mut Map, constants: &Constants, sink: &mut TurnSink) {
        for (&player_id, &count) in &self.commands {
            for _ in 0..count {
                store.player_mut(player_id).energy -= constants.new_entity_cost;
                sink.spent += constants.new_entity_cost;

                let factory = store.player(player_id).factory;
                let entity_id = store.new_entity(0, player_id);
                store.player_mut(player_id).add_entity(entity_id, factory);
                sink.changed_entities.insert(entity_id);
                sink.events.push(GameEvent::Spawn {
                    location: factory,
                    owner: player_id,
                    id: entity_id,
                    energy: 0,
                });

                match map.at(factory).entity {
                    None => map.at_mut(factory).entity = Some(entity_id),
                    Some(existing_id) => {
                        // Spawning under an occupant is a collision: both
                        // are destroyed and the fee stays charged.
                        let (existing_owner, existing_cargo) = {
                            let entity = store.entity(existing_id);
                            (entity.owner, entity.energy)
                        };
                        if existing_owner == player_id {
                            sink.errors.push(
                                CommandError::new(
                                    player_id,
                                    Command::Spawn,
                                    CommandErrorKind::SelfCollision {
                                        location: factory,
                                        entities: vec![existing_id, entity_id],
                                    },
                                )
                                .ignored(!constants.strict_errors),
                            );
                        }
                        let mut participants = vec![existing_id, entity_id];
                        participants.sort_unstable();
                        sink.events.push(GameEvent::Collision {
                            location: factory,
                            entities: participants,
                        });
                        sink.destroyed_cargo.push((existing_owner, existing_cargo));
                        sink.destroyed_cargo.push((player_id, 0));
                        deposit_energy(
                            store,
                            map,
                            constants,
                            factory,
                            existing_owner,
                            existing_cargo,
                        );
                        store.player_mut(existing_owner).remove_entity(existing_id);
                        store.delete_entity(existing_id);
                        store.player_mut(player_id).remove_entity(entity_id);
                        store.delete_entity(entity_id);
                        map.at_mut(factory).entity = None;
                        store.changed_cells.insert(factory);
                    }
                }
            }
        }
    }
}

/// Per-entity command occurrence tracking.
#[derive(Debug, Default)]
struct Occurrence {
    count: usize,
    context: Vec<Command>,
    first_faulty: Option<Command>,
}

/// Per-player expense tracking.
#[derive(Debug, Default)]
struct Expense {
    total: Energy,
    context: Vec<Command>,
    first_faulty: Option<Command>,
}

/// One turn's worth of player commands, validated and committed as a single
/// atomic step.
#[derive(Debug)]
pub struct TurnTransaction<'a> {
    constants: &'a Constants,
    construct: ConstructLedger,
    movement: MoveLedger,
    deposit: DepositLedger,
    spawn: SpawnLedger,
    occurrences: BTreeMap<EntityId, Occurrence>,
    expenses: BTreeMap<PlayerId, Expense>,
    ownership_faults: Vec<(PlayerId, Command)>,
}

impl<'a> TurnTransaction<'a> {
    /// Create an empty transaction.
    #[must_use]
    pub fn new(constants: &'a Constants) -> Self {
        Self {
            constants,
            construct: ConstructLedger::default(),
            movement: MoveLedger::default(),
            deposit: DepositLedger,
            spawn: SpawnLedger::default(),
            occurrences: BTreeMap::new(),
            expenses: BTreeMap::new(),
            ownership_faults: Vec::new(),
        }
    }

    /// Queue one command into the appropriate ledger, tracking the
    /// cross-cutting occurrence and expense rules as it goes.
    pub fn add_command(&mut self, store: &Store, map: &Map, player_id: PlayerId, command: Command) {
        match command {
            Command::Move {
                direction: Direction::Still,
                ..
            } => {
                // A hold is a no-op, dropped before validation.
            }
            Command::Move { entity, direction } => {
                if !store.player(player_id).has_entity(entity) {
                    self.ownership_faults.push((player_id, command));
                    return;
                }
                self.add_occurrence(entity, command);
                self.movement.add(player_id, entity, direction);
            }
            Command::Construct { entity } => {
                if !store.player(player_id).has_entity(entity) {
                    self.ownership_faults.push((player_id, command));
                    return;
                }
                self.add_occurrence(entity, command);
                // The expense is the fee less what is already on site,
                // floored at zero.
                let location = store
                    .player(player_id)
                    .entity_location(entity)
                    .expect("owned entity has a location");
                let offset = map.at(location).energy + store.entity(entity).energy;
                let expense = (self.constants.dropoff_cost - offset).max(0);
                self.add_expense(store, player_id, command, expense);
                self.construct.add(player_id, entity);
            }
            Command::Spawn => {
                self.add_expense(store, player_id, command, self.constants.new_entity_cost);
                self.spawn.add(player_id);
            }
        }
    }

    fn add_occurrence(&mut self, entity: EntityId, command: Command) {
        let entry = self.occurrences.entry(entity).or_default();
        entry.count += 1;
        if entry.count == 2 {
            // The first command on the entity stands; this one is illegal.
            entry.first_faulty = Some(command);
        } else {
            entry.context.push(command);
        }
    }

    fn add_expense(&mut self, store: &Store, player_id: PlayerId, command: Command, amount: Energy) {
        let balance = store.player(player_id).energy;
        let entry = self.expenses.entry(player_id).or_default();
        entry.total += amount;
        if entry.total > balance && entry.first_faulty.is_none() {
            entry.first_faulty = Some(command);
        } else {
            entry.context.push(command);
        }
    }

    /// Run every validation rule, accumulating all violations into the sink.
    ///
    /// Pure with respect to the store and map. Returns false if any
    /// violation was found.
    #[must_use]
    pub fn check(&self, store: &Store, map: &Map, sink: &mut TurnSink) -> bool {
        let mut success = true;

        for &(player_id, command) in &self.ownership_faults {
            let entity = match command {
                Command::Move { entity, .. } | Command::Construct { entity } => entity,
                Command::Spawn => unreachable!("spawn references no entity"),
            };
            sink.errors.push(CommandError::new(
                player_id,
                command,
                CommandErrorKind::EntityNotFound { entity },
            ));
            success = false;
        }

        for (&player_id, expense) in &self.expenses {
            if let Some(faulty) = expense.first_faulty {
                sink.errors.push(
                    CommandError::new(
                        player_id,
                        faulty,
                        CommandErrorKind::InsufficientBalance {
                            available: store.player(player_id).energy,
                            committed: expense.total,
                        },
                    )
                    .with_context(expense.context.clone()),
                );
                success = false;
            }
        }

        for (&entity, occurrence) in &self.occurrences {
            if let Some(faulty) = occurrence.first_faulty {
                let owner = store.entity(entity).owner;
                sink.errors.push(
                    CommandError::new(owner, faulty, CommandErrorKind::DuplicateEntity { entity })
                        .with_context(occurrence.context.clone()),
                );
                success = false;
            }
        }

        if !self.construct.check(store, map, sink) {
            success = false;
        }
        if !self.spawn.check(sink) {
            success = false;
        }

        success
    }

    /// Commit all four ledgers in the fixed order Construct, Move,
    /// auto-Deposit, Spawn.
    ///
    /// Must only be called after a passing [`check`](Self::check); the
    /// commit itself can still produce default-ignored errors (unaffordable
    /// moves, self-collisions).
    pub fn commit(self, store: &mut Store, map: &mut Map, sink: &mut TurnSink) {
        self.construct.commit(store, map, self.constants, sink);
        self.movement.commit(store, map, self.constants, sink);
        self.deposit.commit(store, map, self.constants, sink);
        self.spawn.commit(store, map, self.constants, sink);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Player;

    /// A two-player world on an 8x8 map with factories in opposite corners.
    fn world(balance: Energy) -> (Store, Map, Constants) {
        let mut store = Store::new();
        let mut map = Map::new(8, 8).expect("valid size");
        for (id, factory) in [(0, Location::new(1, 1)), (1, Location::new(6, 6))] {
            store.players.insert(id, Player::new(id, factory, balance));
            map.at_mut(factory).owner = Some(id);
        }
        (store, map, Constants::default())
    }

    fn add_entity_at(
        store: &mut Store,
        map: &mut Map,
        owner: PlayerId,
        location: Location,
        energy: Energy,
    ) -> EntityId {
        let id = store.new_entity(energy, owner);
        store.player_mut(owner).add_entity(id, location);
        map.at_mut(location).entity = Some(id);
        id
    }

    fn run(
        store: &mut Store,
        map: &mut Map,
        constants: &Constants,
        commands: &[(PlayerId, Command)],
    ) -> (bool, TurnSink) {
        let mut transaction = TurnTransaction::new(constants);
        for &(player, command) in commands {
            transaction.add_command(store, map, player, command);
        }
        let mut sink = TurnSink::new();
        let ok = transaction.check(store, map, &mut sink);
        if ok {
            transaction.commit(store, map, &mut sink);
        }
        (ok, sink)
    }

    #[test]
    fn test_move_commits_and_charges() {
        let (mut store, mut map, constants) = world(5000);
        let source = Location::new(3, 3);
        map.at_mut(source).energy = 100;
        let id = add_entity_at(&mut store, &mut map, 0, source, 500);

        let (ok, sink) = run(
            &mut store,
            &mut map,
            &constants,
            &[(
                0,
                Command::Move {
                    entity: id,
                    direction: Direction::East,
                },
            )],
        );
        assert!(ok);
        assert!(sink.errors.is_empty());

        let destination = Location::new(4, 3);
        assert_eq!(map.at(destination).entity, Some(id));
        assert_eq!(map.at(source).entity, None);
        // 100 / 10 = 10 energy move cost.
        assert_eq!(store.entity(id).energy, 490);
        assert_eq!(store.player(0).entity_location(id), Some(destination));
        assert!(sink.changed_entities.contains(&id));
    }

    #[test]
    fn test_unaffordable_move_is_dropped_not_fatal() {
        let (mut store, mut map, constants) = world(5000);
        let source = Location::new(3, 3);
        map.at_mut(source).energy = 1000;
        let id = add_entity_at(&mut store, &mut map, 0, source, 40);

        let (ok, sink) = run(
            &mut store,
            &mut map,
            &constants,
            &[(
                0,
                Command::Move {
                    entity: id,
                    direction: Direction::North,
                },
            )],
        );
        assert!(ok, "an unaffordable move does not fail the transaction");
        assert_eq!(sink.errors.len(), 1);
        assert!(sink.errors[0].ignored);
        assert!(matches!(
            sink.errors[0].kind,
            CommandErrorKind::InsufficientEntityEnergy {
                available: 40,
                required: 100
            }
        ));
        // Entity stayed put with its energy intact, and was not marked as
        // touched, so the engine will let it extract.
        assert_eq!(map.at(source).entity, Some(id));
        assert_eq!(store.entity(id).energy, 40);
        assert!(!sink.changed_entities.contains(&id));
    }

    #[test]
    fn test_still_move_is_dropped_before_validation() {
        let (mut store, mut map, constants) = world(5000);
        let id = add_entity_at(&mut store, &mut map, 0, Location::new(2, 2), 0);

        // Two commands on the same entity, but the hold is dropped first, so
        // there is no duplicate.
        let (ok, sink) = run(
            &mut store,
            &mut map,
            &constants,
            &[
                (
                    0,
                    Command::Move {
                        entity: id,
                        direction: Direction::Still,
                    },
                ),
                (
                    0,
                    Command::Move {
                        entity: id,
                        direction: Direction::East,
                    },
                ),
            ],
        );
        assert!(ok);
        assert!(sink.errors.is_empty());
        assert_eq!(map.at(Location::new(3, 2)).entity, Some(id));
    }

    #[test]
    fn test_same_player_collision_destroys_both() {
        let (mut store, mut map, constants) = world(5000);
        let a = add_entity_at(&mut store, &mut map, 0, Location::new(3, 3), 120);
        let b = add_entity_at(&mut store, &mut map, 0, Location::new(5, 3), 80);

        let (ok, sink) = run(
            &mut store,
            &mut map,
            &constants,
            &[
                (
                    0,
                    Command::Move {
                        entity: a,
                        direction: Direction::East,
                    },
                ),
                (
                    0,
                    Command::Move {
                        entity: b,
                        direction: Direction::West,
                    },
                ),
            ],
        );
        assert!(ok);

        let contested = Location::new(4, 3);
        assert_eq!(map.at(contested).entity, None);
        assert!(store.entities.is_empty());
        assert!(store.player(0).entities.is_empty());
        // Both cargos land on the unowned cell.
        assert_eq!(map.at(contested).energy, 200);

        let collisions: Vec<_> = sink
            .events
            .iter()
            .filter(|event| matches!(event, GameEvent::Collision { .. }))
            .collect();
        assert_eq!(collisions.len(), 1);
        let GameEvent::Collision { entities, .. } = collisions[0] else {
            unreachable!()
        };
        let mut sorted = entities.clone();
        sorted.sort_unstable();
        assert_eq!(*entities, sorted, "participants are sorted");

        // A self-collision diagnostic was logged but ignored.
        assert!(sink.errors.iter().any(|error| {
            error.ignored && matches!(error.kind, CommandErrorKind::SelfCollision { .. })
        }));
    }

    #[test]
    fn test_mover_collides_with_resting_entity() {
        let (mut store, mut map, constants) = world(5000);
        let mover = add_entity_at(&mut store, &mut map, 0, Location::new(3, 3), 50);
        let resting = add_entity_at(&mut store, &mut map, 1, Location::new(4, 3), 70);

        let (ok, sink) = run(
            &mut store,
            &mut map,
            &constants,
            &[(
                0,
                Command::Move {
                    entity: mover,
                    direction: Direction::East,
                },
            )],
        );
        assert!(ok);
        assert!(!store.entities.contains_key(&mover));
        assert!(!store.entities.contains_key(&resting));
        assert_eq!(map.at(Location::new(4, 3)).energy, 120);
        // Different owners: no self-collision diagnostic.
        assert!(
            !sink
                .errors
                .iter()
                .any(|error| matches!(error.kind, CommandErrorKind::SelfCollision { .. }))
        );
    }

    #[test]
    fn test_entity_not_owned_fails_check() {
        let (mut store, mut map, constants) = world(5000);
        let other = add_entity_at(&mut store, &mut map, 1, Location::new(4, 4), 0);

        let (ok, sink) = run(
            &mut store,
            &mut map,
            &constants,
            &[(
                0,
                Command::Move {
                    entity: other,
                    direction: Direction::North,
                },
            )],
        );
        assert!(!ok);
        assert_eq!(sink.offenders().into_iter().collect::<Vec<_>>(), vec![0]);
        // Nothing moved.
        assert_eq!(map.at(Location::new(4, 4)).entity, Some(other));
    }

    #[test]
    fn test_duplicate_entity_commands_fail_check() {
        let (mut store, mut map, constants) = world(5000);
        let id = add_entity_at(&mut store, &mut map, 0, Location::new(3, 3), 0);

        let (ok, sink) = run(
            &mut store,
            &mut map,
            &constants,
            &[
                (
                    0,
                    Command::Move {
                        entity: id,
                        direction: Direction::East,
                    },
                ),
                (0, Command::Construct { entity: id }),
            ],
        );
        assert!(!ok);
        let error = sink
            .errors
            .iter()
            .find(|error| matches!(error.kind, CommandErrorKind::DuplicateEntity { .. }))
            .expect("duplicate reported");
        // The first command is kept as context; the second is faulty.
        assert_eq!(error.command, Command::Construct { entity: id });
        assert_eq!(
            error.context,
            vec![Command::Move {
                entity: id,
                direction: Direction::East
            }]
        );
    }

    #[test]
    fn test_expenses_over_balance_fail_check() {
        let (mut store, mut map, constants) = world(900);
        let (ok, sink) = run(&mut store, &mut map, &constants, &[(0, Command::Spawn)]);
        assert!(!ok);
        assert!(matches!(
            sink.errors[0].kind,
            CommandErrorKind::InsufficientBalance {
                available: 900,
                committed: 1000
            }
        ));
        // Nothing was charged or spawned.
        assert_eq!(store.player(0).energy, 900);
        assert!(store.entities.is_empty());
    }

    #[test]
    fn test_spawn_and_construct_expenses_accumulate() {
        let (mut store, mut map, constants) = world(4500);
        let id = add_entity_at(&mut store, &mut map, 0, Location::new(3, 3), 0);

        // 4000 construct (no offset) + 1000 spawn > 4500.
        let (ok, sink) = run(
            &mut store,
            &mut map,
            &constants,
            &[(0, Command::Construct { entity: id }), (0, Command::Spawn)],
        );
        assert!(!ok);
        assert!(
            sink.errors
                .iter()
                .any(|error| matches!(error.kind, CommandErrorKind::InsufficientBalance { .. }))
        );
    }

    #[test]
    fn test_excessive_spawns_fail_check() {
        let (mut store, mut map, constants) = world(5000);
        let (ok, sink) = run(
            &mut store,
            &mut map,
            &constants,
            &[(0, Command::Spawn), (0, Command::Spawn)],
        );
        assert!(!ok);
        let error = &sink.errors[0];
        assert!(matches!(error.kind, CommandErrorKind::ExcessiveSpawns));
        assert_eq!(error.context, vec![Command::Spawn]);
    }

    #[test]
    fn test_spawn_commit_creates_entity_at_factory() {
        let (mut store, mut map, constants) = world(5000);
        let (ok, sink) = run(&mut store, &mut map, &constants, &[(0, Command::Spawn)]);
        assert!(ok);
        assert_eq!(store.player(0).energy, 4000);
        assert_eq!(store.player(0).entities.len(), 1);
        let factory = store.player(0).factory;
        assert!(map.at(factory).entity.is_some());
        assert!(
            sink.events
                .iter()
                .any(|event| matches!(event, GameEvent::Spawn { .. }))
        );
    }

    #[test]
    fn test_spawn_onto_occupied_factory_collides() {
        let (mut store, mut map, constants) = world(5000);
        let factory = store.player(0).factory;
        let occupant = add_entity_at(&mut store, &mut map, 0, factory, 300);

        let (ok, sink) = run(&mut store, &mut map, &constants, &[(0, Command::Spawn)]);
        assert!(ok);
        // Both the occupant and the new entity are gone; the fee stays paid;
        // the occupant's cargo was deposited to the factory owner.
        assert!(store.entities.is_empty());
        assert_eq!(map.at(factory).entity, None);
        assert_eq!(store.player(0).energy, 5000 - 1000 + 300);
        assert_eq!(store.player(0).factory_deposited, 300);
        assert!(
            sink.errors
                .iter()
                .any(|error| matches!(error.kind, CommandErrorKind::SelfCollision { .. }))
        );
        let _ = occupant;
    }

    #[test]
    fn test_construct_commits_reduced_fee() {
        let (mut store, mut map, constants) = world(5000);
        let site = Location::new(3, 3);
        map.at_mut(site).energy = 600;
        let id = add_entity_at(&mut store, &mut map, 0, site, 400);

        let (ok, sink) = run(
            &mut store,
            &mut map,
            &constants,
            &[(0, Command::Construct { entity: id })],
        );
        assert!(ok);
        // Net charge is 4000 - (600 + 400) = 3000.
        assert_eq!(store.player(0).energy, 2000);
        assert_eq!(map.at(site).owner, Some(0));
        assert_eq!(map.at(site).energy, 0);
        assert_eq!(map.at(site).entity, None);
        assert!(!store.entities.contains_key(&id));
        assert_eq!(store.player(0).dropoffs.len(), 1);
        assert_eq!(store.player(0).dropoffs[0].location, site);
        assert_eq!(store.player(0).dropoffs[0].deposited, 1000);
        assert!(
            sink.events
                .iter()
                .any(|event| matches!(event, GameEvent::Construction { .. }))
        );
    }

    #[test]
    fn test_construct_offset_floors_expense_at_zero() {
        // 600 balance is far below the fee, but the site holds enough energy
        // to zero the expense.
        let (mut store, mut map, constants) = world(600);
        let site = Location::new(3, 3);
        map.at_mut(site).energy = 3900;
        let id = add_entity_at(&mut store, &mut map, 0, site, 500);

        let (ok, _) = run(
            &mut store,
            &mut map,
            &constants,
            &[(0, Command::Construct { entity: id })],
        );
        assert!(ok, "offset covers the fee, expense is zero");
        // 600 - 4000 + 4400 = 1000: the surplus offset is credited.
        assert_eq!(store.player(0).energy, 1000);
    }

    #[test]
    fn test_construct_on_owned_cell_fails_check() {
        let (mut store, mut map, constants) = world(5000);
        let site = Location::new(5, 5);
        map.at_mut(site).owner = Some(1);
        let id = add_entity_at(&mut store, &mut map, 0, site, 0);

        let (ok, sink) = run(
            &mut store,
            &mut map,
            &constants,
            &[(0, Command::Construct { entity: id })],
        );
        assert!(!ok);
        assert!(matches!(
            sink.errors[0].kind,
            CommandErrorKind::CellOwned {
                owner: 1,
                location
            } if location == site
        ));
    }

    #[test]
    fn test_auto_deposit_banks_cargo_on_own_cell() {
        let (mut store, mut map, constants) = world(5000);
        let factory = store.player(0).factory;
        let id = add_entity_at(&mut store, &mut map, 0, factory, 450);

        let (ok, sink) = run(&mut store, &mut map, &constants, &[]);
        assert!(ok);
        assert_eq!(store.entity(id).energy, 0);
        assert_eq!(store.player(0).energy, 5450);
        assert_eq!(store.player(0).factory_deposited, 450);
        assert_eq!(store.player(0).total_deposited, 450);
        assert!(sink.changed_entities.contains(&id));
    }

    #[test]
    fn test_no_deposit_on_foreign_or_unowned_cell() {
        let (mut store, mut map, constants) = world(5000);
        let on_neutral = add_entity_at(&mut store, &mut map, 0, Location::new(3, 3), 200);
        let on_foreign = add_entity_at(&mut store, &mut map, 0, Location::new(6, 6), 200);

        let (ok, _) = run(&mut store, &mut map, &constants, &[]);
        assert!(ok);
        assert_eq!(store.entity(on_neutral).energy, 200);
        assert_eq!(store.entity(on_foreign).energy, 200);
        assert_eq!(store.player(0).energy, 5000);
    }

    #[test]
    fn test_deposit_rule_splits_foreign_cargo() {
        let (mut store, mut map, constants) = world(1000);
        // Destroy a player-0 entity over player 1's factory cell.
        let factory1 = store.player(1).factory;
        deposit_energy(&mut store, &mut map, &constants, factory1, 0, 400);
        // Penalty ratio 4: owner gets 100, source keeps 300.
        assert_eq!(store.player(1).energy, 1100);
        assert_eq!(store.player(1).factory_deposited, 100);
        assert_eq!(store.player(0).energy, 1300);
    }

    #[test]
    fn test_deposit_rule_returns_energy_to_unowned_cell() {
        let (mut store, mut map, constants) = world(1000);
        let cell = Location::new(2, 5);
        deposit_energy(&mut store, &mut map, &constants, cell, 0, 250);
        assert_eq!(map.at(cell).energy, 250);
        assert_eq!(store.map_total_energy, 250);
        assert!(store.changed_cells.contains(&cell));
    }

    #[test]
    fn test_check_is_pure() {
        let (mut store, mut map, constants) = world(900);
        let id = add_entity_at(&mut store, &mut map, 0, Location::new(3, 3), 10);
        map.at_mut(Location::new(3, 3)).energy = 77;

        let mut transaction = TurnTransaction::new(&constants);
        transaction.add_command(&store, &map, 0, Command::Spawn);
        transaction.add_command(
            &store,
            &map,
            0,
            Command::Move {
                entity: id,
                direction: Direction::East,
            },
        );
        let mut sink = TurnSink::new();
        let _ = transaction.check(&store, &map, &mut sink);

        assert_eq!(store.player(0).energy, 900);
        assert_eq!(store.entity(id).energy, 10);
        assert_eq!(map.at(Location::new(3, 3)).energy, 77);
        assert_eq!(map.at(Location::new(3, 3)).entity, Some(id));
    }

    #[test]
    fn test_move_onto_fresh_dropoff_banks_same_turn() {
        // Construct commits before movement, and deposit runs right after
        // movement, so an entity moving onto the new dropoff banks its cargo
        // this very turn.
        let (mut store, mut map, constants) = world(5000);
        let site = Location::new(3, 3);
        let builder = add_entity_at(&mut store, &mut map, 0, site, 0);
        let hauler = add_entity_at(&mut store, &mut map, 0, Location::new(2, 3), 500);

        let (ok, _) = run(
            &mut store,
            &mut map,
            &constants,
            &[
                (0, Command::Construct { entity: builder }),
                (
                    0,
                    Command::Move {
                        entity: hauler,
                        direction: Direction::East,
                    },
                ),
            ],
        );
        assert!(ok);
        assert_eq!(store.entity(hauler).energy, 0);
        // 5000 - 4000 (fee) + 0 (offset) + 500 (banked cargo).
        assert_eq!(store.player(0).energy, 1500);
        assert_eq!(store.player(0).dropoffs[0].deposited, 500);
    }
}
