//! The turn engine.
//!
//! Drives a full game: retrieve commands concurrently, apply them through
//! the retry-without-offenders transaction loop, run the post-commit
//! economy rules (extraction, inspiration, capture), record the replay
//! frame, and check termination. Provides a pure-ish interface: the same
//! map, constants, and per-turn command sets always produce the same event
//! stream and final rankings.

mod mapgen;
mod stats;

pub use mapgen::{MapGenError, generate_map};
pub use stats::{PlayerStatistics, rank_players};

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use log::{debug, error, info, warn};
use rayon::prelude::*;

/// Ceiling division for signed `Energy`, matching the semantics of the
/// (still-unstable for signed integers) `i64::div_ceil`.
fn div_ceil_energy(a: Energy, b: Energy) -> Energy {
    let d = a / b;
    let r = a % b;
    if (r > 0 && b > 0) || (r < 0 && b < 0) {
        d + 1
    } else {
        d
    }
}

use crate::bot::{CommandSource, PlayerObservation, TurnObservation};
use crate::config::Constants;
use crate::error::EngineError;
use crate::game::{
    Command, CommandErrorKind, Energy, EnergyLedger, EntityId, GameEvent, Location, Map, Player,
    PlayerId, Store, TurnSink, TurnTransaction, assert_invariants,
};
use crate::replay::{
    CellUpdate, EntityState, Frame, PlayerSnapshot, REPLAY_VERSION, Replay, ReplayPlayer,
};

/// Per-player command log: every error is recorded here with a window of
/// the surrounding commands for context.
#[derive(Debug, Clone, Default)]
pub struct PlayerLogs {
    logs: BTreeMap<PlayerId, Vec<String>>,
}

impl PlayerLogs {
    fn log(&mut self, player: PlayerId, line: String) {
        self.logs.entry(player).or_default().push(line);
    }

    /// The log lines recorded for a player.
    #[must_use]
    pub fn for_player(&self, player: PlayerId) -> &[String] {
        self.logs.get(&player).map_or(&[], Vec::as_slice)
    }
}

/// Final result of a game.
#[derive(Debug, Clone)]
pub struct GameOutcome {
    /// Number of turns played.
    pub turns_played: u32,
    /// Per-player statistics with ranks assigned, ordered by player id.
    pub statistics: Vec<PlayerStatistics>,
    /// The recorded replay.
    pub replay: Replay,
    /// Per-player command logs.
    pub logs: PlayerLogs,
}

/// The engine for one game.
#[derive(Debug)]
pub struct GameEngine<'a> {
    constants: &'a Constants,
    store: Store,
    map: Map,
    statistics: Vec<PlayerStatistics>,
    ledger: EnergyLedger,
    logs: PlayerLogs,
    replay: Replay,
    turn: u32,
    turn_limit: u32,
    /// Set when strict error checking ends the game early.
    aborted: bool,
}

impl<'a> GameEngine<'a> {
    /// Create a game on the given map with one player per factory location.
    /// Player ids are assigned 0..N in factory order. The factory cells are
    /// cleared of energy and marked owned.
    ///
    /// The `seed` only feeds the ranking tiebreak ids; everything else is
    /// already determined by the inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if the player count is unusable.
    pub fn new(
        constants: &'a Constants,
        mut map: Map,
        factories: &[Location],
        seed: u64,
    ) -> Result<Self, EngineError> {
        if factories.is_empty() {
            return Err(EngineError::NoPlayers);
        }
        if factories.len() > constants.max_players {
            return Err(EngineError::TooManyPlayers {
                requested: factories.len(),
                limit: constants.max_players,
            });
        }

        let mut store = Store::new();
        let mut statistics = Vec::with_capacity(factories.len());
        let mut replay_players = Vec::with_capacity(factories.len());
        #[allow(clippy::cast_possible_truncation)]
        for (index, &factory) in factories.iter().enumerate() {
            let id = index as PlayerId;
            store
                .players
                .insert(id, Player::new(id, factory, constants.initial_energy));
            let cell = map.at_mut(factory);
            cell.energy = 0;
            cell.owner = Some(id);
            store.changed_cells.insert(factory);

            statistics.push(PlayerStatistics::new(id, tiebreak_id(seed, id)));
            replay_players.push(ReplayPlayer {
                id,
                name: format!("player {id}"),
                factory,
                terminated: false,
            });
        }
        store.map_total_energy = map.total_energy();

        let ledger = EnergyLedger {
            initial: store.map_total_energy + store.total_player_energy(),
            ..EnergyLedger::default()
        };

        let replay = Replay {
            version: REPLAY_VERSION,
            constants: constants.clone(),
            seed,
            map_width: map.width(),
            map_height: map.height(),
            initial_cells: map.iter().map(|(_, cell)| cell.energy).collect(),
            players: replay_players,
            frames: Vec::new(),
            statistics: Vec::new(),
        };

        let turn_limit = constants.turn_limit(map.width(), map.height());
        let mut engine = Self {
            constants,
            store,
            map,
            statistics,
            ledger,
            logs: PlayerLogs::default(),
            replay,
            turn: 0,
            turn_limit,
            aborted: false,
        };
        // Record start-of-game balances; ranking indexes these by turn.
        engine.update_player_stats();
        Ok(engine)
    }

    /// Override the turn limit (for tests and short demo games).
    pub fn set_turn_limit(&mut self, limit: u32) {
        self.turn_limit = limit;
    }

    /// Record a player's reported name for the replay.
    pub fn set_player_name(&mut self, player: PlayerId, name: String) {
        if let Some(entry) = self
            .replay
            .players
            .iter_mut()
            .find(|entry| entry.id == player)
        {
            entry.name = name;
        }
    }

    /// The current turn number.
    #[must_use]
    pub const fn turn(&self) -> u32 {
        self.turn
    }

    /// Run the game to completion.
    pub fn run(mut self, source: &dyn CommandSource) -> GameOutcome {
        info!("starting game: {} players, {} turn limit",
            self.store.players.len(), self.turn_limit);
        while self.turn < self.turn_limit {
            self.turn += 1;
            debug!("starting turn {}", self.turn);
            self.process_turn(source);
            if self.aborted || self.game_ended() {
                break;
            }
        }
        info!("game ended after {} turns", self.turn);

        for entry in &mut self.replay.players {
            entry.terminated = self.store.player(entry.id).terminated;
            if !entry.terminated {
                source.disconnect(entry.id);
            }
        }

        rank_players(&mut self.statistics);
        self.replay.statistics = self.statistics.clone();

        GameOutcome {
            turns_played: self.turn,
            statistics: self.statistics,
            replay: self.replay,
            logs: self.logs,
        }
    }

    /// Play one full turn.
    fn process_turn(&mut self, source: &dyn CommandSource) {
        // Inspiration governs this turn's move costs and extraction, and is
        // part of what the bots observe.
        self.update_inspiration();
        let observation = self.observation();
        self.store.changed_cells.clear();

        let mut commands = self.retrieve_commands(source, &observation);
        let sink = self.apply_commands(&mut commands);

        self.extract_resources(&sink.changed_entities);
        let capture_events = self.resolve_captures();

        self.apply_sink_stats(&sink);
        self.update_player_stats();

        let mut events = sink.events;
        events.extend(capture_events);
        self.record_frame(events);

        self.ledger.spent += sink.spent;
        assert_invariants(&self.store, &self.map, self.constants, &self.ledger);
    }

    /// Issue one concurrent command request per eligible player and join
    /// them all before touching the store. A failed or late response
    /// terminates that player and never blocks the others.
    fn retrieve_commands(
        &mut self,
        source: &dyn CommandSource,
        observation: &TurnObservation,
    ) -> BTreeMap<PlayerId, Vec<Command>> {
        let eligible: Vec<PlayerId> = self
            .store
            .players
            .values()
            .filter(|player| player.is_eligible())
            .map(|player| player.id)
            .collect();
        let deadline = Duration::from_millis(self.constants.turn_deadline_ms);

        let results: Vec<_> = eligible
            .par_iter()
            .map(|&player| (player, source.get_commands(player, observation, deadline)))
            .collect();

        let mut commands = BTreeMap::new();
        for (player, result) in results {
            match result {
                Ok(list) => {
                    commands.insert(player, list);
                }
                Err(failure) => {
                    warn!("player {player}: {failure}; terminating");
                    self.logs
                        .log(player, format!("terminated: {failure}"));
                    self.terminate_player(player, source);
                }
            }
        }
        commands
    }

    /// The retry-without-offenders loop: build a transaction from every
    /// pending command list, accumulate all violations, and either commit
    /// atomically or retry without the offenders' entire command lists.
    /// Terminates in at most one iteration per player.
    fn apply_commands(&mut self, commands: &mut BTreeMap<PlayerId, Vec<Command>>) -> TurnSink {
        while !commands.is_empty() {
            let mut transaction = TurnTransaction::new(self.constants);
            for (&player, list) in commands.iter() {
                for &command in list {
                    transaction.add_command(&self.store, &self.map, player, command);
                }
            }

            let mut sink = TurnSink::new();
            if transaction.check(&self.store, &self.map, &mut sink) {
                transaction.commit(&mut self.store, &mut self.map, &mut sink);
                Self::log_errors(&mut self.logs, &sink, commands);
                let offenders = sink.offenders();
                if !offenders.is_empty() {
                    // Only default-ignored errors can surface during commit,
                    // so offenders here mean strict mode: end the game.
                    error!("strict errors from players {offenders:?}, aborting game");
                    self.aborted = true;
                }
                return sink;
            }

            Self::log_errors(&mut self.logs, &sink, commands);
            for offender in sink.offenders() {
                debug!("dropping player {offender}'s commands for this turn");
                commands.remove(&offender);
            }
        }
        TurnSink::new()
    }

    /// Log every accumulated error, with a window of the surrounding
    /// commands from the offender's submission for context.
    fn log_errors(
        logs: &mut PlayerLogs,
        sink: &TurnSink,
        commands: &BTreeMap<PlayerId, Vec<Command>>,
    ) {
        const WINDOW: usize = 2;
        const MAX_CONTEXT: usize = 5;

        for failure in &sink.errors {
            if failure.ignored {
                warn!("player {}: {failure}", failure.player);
            } else {
                error!("player {}: {failure}", failure.player);
            }
            logs.log(failure.player, failure.to_string());

            let Some(submitted) = commands.get(&failure.player) else {
                continue;
            };
            if let Some(position) = submitted.iter().position(|c| *c == failure.command) {
                logs.log(
                    failure.player,
                    format!("At command {} of {}:", position + 1, submitted.len()),
                );
                let start = position.saturating_sub(WINDOW);
                let end = (position + WINDOW + 1).min(submitted.len());
                for (index, command) in submitted.iter().enumerate().take(end).skip(start) {
                    let marker = if index == position { ">>> " } else { "    " };
                    logs.log(failure.player, format!("{marker}{} {command}", index + 1));
                }
            }
            if !failure.context.is_empty() {
                logs.log(failure.player, failure.context_message().to_string());
                for command in failure.context.iter().take(MAX_CONTEXT) {
                    logs.log(failure.player, format!("    {command}"));
                }
                if failure.context.len() > MAX_CONTEXT {
                    logs.log(
                        failure.player,
                        format!(
                            "(suppressing {} other commands)",
                            failure.context.len() - MAX_CONTEXT
                        ),
                    );
                }
            }
        }
    }

    /// Count entities per owner within `radius` of `center`.
    fn count_nearby(&self, center: Location, radius: i32) -> BTreeMap<PlayerId, usize> {
        let mut counts = BTreeMap::new();
        let (x, y) = (i32::from(center.x), i32::from(center.y));
        for dx in -radius..=radius {
            for dy in -radius..=radius {
                let other = self.map.normalize(x + dx, y + dy);
                if i32::from(self.map.distance(center, other)) > radius {
                    continue;
                }
                if let Some(entity_id) = self.map.at(other).entity {
                    *counts
                        .entry(self.store.entity(entity_id).owner)
                        .or_default() += 1;
                }
            }
        }
        counts
    }

    /// Refresh every entity's inspiration flag: inspired iff enough
    /// opposing entities sit within the inspiration radius.
    fn update_inspiration(&mut self) {
        if !self.constants.inspiration_enabled {
            return;
        }
        let radius = self.constants.inspiration_radius;
        let threshold = self.constants.inspiration_ship_count;

        let mut flags: Vec<(EntityId, bool)> = Vec::with_capacity(self.store.entities.len());
        for player in self.store.players.values() {
            for (&entity_id, &location) in &player.entities {
                let counts = self.count_nearby(location, radius);
                let opposing: usize = counts
                    .iter()
                    .filter(|(owner, _)| **owner != player.id)
                    .map(|(_, &count)| count)
                    .sum();
                flags.push((entity_id, opposing >= threshold));
            }
        }
        for (entity_id, inspired) in flags {
            self.store.entity_mut(entity_id).is_inspired = inspired;
        }
    }

    /// Post-commit mining: every entity the committed transaction did not
    /// touch extracts from its cell, with the inspired ratio and bonus when
    /// inspired. The bonus is minted, not taken from the cell.
    fn extract_resources(&mut self, touched: &BTreeSet<EntityId>) {
        let max_energy = self.constants.max_energy;
        let entity_ids: Vec<EntityId> = self.store.entities.keys().copied().collect();
        for entity_id in entity_ids {
            if touched.contains(&entity_id) {
                continue;
            }
            let (owner, carried, inspired) = {
                let entity = self.store.entity(entity_id);
                (entity.owner, entity.energy, entity.is_inspired)
            };
            if carried >= max_energy {
                continue;
            }
            let location = self
                .store
                .player(owner)
                .entity_location(entity_id)
                .expect("entity has a location");
            let cell_energy = self.map.at(location).energy;

            let ratio = if inspired {
                self.constants.inspired_extract_ratio
            } else {
                self.constants.extract_ratio
            };
            let mut extracted = div_ceil_energy(cell_energy, ratio);
            let mut gained = extracted;
            if extracted + carried > max_energy {
                extracted = max_energy - carried;
            }
            if inspired && self.constants.inspired_bonus_multiplier > 0.0 {
                #[allow(clippy::cast_possible_truncation)]
                let bonus = (self.constants.inspired_bonus_multiplier * gained as f64) as Energy;
                gained += bonus;
            }
            if max_energy - carried < gained {
                gained = max_energy - carried;
            }

            let stats = &mut self.statistics[usize::from(owner)];
            stats.total_mined += extracted;
            stats.total_bonus += gained - extracted;
            self.ledger.minted += gained - extracted;

            self.store.entity_mut(entity_id).energy += gained;
            self.map.at_mut(location).energy -= extracted;
            self.store.map_total_energy -= extracted;
            if extracted > 0 {
                self.store.changed_cells.insert(location);
            }
        }
    }

    /// The optional capture rule: an entity locally outnumbered by a single
    /// opposing player by at least the configured margin changes hands.
    /// Ties between opposing players go to the lowest player id.
    fn resolve_captures(&mut self) -> Vec<GameEvent> {
        if !self.constants.capture_enabled {
            return Vec::new();
        }
        let radius = self.constants.capture_radius;
        let threshold = self.constants.ships_above_for_capture;

        // Decide every switch against the pre-capture state before flipping
        // any entity.
        let mut switches: BTreeMap<Location, PlayerId> = BTreeMap::new();
        for player in self.store.players.values() {
            for &location in player.entities.values() {
                let counts = self.count_nearby(location, radius);
                let own = counts.get(&player.id).copied().unwrap_or(0);
                let mut strongest: Option<(PlayerId, usize)> = None;
                for (&other, &count) in &counts {
                    if other != player.id && strongest.is_none_or(|(_, best)| count > best) {
                        strongest = Some((other, count));
                    }
                }
                if let Some((captor, count)) = strongest {
                    if count >= own + threshold {
                        switches.insert(location, captor);
                    }
                }
            }
        }

        let mut events = Vec::with_capacity(switches.len());
        for (location, new_owner) in switches {
            let old_id = self
                .map
                .at(location)
                .entity
                .expect("captured entity still on its cell");
            let (old_owner, energy) = {
                let entity = self.store.entity(old_id);
                (entity.owner, entity.energy)
            };

            self.statistics[usize::from(old_owner)].ships_given += 1;
            self.statistics[usize::from(new_owner)].ships_captured += 1;

            self.store.player_mut(old_owner).remove_entity(old_id);
            self.store.delete_entity(old_id);

            let new_id = self.store.new_entity(energy, new_owner);
            self.store.entity_mut(new_id).was_captured = true;
            self.store.player_mut(new_owner).add_entity(new_id, location);
            self.map.at_mut(location).entity = Some(new_id);

            info!("entity {old_id} of player {old_owner} captured by player {new_owner}");
            events.push(GameEvent::Capture {
                location,
                old_owner,
                old_id,
                new_owner,
                new_id,
            });
        }
        events
    }

    /// Fold the committed transaction's collision and spawn records into
    /// player statistics.
    fn apply_sink_stats(&mut self, sink: &TurnSink) {
        for &(owner, cargo) in &sink.destroyed_cargo {
            let stats = &mut self.statistics[usize::from(owner)];
            stats.all_collisions += 1;
            stats.total_dropped += cargo;
        }
        for failure in &sink.errors {
            if let CommandErrorKind::SelfCollision { entities, .. } = &failure.kind {
                #[allow(clippy::cast_possible_truncation)]
                {
                    self.statistics[usize::from(failure.player)].self_collisions +=
                        entities.len() as u32;
                }
            }
        }
        for event in &sink.events {
            if let GameEvent::Spawn { owner, .. } = event {
                let stats = &mut self.statistics[usize::from(*owner)];
                stats.ships_spawned += 1;
                stats.last_turn_spawn = self.turn;
            }
        }
    }

    /// Whether a player could still act next turn.
    fn player_can_play(&self, player: &Player) -> bool {
        !player.entities.is_empty() || player.energy >= self.constants.new_entity_cost
    }

    /// Determine whether the game has ended, recording `can_play`
    /// transitions as they happen.
    fn game_ended(&mut self) -> bool {
        // All energy drained from the system: nothing left to compete for.
        if self.store.map_total_energy == 0
            && self
                .store
                .entities
                .values()
                .all(|entity| entity.energy == 0)
        {
            return true;
        }

        let mut alive = 0usize;
        let player_ids: Vec<PlayerId> = self.store.players.keys().copied().collect();
        for player_id in player_ids {
            let can_now = self.player_can_play(self.store.player(player_id));
            let player = self.store.player_mut(player_id);
            if !player.terminated && player.can_play && !can_now {
                info!("player {player_id} has insufficient resources to continue");
                player.can_play = false;
                // Liveness lasts to the end of the turn in which the player
                // could still have acted.
                self.statistics[usize::from(player_id)].last_turn_alive = self.turn;
            }
            if !self.store.player(player_id).terminated && can_now {
                alive += 1;
            }
        }

        if alive > 1 {
            return false;
        }
        // A lone player in a solo game keeps playing to the turn limit.
        !(self.store.players.len() == 1 && alive == 1)
    }

    /// Terminate a player for a transport failure: entities are removed
    /// (their cargo returns to the cells they stood on), the balance is
    /// zeroed, and the connection is torn down. Other players are
    /// unaffected.
    fn terminate_player(&mut self, player_id: PlayerId, source: &dyn CommandSource) {
        let entities: Vec<(EntityId, Location)> = {
            let player = self.store.player_mut(player_id);
            player.terminated = true;
            player.can_play = false;
            std::mem::take(&mut player.entities).into_iter().collect()
        };
        for (entity_id, location) in entities {
            let cargo = self.store.entity(entity_id).energy;
            let cell = self.map.at_mut(location);
            cell.entity = None;
            cell.energy += cargo;
            self.store.map_total_energy += cargo;
            self.store.changed_cells.insert(location);
            self.store.delete_entity(entity_id);
        }
        let player = self.store.player_mut(player_id);
        self.ledger.destroyed += player.energy;
        player.energy = 0;
        source.disconnect(player_id);
    }

    /// Build the per-turn state exposed outward for the transport.
    fn observation(&self) -> TurnObservation {
        TurnObservation {
            turn: self.turn,
            players: self
                .store
                .players
                .values()
                .map(|player| PlayerObservation {
                    player: player.id,
                    energy: player.energy,
                    entities: self.entity_states(player),
                    dropoffs: player
                        .dropoffs
                        .iter()
                        .map(|dropoff| dropoff.location)
                        .collect(),
                })
                .collect(),
            changed_cells: self.changed_cell_states(),
        }
    }

    fn entity_states(&self, player: &Player) -> Vec<EntityState> {
        player
            .entities
            .iter()
            .map(|(&id, &location)| {
                let entity = self.store.entity(id);
                EntityState {
                    id,
                    owner: player.id,
                    location,
                    energy: entity.energy,
                    is_inspired: entity.is_inspired,
                }
            })
            .collect()
    }

    fn changed_cell_states(&self) -> Vec<CellUpdate> {
        self.store
            .changed_cells
            .iter()
            .map(|&location| CellUpdate {
                location,
                energy: self.map.at(location).energy,
            })
            .collect()
    }

    /// Per-turn statistics updates (balance history, peaks, liveness).
    fn update_player_stats(&mut self) {
        for player in self.store.players.values() {
            let stats = &mut self.statistics[usize::from(player.id)];
            if player.is_eligible() {
                if !player.entities.is_empty()
                    || player.energy >= self.constants.new_entity_cost
                {
                    stats.last_turn_alive = self.turn;
                    stats.carried_at_end = player
                        .entities
                        .keys()
                        .map(|&id| self.store.entities[&id].energy)
                        .sum();
                }
                stats.turn_productions.push(player.energy);
                stats.turn_deposited.push(player.total_deposited);
                stats.total_production = player.total_deposited;
                stats.number_dropoffs = player.dropoffs.len();
                stats.ships_peak = stats.ships_peak.max(player.entities.len());
            } else {
                stats.turn_productions.push(0);
                stats.turn_deposited.push(0);
            }
        }
    }

    /// Record the end-of-turn frame: events, changed cells, and snapshots.
    fn record_frame(&mut self, events: Vec<GameEvent>) {
        let frame = Frame {
            turn: self.turn,
            events,
            cells: self.changed_cell_states(),
            entities: self
                .store
                .players
                .values()
                .flat_map(|player| self.entity_states(player))
                .collect(),
            players: self
                .store
                .players
                .values()
                .map(|player| PlayerSnapshot {
                    player: player.id,
                    energy: player.energy,
                    deposited: player.total_deposited,
                })
                .collect(),
        };
        self.replay.frames.push(frame);
    }
}

/// Deterministic ranking tiebreak id for a player.
fn tiebreak_id(seed: u64, player: PlayerId) -> u32 {
    let mut x = seed
        .wrapping_add(u64::from(player).wrapping_mul(0x9e37_79b9_7f4a_7c15))
        .wrapping_add(0x2545_f491_4f6c_dd1d);
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    #[allow(clippy::cast_possible_truncation)]
    {
        x as u32
    }
}
