//! Property-based tests for the turn engine.
//!
//! Each case runs a full game, so debug-build invariant checks (occupancy,
//! uniqueness, conservation) execute every turn of every case. The
//! properties below assert what the checks cannot: determinism,
//! non-interference, and ranking shape.
//!
//! Run with: cargo test --release prop_engine

#![allow(missing_docs)]
#![allow(clippy::unwrap_used)]

use proptest::prelude::*;

use ember::bot::ScriptedSource;
use ember::{Command, Constants, Direction, GameEngine, GameOutcome, Location, Map};

/// A compact, always-wellformed-or-deliberately-invalid per-turn action.
#[derive(Debug, Clone, Copy)]
enum Action {
    Idle,
    Spawn,
    /// Move an entity by scripted index; resolves to a real or bogus id.
    Move(u8, u8),
    Construct(u8),
    /// Reference an entity that cannot exist.
    Bogus,
}

fn action_strategy() -> impl Strategy<Value = Action> {
    prop_oneof![
        3 => Just(Action::Idle),
        3 => Just(Action::Spawn),
        4 => (0u8..6, 0u8..4).prop_map(|(entity, direction)| Action::Move(entity, direction)),
        1 => (0u8..6).prop_map(Action::Construct),
        1 => Just(Action::Bogus),
    ]
}

fn to_commands(action: Action) -> Vec<Command> {
    let direction = |d: u8| match d {
        0 => Direction::North,
        1 => Direction::South,
        2 => Direction::East,
        _ => Direction::West,
    };
    match action {
        Action::Idle => vec![],
        Action::Spawn => vec![Command::Spawn],
        Action::Move(entity, d) => vec![Command::Move {
            entity: u32::from(entity),
            direction: direction(d),
        }],
        Action::Construct(entity) => vec![Command::Construct {
            entity: u32::from(entity),
        }],
        Action::Bogus => vec![Command::Construct { entity: 4_000_000 }],
    }
}

fn checkerboard_map(width: u16, height: u16) -> Map {
    let mut map = Map::new(width, height).unwrap();
    for y in 0..height {
        for x in 0..width {
            map.at_mut(Location::new(x, y)).energy = i64::from((x % 3 + y % 2) * 40);
        }
    }
    map
}

fn run_scripted(constants: &Constants, scripts: &[Vec<Action>; 2], turns: u32) -> GameOutcome {
    let map = checkerboard_map(12, 12);
    let factories = [Location::new(3, 6), Location::new(9, 6)];
    let mut engine = GameEngine::new(constants, map, &factories, 7).unwrap();
    engine.set_turn_limit(turns);
    let source = ScriptedSource::new();
    for (player, script) in scripts.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        for &action in script {
            source.push_commands(player as u8, to_commands(action));
        }
    }
    engine.run(&source)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// Identical inputs produce identical event streams and rankings, no
    /// matter what mix of valid and invalid commands the players submit.
    #[test]
    fn prop_determinism(
        script_a in prop::collection::vec(action_strategy(), 10),
        script_b in prop::collection::vec(action_strategy(), 10),
    ) {
        let constants = Constants::default();
        let scripts = [script_a, script_b];
        let first = run_scripted(&constants, &scripts, 10);
        let second = run_scripted(&constants, &scripts, 10);

        let first_json = serde_json::to_string(&first.replay).unwrap();
        let second_json = serde_json::to_string(&second.replay).unwrap();
        prop_assert_eq!(first_json, second_json);
    }

    /// A full random game never panics (the engine's debug invariant
    /// checks run every turn) and always assigns ranks 1..N.
    #[test]
    fn prop_game_completes_with_valid_ranking(
        script_a in prop::collection::vec(action_strategy(), 15),
        script_b in prop::collection::vec(action_strategy(), 15),
    ) {
        let constants = Constants::default();
        let outcome = run_scripted(&constants, &[script_a, script_b], 15);

        prop_assert!(outcome.turns_played <= 15);
        prop_assert_eq!(outcome.replay.frames.len(), outcome.turns_played as usize);
        let mut ranks: Vec<_> = outcome.statistics.iter().map(|s| s.rank).collect();
        ranks.sort_unstable();
        prop_assert_eq!(ranks, vec![1, 2]);
    }

    /// Removing an offending player's commands never changes a compliant
    /// player's outcome: player 0 spawning alone behaves identically with
    /// and without player 1's garbage.
    #[test]
    fn prop_non_interference(noise in prop::collection::vec(Just(Action::Bogus), 8)) {
        let constants = Constants::default();
        let mut spawn_then_idle = vec![Action::Spawn];
        spawn_then_idle.resize(8, Action::Idle);

        let clean = run_scripted(&constants, &[spawn_then_idle.clone(), vec![]], 8);
        let noisy = run_scripted(&constants, &[spawn_then_idle, noise], 8);

        prop_assert_eq!(clean.statistics[0].ships_spawned, 1);
        prop_assert_eq!(noisy.statistics[0].ships_spawned, 1);
        prop_assert_eq!(
            &clean.statistics[0].turn_productions,
            &noisy.statistics[0].turn_productions
        );
    }

    /// The retry loop is bounded: even when every player offends every
    /// turn, the game advances one turn per turn.
    #[test]
    fn prop_bounded_retries(turns in 1u32..8) {
        let constants = Constants::default();
        let bogus: Vec<Action> = (0..turns).map(|_| Action::Bogus).collect();
        let outcome = run_scripted(&constants, &[bogus.clone(), bogus], turns);

        prop_assert_eq!(outcome.turns_played, turns);
        prop_assert!(!outcome.replay.players[0].terminated);
        prop_assert!(!outcome.replay.players[1].terminated);
    }
}
