//! Result formatting for the CLI.

use ember::GameOutcome;
use serde::Serialize;

/// JSON-friendly view of a finished game.
#[derive(Debug, Serialize)]
pub(crate) struct JsonGameResult {
    turns_played: u32,
    players: Vec<JsonPlayerResult>,
}

#[derive(Debug, Serialize)]
struct JsonPlayerResult {
    player_id: u8,
    name: String,
    rank: usize,
    last_turn_alive: u32,
    final_energy: i64,
    total_deposited: i64,
    total_mined: i64,
    ships_spawned: u32,
    terminated: bool,
}

impl JsonGameResult {
    pub(crate) fn from_outcome(outcome: &GameOutcome) -> Self {
        let players = outcome
            .statistics
            .iter()
            .zip(&outcome.replay.players)
            .map(|(stats, player)| JsonPlayerResult {
                player_id: stats.player_id,
                name: player.name.clone(),
                rank: stats.rank,
                last_turn_alive: stats.last_turn_alive,
                final_energy: stats.turn_productions.last().copied().unwrap_or(0),
                total_deposited: stats.total_production,
                total_mined: stats.total_mined,
                ships_spawned: stats.ships_spawned,
                terminated: player.terminated,
            })
            .collect();
        Self {
            turns_played: outcome.turns_played,
            players,
        }
    }
}

/// Format a finished game as human-readable text.
pub(crate) fn format_text(outcome: &GameOutcome) -> String {
    let mut text = format!("Game over after {} turns\n\n", outcome.turns_played);

    let mut ranked: Vec<_> = outcome
        .statistics
        .iter()
        .zip(&outcome.replay.players)
        .collect();
    ranked.sort_by_key(|(stats, _)| stats.rank);

    for (stats, player) in ranked {
        let note = if player.terminated {
            " (terminated)"
        } else {
            ""
        };
        text.push_str(&format!(
            "  #{} {} — deposited {}, mined {}, {} ships, alive to turn {}{}\n",
            stats.rank,
            player.name,
            stats.total_production,
            stats.total_mined,
            stats.ships_spawned,
            stats.last_turn_alive,
            note,
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember::engine::PlayerStatistics;
    use ember::replay::{Replay, ReplayPlayer};
    use ember::{Constants, Location};

    fn sample_outcome() -> GameOutcome {
        let mut first = PlayerStatistics::new(0, 1);
        first.rank = 2;
        first.last_turn_alive = 30;
        let mut second = PlayerStatistics::new(1, 2);
        second.rank = 1;
        second.last_turn_alive = 50;
        second.total_production = 700;

        GameOutcome {
            turns_played: 50,
            statistics: vec![first, second],
            replay: Replay {
                version: 1,
                constants: Constants::default(),
                seed: 0,
                map_width: 8,
                map_height: 8,
                initial_cells: vec![0; 64],
                players: vec![
                    ReplayPlayer {
                        id: 0,
                        name: "alpha".to_string(),
                        factory: Location::new(1, 1),
                        terminated: true,
                    },
                    ReplayPlayer {
                        id: 1,
                        name: "beta".to_string(),
                        factory: Location::new(6, 6),
                        terminated: false,
                    },
                ],
                frames: Vec::new(),
                statistics: Vec::new(),
            },
            logs: ember::engine::PlayerLogs::default(),
        }
    }

    #[test]
    fn test_text_output_ranks_first() {
        let text = format_text(&sample_outcome());
        let beta = text.find("beta").expect("winner listed");
        let alpha = text.find("alpha").expect("loser listed");
        assert!(beta < alpha, "winner printed first");
        assert!(text.contains("(terminated)"));
    }

    #[test]
    fn test_json_output_serializes() {
        let result = JsonGameResult::from_outcome(&sample_outcome());
        let json = serde_json::to_string(&result).expect("serialize");
        assert!(json.contains(r#""rank":1"#));
        assert!(json.contains("beta"));
    }
}
