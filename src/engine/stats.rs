//! Per-player statistics and end-of-game ranking.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::game::{Energy, PlayerId};

/// Statistics for a player in the game.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerStatistics {
    /// The player this record belongs to.
    pub player_id: PlayerId,
    /// Random number assigned once at game start, used to break exact ties.
    pub random_id: u32,
    /// The player's final rank (1 = winner). Zero until ranking runs.
    pub rank: usize,
    /// The last turn the player was able to play.
    pub last_turn_alive: u32,
    /// The last turn the player spawned an entity.
    pub last_turn_spawn: u32,
    /// Balance at the end of each turn; index 0 is the start of the game.
    pub turn_productions: Vec<Energy>,
    /// Running deposit total at the end of each turn.
    pub turn_deposited: Vec<Energy>,
    /// Total energy deposited over the game.
    pub total_production: Energy,
    /// Total energy extracted from the map, excluding inspiration bonuses.
    pub total_mined: Energy,
    /// Total energy minted by inspiration bonuses.
    pub total_bonus: Energy,
    /// Total carried energy lost to collisions.
    pub total_dropped: Energy,
    /// Energy carried by the player's entities on the final frame.
    pub carried_at_end: Energy,
    /// Number of entities spawned.
    pub ships_spawned: u32,
    /// Peak number of simultaneously live entities.
    pub ships_peak: usize,
    /// Entities gained through captures.
    pub ships_captured: u32,
    /// Entities lost through captures.
    pub ships_given: u32,
    /// Entities lost to collisions with the player's own entities.
    pub self_collisions: u32,
    /// Entities lost to collisions with any entities.
    pub all_collisions: u32,
    /// Number of dropoffs constructed.
    pub number_dropoffs: usize,
}

impl PlayerStatistics {
    /// Create a fresh record for a player.
    #[must_use]
    pub fn new(player_id: PlayerId, random_id: u32) -> Self {
        Self {
            player_id,
            random_id,
            rank: 0,
            last_turn_alive: 0,
            last_turn_spawn: 0,
            turn_productions: Vec::new(),
            turn_deposited: Vec::new(),
            total_production: 0,
            total_mined: 0,
            total_bonus: 0,
            total_dropped: 0,
            carried_at_end: 0,
            ships_spawned: 0,
            ships_peak: 0,
            ships_captured: 0,
            ships_given: 0,
            self_collisions: 0,
            all_collisions: 0,
            number_dropoffs: 0,
        }
    }

    /// Whether this player ranks below (is worse than) the other.
    ///
    /// Later last turn alive wins; ties walk backwards through per-turn
    /// balances until a difference is found; exact ties fall back to the
    /// random tiebreak id.
    #[must_use]
    fn ranks_below(&self, other: &Self) -> bool {
        if self.last_turn_alive != other.last_turn_alive {
            return self.last_turn_alive < other.last_turn_alive;
        }
        let newest = self
            .turn_productions
            .len()
            .min(other.turn_productions.len());
        let mut turn = (self.last_turn_alive as usize).min(newest.saturating_sub(1));
        loop {
            let mine = self.turn_productions.get(turn);
            let theirs = other.turn_productions.get(turn);
            if mine != theirs {
                return mine < theirs;
            }
            if turn == 0 {
                return self.random_id < other.random_id;
            }
            turn -= 1;
        }
    }
}

/// Assign ranks 1..N.
///
/// Statistics are ranked best-first, given their rank, and then re-ordered
/// by player id — the id ordering is presentation only, the ranking itself
/// never depends on it.
pub fn rank_players(statistics: &mut [PlayerStatistics]) {
    statistics.sort_by(|a, b| {
        if a.ranks_below(b) {
            Ordering::Greater
        } else if b.ranks_below(a) {
            Ordering::Less
        } else {
            Ordering::Equal
        }
    });
    for (index, stats) in statistics.iter_mut().enumerate() {
        stats.rank = index + 1;
    }
    statistics.sort_by_key(|stats| stats.player_id);
}
