//! Deterministic map generation.
//!
//! A small seeded generator sufficient to drive games: hashed value noise
//! with occasional rich veins, mirrored across the map so every player
//! starts with an equivalent neighborhood. The elaborate noise/tiling
//! generators of full tournament setups stay out of scope.

use std::fmt;

use crate::game::{Energy, Location, Map};

/// Error type for map generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapGenError {
    /// Dimensions are zero or too small to place factories.
    InvalidDimensions {
        /// Requested width.
        width: u16,
        /// Requested height.
        height: u16,
    },
    /// Only 1, 2, or 4 players can be placed symmetrically.
    UnsupportedPlayerCount(usize),
}

impl fmt::Display for MapGenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDimensions { width, height } => {
                write!(f, "invalid map dimensions {width}x{height} (minimum 8x8)")
            }
            Self::UnsupportedPlayerCount(count) => {
                write!(f, "unsupported player count {count} (expected 1, 2, or 4)")
            }
        }
    }
}

impl std::error::Error for MapGenError {}

/// Deterministic 64-bit mixer.
fn mix(seed: u64, index: u64) -> u64 {
    let mut x = seed.wrapping_add(index).wrapping_add(0x9e37_79b9_7f4a_7c15);
    x ^= x >> 33;
    x = x.wrapping_mul(0xff51_afd7_ed55_8ccd);
    x ^= x >> 33;
    x = x.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    x ^= x >> 33;
    x
}

/// Energy for a cell before mirroring.
fn cell_energy(seed: u64, x: u16, y: u16) -> Energy {
    let raw = mix(seed, (u64::from(y) << 16) | u64::from(x));
    #[allow(clippy::cast_possible_wrap)]
    let base = (raw % 225) as Energy;
    // Sparse rich veins.
    if raw % 23 == 0 { (base * 4).min(1000) } else { base }
}

/// Generate a symmetric map and one factory location per player.
///
/// The same seed, dimensions, and player count always produce the same map.
///
/// # Errors
///
/// Returns an error for degenerate dimensions or a player count that cannot
/// be mirrored.
pub fn generate_map(
    seed: u64,
    width: u16,
    height: u16,
    players: usize,
) -> Result<(Map, Vec<Location>), MapGenError> {
    if width < 8 || height < 8 {
        return Err(MapGenError::InvalidDimensions { width, height });
    }
    if !matches!(players, 1 | 2 | 4) {
        return Err(MapGenError::UnsupportedPlayerCount(players));
    }

    let mut map = Map::new(width, height)
        .ok_or(MapGenError::InvalidDimensions { width, height })?;

    // Fill one fundamental region and mirror it so spawns are fair.
    for y in 0..height {
        for x in 0..width {
            let source_x = if players >= 2 { x.min(width - 1 - x) } else { x };
            let source_y = if players == 4 { y.min(height - 1 - y) } else { y };
            map.at_mut(Location::new(x, y)).energy = cell_energy(seed, source_x, source_y);
        }
    }

    let factories = match players {
        1 => vec![Location::new(width / 2, height / 2)],
        2 => vec![
            Location::new(width / 4, height / 2),
            Location::new(width - 1 - width / 4, height / 2),
        ],
        _ => vec![
            Location::new(width / 4, height / 4),
            Location::new(width - 1 - width / 4, height / 4),
            Location::new(width / 4, height - 1 - height / 4),
            Location::new(width - 1 - width / 4, height - 1 - height / 4),
        ],
    };

    Ok((map, factories))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let (a, factories_a) = generate_map(7, 32, 32, 2).unwrap();
        let (b, factories_b) = generate_map(7, 32, 32, 2).unwrap();
        assert_eq!(factories_a, factories_b);
        for (location, cell) in a.iter() {
            assert_eq!(cell.energy, b.at(location).energy);
        }
    }

    #[test]
    fn test_different_seeds_differ() {
        let (a, _) = generate_map(1, 32, 32, 2).unwrap();
        let (b, _) = generate_map(2, 32, 32, 2).unwrap();
        let same = a
            .iter()
            .filter(|(location, cell)| cell.energy == b.at(*location).energy)
            .count();
        assert!(same < 32 * 32, "seeds produce distinct maps");
    }

    #[test]
    fn test_two_player_map_mirrors() {
        let (map, factories) = generate_map(99, 24, 24, 2).unwrap();
        for (location, cell) in map.iter() {
            let mirrored = Location::new(24 - 1 - location.x, location.y);
            assert_eq!(cell.energy, map.at(mirrored).energy);
        }
        assert_eq!(factories.len(), 2);
        assert_ne!(factories[0], factories[1]);
    }

    #[test]
    fn test_four_player_map_mirrors_both_axes() {
        let (map, factories) = generate_map(5, 16, 16, 4).unwrap();
        for (location, cell) in map.iter() {
            let mirrored = Location::new(15 - location.x, 15 - location.y);
            assert_eq!(cell.energy, map.at(mirrored).energy);
        }
        assert_eq!(factories.len(), 4);
    }

    #[test]
    fn test_rejects_bad_inputs() {
        assert!(matches!(
            generate_map(0, 4, 32, 2),
            Err(MapGenError::InvalidDimensions { .. })
        ));
        assert!(matches!(
            generate_map(0, 32, 32, 3),
            Err(MapGenError::UnsupportedPlayerCount(3))
        ));
    }

    #[test]
    fn test_energy_within_bounds() {
        let (map, _) = generate_map(123, 32, 32, 4).unwrap();
        for (_, cell) in map.iter() {
            assert!(cell.energy >= 0 && cell.energy <= 1000);
        }
    }
}
