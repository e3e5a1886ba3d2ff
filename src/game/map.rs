//! Map, cells, and toroidal geometry.

use serde::{Deserialize, Serialize};

use crate::game::{Energy, EntityId, PlayerId};

/// A direction an entity can be ordered to move in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Direction {
    /// Decreasing y.
    North,
    /// Increasing y.
    South,
    /// Increasing x.
    East,
    /// Decreasing x.
    West,
    /// Stay put. A `Still` move is a no-op and is dropped before validation.
    Still,
}

impl Direction {
    /// Parse a direction from its wire character (`n|s|e|w|o`).
    #[must_use]
    pub const fn from_wire(c: char) -> Option<Self> {
        match c {
            'n' => Some(Self::North),
            's' => Some(Self::South),
            'e' => Some(Self::East),
            'w' => Some(Self::West),
            'o' => Some(Self::Still),
            _ => None,
        }
    }

    /// The wire character for this direction.
    #[must_use]
    pub const fn to_wire(self) -> char {
        match self {
            Self::North => 'n',
            Self::South => 's',
            Self::East => 'e',
            Self::West => 'w',
            Self::Still => 'o',
        }
    }
}

/// A location on the map.
///
/// Locations are always normalized: `0 <= x < width`, `0 <= y < height`.
/// All arithmetic on locations goes through [`Map`], which wraps around the
/// torus.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Location {
    /// X coordinate (column).
    pub x: u16,
    /// Y coordinate (row).
    pub y: u16,
}

impl Location {
    /// Create a new location.
    #[must_use]
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

/// A single cell on the map.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cell {
    /// Energy available on this cell. Never negative.
    pub energy: Energy,
    /// Owner of this cell (None = unowned). A cell becomes owned when a
    /// factory is placed on it or a dropoff is constructed there, and is
    /// never released.
    pub owner: Option<PlayerId>,
    /// The entity resting on this cell, if any.
    pub entity: Option<EntityId>,
}

/// The game map: a torus of cells.
#[derive(Debug, Clone)]
pub struct Map {
    width: u16,
    height: u16,
    /// Cells stored in row-major order.
    cells: Vec<Cell>,
}

impl Map {
    /// Create a new map of empty cells.
    ///
    /// Returns `None` if width or height is zero.
    #[must_use]
    pub fn new(width: u16, height: u16) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let size = usize::from(width) * usize::from(height);
        Some(Self {
            width,
            height,
            cells: vec![Cell::default(); size],
        })
    }

    /// Get the width of the map.
    #[must_use]
    pub const fn width(&self) -> u16 {
        self.width
    }

    /// Get the height of the map.
    #[must_use]
    pub const fn height(&self) -> u16 {
        self.height
    }

    fn index(&self, location: Location) -> usize {
        debug_assert!(location.x < self.width && location.y < self.height);
        usize::from(location.y) * usize::from(self.width) + usize::from(location.x)
    }

    /// Get the cell at a location.
    #[must_use]
    pub fn at(&self, location: Location) -> &Cell {
        &self.cells[self.index(location)]
    }

    /// Get the cell at a location, mutably.
    pub fn at_mut(&mut self, location: Location) -> &mut Cell {
        let index = self.index(location);
        &mut self.cells[index]
    }

    /// Normalize raw signed coordinates onto the torus.
    #[must_use]
    pub fn normalize(&self, x: i32, y: i32) -> Location {
        let width = i32::from(self.width);
        let height = i32::from(self.height);
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        Location {
            x: (((x % width) + width) % width) as u16,
            y: (((y % height) + height) % height) as u16,
        }
    }

    /// The location one step from `location` in `direction`, wrapping around
    /// the map edges. `Still` returns the location unchanged.
    #[must_use]
    pub fn offset(&self, location: Location, direction: Direction) -> Location {
        let (x, y) = (i32::from(location.x), i32::from(location.y));
        match direction {
            Direction::North => self.normalize(x, y - 1),
            Direction::South => self.normalize(x, y + 1),
            Direction::East => self.normalize(x + 1, y),
            Direction::West => self.normalize(x - 1, y),
            Direction::Still => location,
        }
    }

    /// The wrap-around Manhattan distance between two locations.
    #[must_use]
    pub fn distance(&self, from: Location, to: Location) -> u16 {
        let dx = from.x.abs_diff(to.x);
        let dy = from.y.abs_diff(to.y);
        dx.min(self.width - dx) + dy.min(self.height - dy)
    }

    /// Iterate over all locations and cells in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = (Location, &Cell)> {
        let width = self.width;
        self.cells.iter().enumerate().map(move |(idx, cell)| {
            #[allow(clippy::cast_possible_truncation)]
            let location = Location {
                x: (idx % usize::from(width)) as u16,
                y: (idx / usize::from(width)) as u16,
            };
            (location, cell)
        })
    }

    /// Sum of energy across all cells.
    #[must_use]
    pub fn total_energy(&self) -> Energy {
        self.cells.iter().map(|cell| cell.energy).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_wire_round_trip() {
        for c in ['n', 's', 'e', 'w', 'o'] {
            let direction = Direction::from_wire(c).unwrap();
            assert_eq!(direction.to_wire(), c);
        }
        assert_eq!(Direction::from_wire('x'), None);
    }

    #[test]
    fn test_map_zero_size() {
        assert!(Map::new(0, 8).is_none());
        assert!(Map::new(8, 0).is_none());
    }

    #[test]
    fn test_offset_wraps() {
        let map = Map::new(8, 8).unwrap();
        assert_eq!(
            map.offset(Location::new(0, 0), Direction::North),
            Location::new(0, 7)
        );
        assert_eq!(
            map.offset(Location::new(0, 0), Direction::West),
            Location::new(7, 0)
        );
        assert_eq!(
            map.offset(Location::new(7, 7), Direction::South),
            Location::new(7, 0)
        );
        assert_eq!(
            map.offset(Location::new(7, 7), Direction::East),
            Location::new(0, 7)
        );
    }

    #[test]
    fn test_offset_still_is_identity() {
        let map = Map::new(8, 8).unwrap();
        let location = Location::new(3, 4);
        assert_eq!(map.offset(location, Direction::Still), location);
    }

    #[test]
    fn test_distance_wraps() {
        let map = Map::new(8, 8).unwrap();
        assert_eq!(map.distance(Location::new(0, 0), Location::new(7, 0)), 1);
        assert_eq!(map.distance(Location::new(0, 0), Location::new(4, 4)), 8);
        assert_eq!(map.distance(Location::new(1, 1), Location::new(1, 1)), 0);
        assert_eq!(map.distance(Location::new(0, 0), Location::new(3, 7)), 4);
    }

    #[test]
    fn test_normalize() {
        let map = Map::new(8, 8).unwrap();
        assert_eq!(map.normalize(-1, -1), Location::new(7, 7));
        assert_eq!(map.normalize(8, 9), Location::new(0, 1));
        assert_eq!(map.normalize(-9, 17), Location::new(7, 1));
    }

    #[test]
    fn test_total_energy() {
        let mut map = Map::new(4, 4).unwrap();
        map.at_mut(Location::new(0, 0)).energy = 100;
        map.at_mut(Location::new(3, 3)).energy = 50;
        assert_eq!(map.total_energy(), 150);
    }
}
