//! Per-map occupancy: walls block entry into a cell, ledges block leaving a
//! cell in one direction.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use engine::{Direction, PixelPoint, CELL_PX};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction a ledge blocks when the map lists it without one.
pub const DEFAULT_LEDGE_DIRECTION: Direction = Direction::Up;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct GridCoord {
    pub x: i32,
    pub y: i32,
}

impl GridCoord {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub const fn step(self, direction: Direction) -> Self {
        let (dx, dy) = direction.offset();
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    pub const fn to_pixels(self) -> PixelPoint {
        PixelPoint::new(self.x * CELL_PX, self.y * CELL_PX)
    }
}

impl fmt::Display for GridCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.x, self.y)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid grid coordinate {raw:?}: expected \"x,y\" with integer parts")]
pub struct GridCoordParseError {
    raw: String,
}

impl FromStr for GridCoord {
    type Err = GridCoordParseError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || GridCoordParseError {
            raw: raw.to_string(),
        };
        let (x, y) = raw.split_once(',').ok_or_else(invalid)?;
        let x = x.trim().parse().map_err(|_| invalid())?;
        let y = y.trim().parse().map_err(|_| invalid())?;
        Ok(Self { x, y })
    }
}

impl TryFrom<String> for GridCoord {
    type Error = GridCoordParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GridCoord> for String {
    fn from(value: GridCoord) -> Self {
        value.to_string()
    }
}

/// Ledges as authored: either a bare list of cells, each blocking
/// [`DEFAULT_LEDGE_DIRECTION`], or a table of cell to blocked direction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LedgeTable {
    Directed(BTreeMap<GridCoord, Direction>),
    Cells(Vec<GridCoord>),
}

impl Default for LedgeTable {
    fn default() -> Self {
        LedgeTable::Directed(BTreeMap::new())
    }
}

impl LedgeTable {
    pub fn into_directed(self) -> BTreeMap<GridCoord, Direction> {
        match self {
            LedgeTable::Directed(table) => table,
            LedgeTable::Cells(cells) => cells
                .into_iter()
                .map(|cell| (cell, DEFAULT_LEDGE_DIRECTION))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GridIndex {
    walls: BTreeSet<GridCoord>,
    ledges: BTreeMap<GridCoord, Direction>,
}

impl GridIndex {
    pub fn new(
        walls: impl IntoIterator<Item = GridCoord>,
        ledges: BTreeMap<GridCoord, Direction>,
    ) -> Self {
        Self {
            walls: walls.into_iter().collect(),
            ledges,
        }
    }

    /// True when stepping from `from` toward `direction` is not allowed:
    /// the destination is a wall, or `from` is a ledge blocking that way.
    pub fn is_blocked(&self, from: GridCoord, direction: Direction) -> bool {
        if self.walls.contains(&from.step(direction)) {
            return true;
        }
        self.ledges.get(&from) == Some(&direction)
    }

    pub fn is_wall(&self, coord: GridCoord) -> bool {
        self.walls.contains(&coord)
    }

    pub fn ledge_at(&self, coord: GridCoord) -> Option<Direction> {
        self.ledges.get(&coord).copied()
    }

    pub fn add_wall(&mut self, coord: GridCoord) {
        self.walls.insert(coord);
    }

    pub fn remove_wall(&mut self, coord: GridCoord) -> bool {
        self.walls.remove(&coord)
    }

    /// Moves the wall at `from` one cell toward `direction`.
    pub fn move_wall(&mut self, from: GridCoord, direction: Direction) {
        self.remove_wall(from);
        self.add_wall(from.step(direction));
    }

    pub fn walls(&self) -> impl Iterator<Item = GridCoord> + '_ {
        self.walls.iter().copied()
    }

    pub fn ledges(&self) -> &BTreeMap<GridCoord, Direction> {
        &self.ledges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_with_walls(walls: &[(i32, i32)]) -> GridIndex {
        GridIndex::new(
            walls.iter().map(|(x, y)| GridCoord::new(*x, *y)),
            BTreeMap::new(),
        )
    }

    #[test]
    fn coord_round_trips_through_key_string() {
        let coord: GridCoord = "7,-4".parse().expect("parse");
        assert_eq!(coord, GridCoord::new(7, -4));
        assert_eq!(coord.to_string(), "7,-4");
        assert!("7".parse::<GridCoord>().is_err());
        assert!("a,b".parse::<GridCoord>().is_err());
    }

    #[test]
    fn coord_serializes_as_map_key() {
        let mut table = BTreeMap::new();
        table.insert(GridCoord::new(5, 10), Direction::Up);
        let json = serde_json::to_string(&table).expect("encode");
        assert_eq!(json, r#"{"5,10":"up"}"#);
    }

    #[test]
    fn wall_at_destination_blocks_from_every_side() {
        let grid = grid_with_walls(&[(3, 3)]);
        assert!(grid.is_blocked(GridCoord::new(3, 4), Direction::Up));
        assert!(grid.is_blocked(GridCoord::new(3, 2), Direction::Down));
        assert!(grid.is_blocked(GridCoord::new(2, 3), Direction::Right));
        assert!(grid.is_blocked(GridCoord::new(4, 3), Direction::Left));
        assert!(!grid.is_blocked(GridCoord::new(4, 3), Direction::Right));
    }

    #[test]
    fn wall_blocks_regardless_of_ledge_on_source_cell() {
        let mut ledges = BTreeMap::new();
        ledges.insert(GridCoord::new(1, 1), Direction::Up);
        let grid = GridIndex::new([GridCoord::new(1, 2)], ledges);

        assert!(grid.is_blocked(GridCoord::new(1, 1), Direction::Down));
    }

    #[test]
    fn ledge_blocks_only_its_direction_from_its_own_cell() {
        let mut ledges = BTreeMap::new();
        ledges.insert(GridCoord::new(4, 4), Direction::Up);
        let grid = GridIndex::new([], ledges);
        let ledge = GridCoord::new(4, 4);

        assert!(grid.is_blocked(ledge, Direction::Up));
        for direction in [Direction::Down, Direction::Left, Direction::Right] {
            assert!(!grid.is_blocked(ledge, direction));
        }
        // Entering the ledge cell is ordinary movement.
        assert!(!grid.is_blocked(GridCoord::new(4, 5), Direction::Up));
        assert!(!grid.is_blocked(GridCoord::new(4, 3), Direction::Down));
    }

    #[test]
    fn ledge_direction_still_respects_destination_walls() {
        let mut ledges = BTreeMap::new();
        ledges.insert(GridCoord::new(0, 0), Direction::Up);
        let grid = GridIndex::new([GridCoord::new(1, 0)], ledges);

        assert!(grid.is_blocked(GridCoord::new(0, 0), Direction::Right));
        assert!(!grid.is_blocked(GridCoord::new(0, 0), Direction::Left));
    }

    #[test]
    fn move_wall_is_remove_then_add() {
        let mut grid = grid_with_walls(&[(5, 5)]);
        grid.move_wall(GridCoord::new(5, 5), Direction::Right);

        assert!(!grid.is_wall(GridCoord::new(5, 5)));
        assert!(grid.is_wall(GridCoord::new(6, 5)));
    }

    #[test]
    fn unknown_cells_default_to_passable() {
        let grid = GridIndex::default();
        assert!(!grid.is_blocked(GridCoord::new(-100, 42), Direction::Left));
        assert_eq!(grid.ledge_at(GridCoord::new(0, 0)), None);
    }

    #[test]
    fn ledge_list_defaults_to_blocking_up() {
        let table: LedgeTable = serde_json::from_str(r#"["2,3"]"#).expect("decode list");
        let directed = table.into_directed();
        assert_eq!(directed.get(&GridCoord::new(2, 3)), Some(&Direction::Up));

        let table: LedgeTable = serde_json::from_str(r#"{"2,3":"left"}"#).expect("decode map");
        assert_eq!(
            table.into_directed().get(&GridCoord::new(2, 3)),
            Some(&Direction::Left)
        );
    }
}
