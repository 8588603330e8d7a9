use serde::{Deserialize, Serialize};

pub mod agent;
pub mod config;
pub mod game;
pub mod heuristics;
pub mod map;
pub mod maze;
pub mod oracle;
pub mod planner;
pub mod rules;
pub mod state;

/// Path cost in steps. Every action costs exactly one.
pub type Cost = u32;

/// Sentinel distance between cells that are not connected.
///
/// Aggregations use `max`, `min` and `saturating_add`, so the sentinel
/// survives them and is never confused with a short distance.
pub const UNREACHABLE: Cost = Cost::MAX;

/// Represents a 2D coordinate as (row, column).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    pub const fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Returns the neighbouring position one step in `direction`, or `None`
    /// when that would leave the non-negative quadrant.
    pub fn step(self, direction: Direction) -> Option<Position> {
        let (dr, dc) = direction.delta();
        Some(Position {
            row: self.row.checked_add_signed(dr)?,
            col: self.col.checked_add_signed(dc)?,
        })
    }

    pub fn manhattan(self, other: Position) -> usize {
        self.row.abs_diff(other.row) + self.col.abs_diff(other.col)
    }

    /// Maps this position through a 90° right rotation of a grid with `rows` rows.
    #[inline]
    pub fn rotated_right(self, rows: usize) -> Position {
        Position {
            row: self.col,
            col: rows - 1 - self.row,
        }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}

/// One of the four cardinal directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    West,
    East,
}

impl Direction {
    /// Enumeration order used wherever actions are generated.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::South,
        Direction::West,
        Direction::East,
    ];

    /// Displacement as (d_row, d_col).
    pub fn delta(self) -> (isize, isize) {
        match self {
            Direction::North => (-1, 0),
            Direction::South => (1, 0),
            Direction::West => (0, -1),
            Direction::East => (0, 1),
        }
    }

    pub fn opposite(self) -> Direction {
        match self {
            Direction::North => Direction::South,
            Direction::South => Direction::North,
            Direction::West => Direction::East,
            Direction::East => Direction::West,
        }
    }

    /// The direction a vector points to after the grid is turned 90° right.
    pub fn rotated_right(self) -> Direction {
        match self {
            Direction::North => Direction::East,
            Direction::East => Direction::South,
            Direction::South => Direction::West,
            Direction::West => Direction::North,
        }
    }
}
