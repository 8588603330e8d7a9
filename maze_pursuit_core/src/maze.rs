use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, Ordering},
};

use serde::{Deserialize, Serialize};

use crate::{Direction, Position, map::Grid};

/// Represents the static kind of a cell in the maze.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Open,
    Wall,
    Exit,
    /// A designated cell connected to every other teleport corner.
    Teleport,
}

/// Errors raised while building a maze from layout text. All of them are fatal.
#[derive(Debug, thiserror::Error)]
pub enum LayoutError {
    #[error("layout is empty")]
    Empty,
    #[error("inconsistent width at row {row}: expected {expected}, found {found}")]
    Ragged {
        /// Zero-based line of the input text, leading blank lines included.
        row: usize,
        expected: usize,
        found: usize,
    },
    #[error("unknown layout symbol {symbol:?} at ({row}, {col})")]
    UnknownCell { symbol: char, row: usize, col: usize },
    #[error("no agent start ('P') found in layout")]
    MissingAgent,
    #[error("multiple agent starts ('P') found at {first} and {second}")]
    DuplicateAgent { first: Position, second: Position },
    #[error("no exit ('E') found in layout")]
    MissingExit,
    #[error("multiple exits ('E') found at {first} and {second}")]
    DuplicateExit { first: Position, second: Position },
    #[error("failed to read layout {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

static NEXT_VERSION: AtomicU64 = AtomicU64::new(1);

/// Hands out a process-wide unique version stamp.
fn fresh_version() -> u64 {
    NEXT_VERSION.fetch_add(1, Ordering::Relaxed)
}

/// Geometry plus the placements read from the layout, all in one frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct Layout {
    cells: Grid<Cell>,
    exit: Position,
    corners: Vec<Position>,
    agent_start: Position,
    adversary_starts: Vec<Position>,
    food: Vec<Position>,
    bonus: Vec<Position>,
}

impl Layout {
    fn rotated_right(&self) -> Layout {
        let rows = self.cells.rows();
        let turn = |p: &Position| p.rotated_right(rows);
        let cells = self.cells.rotated_right();
        let corners = collect_corners(&cells);
        let mut food: Vec<Position> = self.food.iter().map(turn).collect();
        food.sort();
        let mut bonus: Vec<Position> = self.bonus.iter().map(turn).collect();
        bonus.sort();
        Layout {
            exit: turn(&self.exit),
            agent_start: turn(&self.agent_start),
            // Adversary order is their identity, so it is kept as is.
            adversary_starts: self.adversary_starts.iter().map(turn).collect(),
            food,
            bonus,
            corners,
            cells,
        }
    }
}

fn collect_corners(cells: &Grid<Cell>) -> Vec<Position> {
    cells
        .enumerate()
        .filter_map(|(p, cell)| (*cell == Cell::Teleport).then_some(p))
        .collect()
}

/// The maze: a mutable cell grid with its captured initial snapshot.
///
/// Every mutation (wall eating, rotation, reset) stamps a fresh version so
/// that distance caches built against an older geometry can notice.
#[derive(Debug, Clone, Serialize)]
pub struct Maze {
    current: Layout,
    #[serde(skip)]
    initial: Layout,
    version: u64,
    rotations: u32,
}

impl Maze {
    /// Parses a maze from layout text.
    ///
    /// Symbols: `' '` open, `'%'` wall, `'.'` food, `'0'` bonus, `'E'` exit,
    /// `'P'` agent start, `'G'` adversary start, `'T'` teleport corner.
    pub fn from_layout(text: &str) -> Result<Maze, LayoutError> {
        let mut lines: Vec<&str> = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .collect();
        while lines.last().is_some_and(|line| line.is_empty()) {
            lines.pop();
        }
        let first = lines
            .iter()
            .position(|line| !line.is_empty())
            .ok_or(LayoutError::Empty)?;
        let lines = &lines[first..];

        let rows = lines.len();
        let cols = lines[0].chars().count();
        for (row, line) in lines.iter().enumerate() {
            let found = line.chars().count();
            if found != cols {
                return Err(LayoutError::Ragged {
                    row: first + row,
                    expected: cols,
                    found,
                });
            }
        }

        let mut cells: Grid<Cell> = Grid::new(rows, cols);
        let mut agent_start: Option<Position> = None;
        let mut exit: Option<Position> = None;
        let mut adversary_starts = Vec::new();
        let mut food = Vec::new();
        let mut bonus = Vec::new();

        for (row, line) in lines.iter().enumerate() {
            for (col, symbol) in line.chars().enumerate() {
                let pos = Position { row, col };
                let cell = match symbol {
                    ' ' => Cell::Open,
                    '%' => Cell::Wall,
                    'T' => Cell::Teleport,
                    '.' => {
                        food.push(pos);
                        Cell::Open
                    }
                    '0' => {
                        bonus.push(pos);
                        Cell::Open
                    }
                    'G' => {
                        adversary_starts.push(pos);
                        Cell::Open
                    }
                    'P' => {
                        if let Some(first) = agent_start {
                            return Err(LayoutError::DuplicateAgent { first, second: pos });
                        }
                        agent_start = Some(pos);
                        Cell::Open
                    }
                    'E' => {
                        if let Some(first) = exit {
                            return Err(LayoutError::DuplicateExit { first, second: pos });
                        }
                        exit = Some(pos);
                        Cell::Exit
                    }
                    unknown => {
                        return Err(LayoutError::UnknownCell {
                            symbol: unknown,
                            row,
                            col,
                        });
                    }
                };
                cells[pos] = cell;
            }
        }

        let agent_start = agent_start.ok_or(LayoutError::MissingAgent)?;
        let exit = exit.ok_or(LayoutError::MissingExit)?;
        let corners = collect_corners(&cells);
        let layout = Layout {
            cells,
            exit,
            corners,
            agent_start,
            adversary_starts,
            food,
            bonus,
        };

        Ok(Maze {
            initial: layout.clone(),
            current: layout,
            version: fresh_version(),
            rotations: 0,
        })
    }

    /// Reads and parses a layout file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Maze, LayoutError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| LayoutError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Maze::from_layout(&text)
    }

    pub fn rows(&self) -> usize {
        self.current.cells.rows()
    }

    pub fn cols(&self) -> usize {
        self.current.cells.cols()
    }

    pub fn contains(&self, position: Position) -> bool {
        self.current.cells.contains(position)
    }

    pub fn cells(&self) -> &Grid<Cell> {
        &self.current.cells
    }

    pub fn cell(&self, position: Position) -> Option<Cell> {
        self.current.cells.get(position).copied()
    }

    /// True for wall cells and for anything outside the grid.
    pub fn is_wall(&self, position: Position) -> bool {
        self.cell(position).is_none_or(|cell| cell == Cell::Wall)
    }

    /// Turns a wall into an open cell. No-op for any other cell.
    pub fn eat_wall(&mut self, position: Position) {
        if let Some(cell) = self.current.cells.get_mut(position) {
            if *cell == Cell::Wall {
                *cell = Cell::Open;
                self.version = fresh_version();
            }
        }
    }

    pub fn teleport_corners(&self) -> &[Position] {
        &self.current.corners
    }

    pub fn is_teleport_corner(&self, position: Position) -> bool {
        self.cell(position) == Some(Cell::Teleport)
    }

    /// Every teleport corner except `position`, in row-major order.
    pub fn teleport_destinations(&self, position: Position) -> Vec<Position> {
        self.current
            .corners
            .iter()
            .copied()
            .filter(|corner| *corner != position)
            .collect()
    }

    /// Rotates the whole maze 90° right.
    ///
    /// Cell `(r, c)` moves to `(c, rows - 1 - r)`; the exit, corners and
    /// initial placements move with it. Positions stored outside the maze
    /// must be remapped by the caller in the same step.
    pub fn rotate_right(&mut self) {
        self.current = self.current.rotated_right();
        self.rotations += 1;
        self.version = fresh_version();
        tracing::trace!(
            rotations = self.rotations,
            rows = self.rows(),
            cols = self.cols(),
            "maze rotated"
        );
    }

    /// Restores the captured initial snapshot, undoing wall eating and rotation.
    pub fn reset(&mut self) {
        self.current = self.initial.clone();
        self.rotations = 0;
        self.version = fresh_version();
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Number of right rotations applied since construction or the last reset.
    pub fn rotations(&self) -> u32 {
        self.rotations
    }

    pub fn exit(&self) -> Position {
        self.current.exit
    }

    pub fn agent_start(&self) -> Position {
        self.current.agent_start
    }

    pub fn adversary_starts(&self) -> &[Position] {
        &self.current.adversary_starts
    }

    pub fn initial_food(&self) -> &[Position] {
        &self.current.food
    }

    pub fn initial_bonus(&self) -> &[Position] {
        &self.current.bonus
    }

    /// A read-only view of this maze turned right `quarter_turns` times.
    pub fn view(&self, quarter_turns: u32) -> MazeView<'_> {
        MazeView::new(self, quarter_turns)
    }
}

/// The maze seen through a number of 90° right turns, without mutating it.
///
/// Search explores paths that observe different rotation schedules, so the
/// geometry each state sees is derived from its own step count through a
/// view instead of rotating the shared maze.
#[derive(Debug, Clone, Copy)]
pub struct MazeView<'a> {
    maze: &'a Maze,
    quarter_turns: u8,
}

impl<'a> MazeView<'a> {
    pub fn new(maze: &'a Maze, quarter_turns: u32) -> Self {
        Self {
            maze,
            quarter_turns: (quarter_turns % 4) as u8,
        }
    }

    pub fn maze(&self) -> &'a Maze {
        self.maze
    }

    pub fn quarter_turns(&self) -> u8 {
        self.quarter_turns
    }

    pub fn rows(&self) -> usize {
        if self.quarter_turns % 2 == 0 {
            self.maze.rows()
        } else {
            self.maze.cols()
        }
    }

    pub fn cols(&self) -> usize {
        if self.quarter_turns % 2 == 0 {
            self.maze.cols()
        } else {
            self.maze.rows()
        }
    }

    pub fn contains(&self, position: Position) -> bool {
        position.row < self.rows() && position.col < self.cols()
    }

    /// Maps a position of this view back into the maze's own frame.
    pub fn to_base(&self, position: Position) -> Option<Position> {
        if !self.contains(position) {
            return None;
        }
        let mut p = position;
        let mut cols = self.cols();
        let mut rows = self.rows();
        for _ in 0..self.quarter_turns {
            // Undo one right turn: view (r, c) came from (cols - 1 - c, r).
            p = Position {
                row: cols - 1 - p.col,
                col: p.row,
            };
            std::mem::swap(&mut rows, &mut cols);
        }
        Some(p)
    }

    /// Maps a position of the maze's own frame into this view.
    pub fn from_base(&self, position: Position) -> Option<Position> {
        if !self.maze.contains(position) {
            return None;
        }
        let mut p = position;
        let mut rows = self.maze.rows();
        let mut cols = self.maze.cols();
        for _ in 0..self.quarter_turns {
            p = p.rotated_right(rows);
            std::mem::swap(&mut rows, &mut cols);
        }
        Some(p)
    }

    /// Neighbour of `position` in `direction`, if it lies inside the view.
    pub fn offset(&self, position: Position, direction: Direction) -> Option<Position> {
        position.step(direction).filter(|p| self.contains(*p))
    }

    pub fn cell(&self, position: Position) -> Option<Cell> {
        self.to_base(position).and_then(|p| self.maze.cell(p))
    }

    pub fn is_wall(&self, position: Position) -> bool {
        self.cell(position).is_none_or(|cell| cell == Cell::Wall)
    }

    pub fn is_teleport_corner(&self, position: Position) -> bool {
        self.cell(position) == Some(Cell::Teleport)
    }

    /// Every corner except `position`, in row-major order of this view.
    pub fn teleport_destinations(&self, position: Position) -> Vec<Position> {
        let mut destinations: Vec<Position> = self
            .maze
            .teleport_corners()
            .iter()
            .filter_map(|corner| self.from_base(*corner))
            .filter(|corner| *corner != position)
            .collect();
        destinations.sort();
        destinations
    }

    pub fn exit(&self) -> Position {
        // The exit always lies inside the maze, so the mapping cannot fail.
        self.from_base(self.maze.exit()).unwrap_or(self.maze.exit())
    }
}
