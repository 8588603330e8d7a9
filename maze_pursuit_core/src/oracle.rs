//! Shortest-path distances over the maze.
//!
//! [`DistanceOracle`] answers point-to-point BFS queries and memoizes them
//! for as long as the maze keeps the same version. Distances are computed in
//! the maze's own frame; positions given in a rotated view are mapped back
//! first, which is sound because rotation preserves adjacency.
//!
//! Every query runs under a [`Passage`], the set of cells it may cross. The
//! cache is keyed by passage, so answers for different eaten-wall sets never
//! mix.

use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::{
    Cost, Direction, Position, UNREACHABLE,
    map::Grid,
    maze::{Maze, MazeView},
    state::State,
};

/// Cells a distance query may cross.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Passage {
    /// Maze walls block, except the listed ones, given in the maze's frame.
    Walls(BTreeSet<Position>),
    /// Any in-bounds cell can be entered.
    Open,
}

impl Default for Passage {
    fn default() -> Self {
        Passage::Walls(BTreeSet::new())
    }
}

impl Passage {
    /// The passage that never overstates travel cost from `state`.
    ///
    /// Power, or a bonus still on the board, lets the agent eat through any
    /// wall, so only the grid bounds remain. Otherwise walls block unless
    /// they were eaten on the way to `state`.
    pub fn for_state(view: &MazeView<'_>, state: &State) -> Self {
        if state.agent().power_steps > 0 || !state.bonus().is_empty() {
            return Passage::Open;
        }
        Passage::Walls(
            state
                .opened_walls()
                .iter()
                .filter_map(|wall| view.to_base(*wall))
                .collect(),
        )
    }
}

/// Single-source BFS over a `rows x cols` grid.
///
/// The start cell is expanded even when `blocked` reports it; every other
/// cell is entered only when it is not blocked. Unvisited cells hold
/// [`UNREACHABLE`].
pub fn distance_field<F>(rows: usize, cols: usize, blocked: F, start: Position) -> Grid<Cost>
where
    F: Fn(Position) -> bool,
{
    let mut field = Grid::from_generator(rows, cols, |_| UNREACHABLE);
    if !field.contains(start) {
        return field;
    }
    field[start] = 0;
    let mut queue = VecDeque::from([start]);
    while let Some(current) = queue.pop_front() {
        let next_distance = field[current] + 1;
        for direction in Direction::ALL {
            let Some(neighbor) = current.step(direction) else {
                continue;
            };
            match field.get(neighbor) {
                Some(&UNREACHABLE) if !blocked(neighbor) => {
                    field[neighbor] = next_distance;
                    queue.push_back(neighbor);
                }
                _ => {}
            }
        }
    }
    field
}

/// Memoized BFS distances between pairs of cells.
///
/// The cache belongs to one oracle and is thrown away whenever the maze it
/// is queried with carries a different version than the one it was filled
/// against (wall eating, rotation, reset). Queries under [`Passage::Open`]
/// are Manhattan distances and skip the cache.
#[derive(Debug, Clone, Default)]
pub struct DistanceOracle {
    cache: HashMap<Passage, HashMap<(Position, Position), Cost>>,
    version: Option<u64>,
    hits: u64,
    misses: u64,
}

impl DistanceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distance between two positions of `view`, through non-wall cells.
    pub fn distance(&mut self, view: &MazeView<'_>, from: Position, to: Position) -> Cost {
        self.distance_through(view, &Passage::default(), from, to)
    }

    /// Distance between two positions of `view` under `passage`.
    pub fn distance_through(
        &mut self,
        view: &MazeView<'_>,
        passage: &Passage,
        from: Position,
        to: Position,
    ) -> Cost {
        match (view.to_base(from), view.to_base(to)) {
            (Some(start), Some(goal)) => {
                self.base_distance_through(view.maze(), passage, start, goal)
            }
            _ => UNREACHABLE,
        }
    }

    /// Distance between two positions given in the maze's own frame.
    pub fn base_distance(&mut self, maze: &Maze, start: Position, goal: Position) -> Cost {
        self.base_distance_through(maze, &Passage::default(), start, goal)
    }

    pub fn base_distance_through(
        &mut self,
        maze: &Maze,
        passage: &Passage,
        start: Position,
        goal: Position,
    ) -> Cost {
        if !maze.contains(start) || !maze.contains(goal) {
            return UNREACHABLE;
        }
        let opened = match passage {
            Passage::Open => return start.manhattan(goal) as Cost,
            Passage::Walls(opened) => opened,
        };
        self.sync(maze);
        if let Some(distance) = self
            .cache
            .get(passage)
            .and_then(|pairs| pairs.get(&(start, goal)))
        {
            self.hits += 1;
            return *distance;
        }
        self.misses += 1;
        let distance = bfs(maze, opened, start, goal);
        if !self.cache.contains_key(passage) {
            self.cache.insert(passage.clone(), HashMap::new());
        }
        if let Some(pairs) = self.cache.get_mut(passage) {
            pairs.insert((start, goal), distance);
            pairs.insert((goal, start), distance);
        }
        distance
    }

    /// Lower bound on the travel cost between two positions of `view` when
    /// teleport corners may be used.
    ///
    /// `min(direct, d(from, c1) + [from = c1] + d(c2, to))` over every pair
    /// of distinct corners: walking onto a corner is the jump, while standing
    /// on one costs an extra step to leave through it.
    pub fn teleport_distance(&mut self, view: &MazeView<'_>, from: Position, to: Position) -> Cost {
        self.teleport_distance_through(view, &Passage::default(), from, to)
    }

    /// [`teleport_distance`](Self::teleport_distance) under `passage`.
    pub fn teleport_distance_through(
        &mut self,
        view: &MazeView<'_>,
        passage: &Passage,
        from: Position,
        to: Position,
    ) -> Cost {
        let (Some(from), Some(to)) = (view.to_base(from), view.to_base(to)) else {
            return UNREACHABLE;
        };
        let maze = view.maze();
        let mut best = self.base_distance_through(maze, passage, from, to);
        let corners = maze.teleport_corners();
        if corners.len() < 2 {
            return best;
        }
        for &entry in corners {
            let reach = self.base_distance_through(maze, passage, from, entry);
            if reach == UNREACHABLE {
                continue;
            }
            let reach = reach + Cost::from(from == entry);
            for &landing in corners.iter().filter(|corner| **corner != entry) {
                let rest = self.base_distance_through(maze, passage, landing, to);
                best = best.min(reach.saturating_add(rest));
            }
        }
        best
    }

    fn sync(&mut self, maze: &Maze) {
        if self.version != Some(maze.version()) {
            if !self.cache.is_empty() {
                tracing::trace!(
                    entries = self.len(),
                    "maze changed, dropping distance cache"
                );
            }
            self.cache.clear();
            self.version = Some(maze.version());
        }
    }

    /// Number of memoized pairs (both orientations count).
    pub fn len(&self) -> usize {
        self.cache.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.version = None;
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

/// Point-to-point BFS that stops as soon as the goal is dequeued. Walls in
/// `opened` are crossed like open cells.
fn bfs(maze: &Maze, opened: &BTreeSet<Position>, start: Position, goal: Position) -> Cost {
    if start == goal {
        return 0;
    }
    let blocked = |p: Position| maze.is_wall(p) && !opened.contains(&p);
    let mut seen: Grid<bool> = Grid::new(maze.rows(), maze.cols());
    seen[start] = true;
    let mut queue = VecDeque::from([(start, 0)]);
    while let Some((current, distance)) = queue.pop_front() {
        for direction in Direction::ALL {
            let Some(neighbor) = current.step(direction) else {
                continue;
            };
            if blocked(neighbor) || seen.get(neighbor).is_none_or(|s| *s) {
                continue;
            }
            if neighbor == goal {
                return distance + 1;
            }
            seen[neighbor] = true;
            queue.push_back((neighbor, distance + 1));
        }
    }
    UNREACHABLE
}
