//! Cost-to-go estimators for the planner.
//!
//! Every estimator owns its own [`DistanceOracle`], so caches never leak
//! between searches that run against different mazes. Distances are measured
//! under [`Passage::for_state`]: walls stop counting as soon as the agent
//! could eat through them, which keeps the admissible estimators below the
//! true cost of every reachable state.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    Cost, Position, UNREACHABLE,
    maze::MazeView,
    oracle::{DistanceOracle, Passage},
    state::State,
};

/// Proximity below which adversaries make the shaped estimate more expensive.
const DANGER_RADIUS: usize = 3;
/// Bonuses within this BFS distance make the shaped estimate cheaper.
const BONUS_RADIUS: Cost = 5;

/// Estimates the remaining cost from `state` to a goal.
pub trait Heuristic {
    /// A short stable name, used in logs and reports.
    fn name(&self) -> &'static str;

    /// Non-negative estimate; [`UNREACHABLE`] when no goal can be reached.
    fn estimate(&mut self, view: &MazeView<'_>, state: &State) -> Cost;
}

/// Selects one of the built-in estimators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeuristicKind {
    MazeDistance,
    ShapedMazeDistance,
    TeleportAware,
    SpanningTree,
    #[default]
    FarthestFoodAndExit,
}

impl HeuristicKind {
    pub const ALL: [HeuristicKind; 5] = [
        HeuristicKind::MazeDistance,
        HeuristicKind::ShapedMazeDistance,
        HeuristicKind::TeleportAware,
        HeuristicKind::SpanningTree,
        HeuristicKind::FarthestFoodAndExit,
    ];

    pub fn build(self) -> Box<dyn Heuristic> {
        match self {
            HeuristicKind::MazeDistance => Box::new(MazeDistance::admissible()),
            HeuristicKind::ShapedMazeDistance => Box::new(MazeDistance::shaped()),
            HeuristicKind::TeleportAware => Box::new(TeleportAware::default()),
            HeuristicKind::SpanningTree => Box::new(SpanningTree::default()),
            HeuristicKind::FarthestFoodAndExit => Box::new(FarthestFoodAndExit::default()),
        }
    }

    /// Whether plans found with this estimator are optimal.
    pub fn is_admissible(self) -> bool {
        self != HeuristicKind::ShapedMazeDistance
    }

    pub fn name(self) -> &'static str {
        match self {
            HeuristicKind::MazeDistance => "maze-distance",
            HeuristicKind::ShapedMazeDistance => "shaped-maze-distance",
            HeuristicKind::TeleportAware => "teleport-aware",
            HeuristicKind::SpanningTree => "spanning-tree",
            HeuristicKind::FarthestFoodAndExit => "farthest-food-and-exit",
        }
    }
}

impl fmt::Display for HeuristicKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for HeuristicKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HeuristicKind::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown heuristic '{s}'"))
    }
}

/// BFS distance to the nearest food, or to the exit once all food is gone.
///
/// The shaped variant adds a penalty for nearby adversaries and a reward for
/// power and reachable bonuses. It steers interactive play and is not
/// admissible.
#[derive(Debug, Clone, Default)]
pub struct MazeDistance {
    oracle: DistanceOracle,
    shaped: bool,
}

impl MazeDistance {
    pub fn admissible() -> Self {
        Self::default()
    }

    pub fn shaped() -> Self {
        Self {
            shaped: true,
            ..Self::default()
        }
    }

    fn adversary_penalty(state: &State) -> Cost {
        let agent = state.agent().position;
        state
            .adversaries()
            .iter()
            .map(|adversary| adversary.position.manhattan(agent))
            .filter(|d| *d <= DANGER_RADIUS)
            .map(|d| 2 * (DANGER_RADIUS + 1 - d) as Cost)
            .sum()
    }

    fn bonus_reward(&mut self, view: &MazeView<'_>, passage: &Passage, state: &State) -> Cost {
        let agent = state.agent().position;
        let nearby: Cost = state
            .bonus()
            .iter()
            .map(|bonus| self.oracle.distance_through(view, passage, agent, *bonus))
            .filter(|d| *d <= BONUS_RADIUS)
            .map(|d| BONUS_RADIUS + 1 - d)
            .sum();
        nearby.saturating_add(state.agent().power_steps)
    }
}

impl Heuristic for MazeDistance {
    fn name(&self) -> &'static str {
        if self.shaped {
            HeuristicKind::ShapedMazeDistance.name()
        } else {
            HeuristicKind::MazeDistance.name()
        }
    }

    fn estimate(&mut self, view: &MazeView<'_>, state: &State) -> Cost {
        let passage = Passage::for_state(view, state);
        let oracle = &mut self.oracle;
        let base = nearest_target(view, state, |from, to| {
            oracle.distance_through(view, &passage, from, to)
        });
        if !self.shaped || base == UNREACHABLE {
            return base;
        }
        let reward = self.bonus_reward(view, &passage, state);
        base.saturating_add(Self::adversary_penalty(state))
            .saturating_sub(reward)
    }
}

/// Nearest food (or the exit) under the teleport-aware distance.
#[derive(Debug, Clone, Default)]
pub struct TeleportAware {
    oracle: DistanceOracle,
}

impl Heuristic for TeleportAware {
    fn name(&self) -> &'static str {
        HeuristicKind::TeleportAware.name()
    }

    fn estimate(&mut self, view: &MazeView<'_>, state: &State) -> Cost {
        let passage = Passage::for_state(view, state);
        let oracle = &mut self.oracle;
        nearest_target(view, state, |from, to| {
            oracle.teleport_distance_through(view, &passage, from, to)
        })
    }
}

/// Weight of a minimum spanning tree over the remaining food, plus the
/// distance from the agent to the nearest food.
#[derive(Debug, Clone, Default)]
pub struct SpanningTree {
    oracle: DistanceOracle,
}

impl Heuristic for SpanningTree {
    fn name(&self) -> &'static str {
        HeuristicKind::SpanningTree.name()
    }

    fn estimate(&mut self, view: &MazeView<'_>, state: &State) -> Cost {
        let agent = state.agent().position;
        let passage = Passage::for_state(view, state);
        let oracle = &mut self.oracle;
        let food: Vec<Position> = state.food().iter().copied().collect();
        if food.is_empty() {
            return oracle.teleport_distance_through(view, &passage, agent, view.exit());
        }
        let approach = food
            .iter()
            .map(|f| oracle.teleport_distance_through(view, &passage, agent, *f))
            .min()
            .unwrap_or(UNREACHABLE);
        approach.saturating_add(prim(&food, |a, b| {
            // The teleport bound is not symmetric; either direction may be used.
            oracle
                .teleport_distance_through(view, &passage, a, b)
                .min(oracle.teleport_distance_through(view, &passage, b, a))
        }))
    }
}

/// Prim's algorithm over a complete graph given by `weight`.
fn prim<F>(nodes: &[Position], mut weight: F) -> Cost
where
    F: FnMut(Position, Position) -> Cost,
{
    let Some((&first, rest)) = nodes.split_first() else {
        return 0;
    };
    let mut pending: Vec<(Position, Cost)> = rest.iter().map(|n| (*n, weight(first, *n))).collect();
    let mut total: Cost = 0;
    while !pending.is_empty() {
        let Some((index, _)) = pending
            .iter()
            .enumerate()
            .min_by_key(|(_, (_, cost))| *cost)
        else {
            break;
        };
        let (joined, cost) = pending.swap_remove(index);
        total = total.saturating_add(cost);
        for (node, best) in &mut pending {
            *best = (*best).min(weight(joined, *node));
        }
    }
    total
}

/// The primary admissible estimator.
///
/// With food left it is the largest of three relaxations: reaching the
/// farthest food, leaving the food closest to the exit, and visiting some
/// food then finishing at the exit. Without food it is the exit distance.
#[derive(Debug, Clone, Default)]
pub struct FarthestFoodAndExit {
    oracle: DistanceOracle,
}

impl Heuristic for FarthestFoodAndExit {
    fn name(&self) -> &'static str {
        HeuristicKind::FarthestFoodAndExit.name()
    }

    fn estimate(&mut self, view: &MazeView<'_>, state: &State) -> Cost {
        let agent = state.agent().position;
        let exit = view.exit();
        let passage = Passage::for_state(view, state);
        if state.food().is_empty() {
            return self
                .oracle
                .teleport_distance_through(view, &passage, agent, exit);
        }
        let mut farthest: Cost = 0;
        let mut closest_to_exit = UNREACHABLE;
        let mut through: Cost = 0;
        for food in state.food() {
            let reach = self
                .oracle
                .teleport_distance_through(view, &passage, agent, *food);
            let leave = self
                .oracle
                .teleport_distance_through(view, &passage, *food, exit);
            farthest = farthest.max(reach);
            closest_to_exit = closest_to_exit.min(leave);
            through = through.max(reach.saturating_add(leave));
        }
        farthest.max(closest_to_exit).max(through)
    }
}

/// Distance to the nearest food, or to the exit when no food remains.
fn nearest_target<F>(view: &MazeView<'_>, state: &State, mut distance: F) -> Cost
where
    F: FnMut(Position, Position) -> Cost,
{
    let agent = state.agent().position;
    if state.food().is_empty() {
        return distance(agent, view.exit());
    }
    state
        .food()
        .iter()
        .map(|food| distance(agent, *food))
        .min()
        .unwrap_or(UNREACHABLE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Direction,
        maze::Maze,
        state::{Adversary, AgentState},
    };

    const OPEN: &str = "P   .\n     \n     \n     \n    E";

    fn estimate(kind: HeuristicKind, maze: &Maze, state: &State) -> Cost {
        kind.build().estimate(&maze.view(0), state)
    }

    #[test]
    fn open_room_values() {
        let maze = Maze::from_layout(OPEN).unwrap();
        let start = State::initial(&maze);
        assert_eq!(estimate(HeuristicKind::FarthestFoodAndExit, &maze, &start), 8);
        assert_eq!(estimate(HeuristicKind::MazeDistance, &maze, &start), 4);
        assert_eq!(estimate(HeuristicKind::TeleportAware, &maze, &start), 4);
        assert_eq!(estimate(HeuristicKind::SpanningTree, &maze, &start), 4);
    }

    #[test]
    fn spanning_tree_sums_food_edges() {
        let maze = Maze::from_layout("P . . .E").unwrap();
        let start = State::initial(&maze);
        // Nearest food at 2, then two edges of 2 between the foods.
        assert_eq!(estimate(HeuristicKind::SpanningTree, &maze, &start), 6);
        assert_eq!(estimate(HeuristicKind::FarthestFoodAndExit, &maze, &start), 7);
    }

    #[test]
    fn walls_stop_counting_while_they_can_be_eaten() {
        // Bonus, wall, food, exit: four moves straight east.
        let maze = Maze::from_layout("P0%.E\n %%% \n     ").unwrap();
        let start = State::initial(&maze);
        assert_eq!(estimate(HeuristicKind::FarthestFoodAndExit, &maze, &start), 4);
        for kind in [
            HeuristicKind::MazeDistance,
            HeuristicKind::TeleportAware,
            HeuristicKind::SpanningTree,
        ] {
            assert_eq!(estimate(kind, &maze, &start), 3, "{kind}");
        }

        // Bonus gone and power spent: only the eaten wall stays open.
        let mut agent = AgentState::new(Position::new(0, 1));
        let sealed = State::new(agent.clone(), vec![], [Position::new(0, 3)], [], 0, 0);
        assert_eq!(estimate(HeuristicKind::MazeDistance, &maze, &sealed), 10);
        let mut eaten = sealed.clone();
        eaten.opened_walls.insert(Position::new(0, 2));
        assert_eq!(estimate(HeuristicKind::MazeDistance, &maze, &eaten), 2);

        agent.power_steps = 1;
        let powered = State::new(agent, vec![], [Position::new(0, 3)], [], 0, 0);
        assert_eq!(estimate(HeuristicKind::FarthestFoodAndExit, &maze, &powered), 3);
    }

    #[test]
    fn unreachable_targets_propagate() {
        let maze = Maze::from_layout("P%.\n %E").unwrap();
        let start = State::initial(&maze);
        for kind in HeuristicKind::ALL {
            assert_eq!(estimate(kind, &maze, &start), UNREACHABLE, "{kind}");
        }
    }

    #[test]
    fn shaped_estimate_prices_danger_and_power() {
        let maze = Maze::from_layout("P    .\n      \n    0E").unwrap();
        let mut agent = AgentState::new(Position::new(0, 0));
        let calm = State::new(agent.clone(), vec![], [Position::new(0, 5)], [], 0, 0);
        assert_eq!(estimate(HeuristicKind::ShapedMazeDistance, &maze, &calm), 5);

        let mut ghost = Adversary::new(Position::new(1, 1), 0);
        ghost.heading = Direction::West;
        let threatened = State::new(agent.clone(), vec![ghost], [Position::new(0, 5)], [], 0, 0);
        // Manhattan distance 2 adds 2 * (4 - 2).
        assert_eq!(estimate(HeuristicKind::ShapedMazeDistance, &maze, &threatened), 9);

        agent.power_steps = 3;
        let powered = State::new(
            agent,
            vec![],
            [Position::new(0, 5)],
            [Position::new(2, 4)],
            0,
            0,
        );
        // Bonus at BFS distance 6 is out of reach; only the power counts.
        assert_eq!(estimate(HeuristicKind::ShapedMazeDistance, &maze, &powered), 2);
    }

    #[test]
    fn kinds_round_trip_through_their_names() {
        for kind in HeuristicKind::ALL {
            assert_eq!(kind.to_string().parse::<HeuristicKind>(), Ok(kind));
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{kind}\""));
            assert_eq!(kind.build().name(), kind.name());
        }
        assert!("manhattan".parse::<HeuristicKind>().is_err());
    }
}
