//! A* search over game states.
//!
//! The planner borrows the maze immutably for the whole search and explores
//! through [`Rules::transition`], so scheduled rotations and eaten walls are
//! part of each state rather than mutations of the shared maze.

use std::{
    cmp::Ordering,
    collections::{BinaryHeap, HashMap},
    time::{Duration, Instant},
};

use serde::{Deserialize, Serialize};

use crate::{
    Cost,
    heuristics::{Heuristic, HeuristicKind},
    maze::Maze,
    rules::Rules,
    state::{Action, State},
};

/// Tunables for a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlannerConfig {
    pub heuristic: HeuristicKind,
    /// Stop after this many expansions; `None` searches until exhausted.
    pub max_expansions: Option<usize>,
}

/// An action sequence from the initial state to a goal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub actions: Vec<Action>,
    pub cost: Cost,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum SearchOutcome {
    Found(Plan),
    /// Every reachable state was expanded without meeting the goal.
    Exhausted,
    /// The expansion budget ran out first.
    LimitReached,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SearchStats {
    pub expanded: usize,
    pub generated: usize,
    pub max_frontier: usize,
    pub elapsed: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchReport {
    pub outcome: SearchOutcome,
    pub stats: SearchStats,
}

impl SearchReport {
    pub fn plan(&self) -> Option<&Plan> {
        match &self.outcome {
            SearchOutcome::Found(plan) => Some(plan),
            _ => None,
        }
    }

    pub fn into_plan(self) -> Option<Plan> {
        match self.outcome {
            SearchOutcome::Found(plan) => Some(plan),
            _ => None,
        }
    }
}

/// A state reached during search, with the edge that reached it.
struct Node {
    state: State,
    parent: Option<(usize, Action)>,
}

/// Frontier entry; the heap pops the smallest `(f, g, seq)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PrioritizedItem {
    f: Cost,
    g: Cost,
    seq: u64,
    node: usize,
}

impl Ord for PrioritizedItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap behavior
        other
            .f
            .cmp(&self.f)
            .then_with(|| other.g.cmp(&self.g))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PrioritizedItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Debug, Clone)]
pub struct Planner {
    rules: Rules,
    config: PlannerConfig,
}

impl Planner {
    pub fn new(rules: Rules, config: PlannerConfig) -> Self {
        Self { rules, config }
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Successors that change the state and do not end in a catch, in
    /// action generation order.
    pub fn successors(&self, maze: &Maze, state: &State) -> Vec<(Action, State)> {
        self.rules
            .legal_actions(maze, state)
            .into_iter()
            .filter_map(|action| {
                let next = self.rules.transition(maze, state, action);
                let accepted = next.step_count() != state.step_count() && !next.caught();
                accepted.then_some((action, next))
            })
            .collect()
    }

    /// Shortest plan to a state the rules consider a goal.
    pub fn plan(
        &self,
        maze: &Maze,
        initial: &State,
        heuristic: &mut dyn Heuristic,
    ) -> Option<Plan> {
        self.search(maze, initial, |state| self.rules.is_goal(maze, state), heuristic)
    }

    pub fn search<G>(
        &self,
        maze: &Maze,
        initial: &State,
        goal: G,
        heuristic: &mut dyn Heuristic,
    ) -> Option<Plan>
    where
        G: Fn(&State) -> bool,
    {
        self.search_with_report(maze, initial, goal, heuristic)
            .into_plan()
    }

    /// Runs A* from `initial` and reports the outcome with statistics.
    ///
    /// The goal test happens when a state is popped, so with an admissible
    /// heuristic the returned plan is optimal. A closed state is reopened
    /// only when a cheaper path to it turns up, which a consistent heuristic
    /// never produces.
    pub fn search_with_report<G>(
        &self,
        maze: &Maze,
        initial: &State,
        goal: G,
        heuristic: &mut dyn Heuristic,
    ) -> SearchReport
    where
        G: Fn(&State) -> bool,
    {
        let started = Instant::now();
        let mut stats = SearchStats::default();
        let mut nodes: Vec<Node> = Vec::new();
        let mut frontier: BinaryHeap<PrioritizedItem> = BinaryHeap::new();
        let mut best_g: HashMap<State, Cost> = HashMap::new();
        // Cost at which each state was expanded.
        let mut closed: HashMap<State, Cost> = HashMap::new();
        let mut seq: u64 = 0;

        tracing::debug!(
            heuristic = heuristic.name(),
            food = initial.food_left(),
            max_expansions = ?self.config.max_expansions,
            "search started"
        );

        let h = heuristic.estimate(&self.rules.view(maze, initial), initial);
        nodes.push(Node {
            state: initial.clone(),
            parent: None,
        });
        best_g.insert(initial.clone(), 0);
        frontier.push(PrioritizedItem {
            f: h,
            g: 0,
            seq,
            node: 0,
        });
        stats.max_frontier = 1;

        let outcome = loop {
            let Some(item) = frontier.pop() else {
                break SearchOutcome::Exhausted;
            };
            let state = nodes[item.node].state.clone();

            if goal(&state) {
                break SearchOutcome::Found(Plan {
                    actions: Self::reconstruct(&nodes, item.node),
                    cost: item.g,
                });
            }
            let stale = best_g.get(&state).is_some_and(|g| *g < item.g);
            if stale || closed.get(&state).is_some_and(|g| *g <= item.g) {
                continue;
            }
            if self
                .config
                .max_expansions
                .is_some_and(|limit| stats.expanded >= limit)
            {
                tracing::warn!(expanded = stats.expanded, "search budget exhausted");
                break SearchOutcome::LimitReached;
            }

            stats.expanded += 1;
            tracing::trace!(
                g = item.g,
                f = item.f,
                position = %state.agent().position,
                food = state.food_left(),
                "expanding"
            );

            for (action, next) in self.successors(maze, &state) {
                stats.generated += 1;
                let g = item.g + 1;
                if best_g.get(&next).is_some_and(|known| *known <= g) {
                    continue;
                }
                let h = heuristic.estimate(&self.rules.view(maze, &next), &next);
                best_g.insert(next.clone(), g);
                nodes.push(Node {
                    state: next,
                    parent: Some((item.node, action)),
                });
                seq += 1;
                frontier.push(PrioritizedItem {
                    f: g.saturating_add(h),
                    g,
                    seq,
                    node: nodes.len() - 1,
                });
            }
            closed.insert(state, item.g);
            stats.max_frontier = stats.max_frontier.max(frontier.len());
        };

        stats.elapsed = started.elapsed();
        match &outcome {
            SearchOutcome::Found(plan) => tracing::debug!(
                cost = plan.cost,
                expanded = stats.expanded,
                generated = stats.generated,
                max_frontier = stats.max_frontier,
                elapsed_ms = stats.elapsed.as_millis() as u64,
                "plan found"
            ),
            other => tracing::debug!(
                outcome = ?other,
                expanded = stats.expanded,
                generated = stats.generated,
                "search ended without a plan"
            ),
        }
        SearchReport { outcome, stats }
    }

    /// Follows parent links back to the root.
    fn reconstruct(nodes: &[Node], mut index: usize) -> Vec<Action> {
        let mut actions = Vec::new();
        while let Some((parent, action)) = nodes.get(index).and_then(|node| node.parent) {
            actions.push(action);
            index = parent;
        }
        actions.reverse();
        actions
    }
}
