use std::collections::VecDeque;

use crate::{
    heuristics::Heuristic,
    maze::Maze,
    planner::{Planner, PlannerConfig, SearchStats},
    rules::Rules,
    state::{Action, State},
};

/// Trait defining the behavior of an agent.
/// Agents decide which action to take from the current maze and state.
pub trait Agent {
    /// Short name shown by the presentation layer.
    fn label(&self) -> &'static str;

    /// Receives an action from the input collaborator. Agents that decide
    /// on their own ignore it.
    fn on_input(&mut self, _action: Action) {}

    /// The action the agent wants to perform next, if any.
    /// `&mut self` allows the agent to maintain internal state (e.g. a plan).
    fn next_action(&mut self, maze: &Maze, state: &State) -> Option<Action>;
}

/// Replays actions queued from keyboard input, oldest first.
#[derive(Debug, Default)]
pub struct ManualAgent {
    queue: VecDeque<Action>,
}

impl ManualAgent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

impl Agent for ManualAgent {
    fn label(&self) -> &'static str {
        "manual"
    }

    fn on_input(&mut self, action: Action) {
        self.queue.push_back(action);
    }

    fn next_action(&mut self, _maze: &Maze, _state: &State) -> Option<Action> {
        self.queue.pop_front()
    }
}

/// A planning agent that follows an A* plan to eat every food and reach the exit.
///
/// The plan is kept together with the state it expects to observe next.
/// Whenever the observed state differs (the session was reset, or the world
/// did something the plan did not foresee) the agent plans again from
/// scratch.
pub struct PlanningAgent {
    planner: Planner,
    heuristic: Box<dyn Heuristic>,
    current_plan: VecDeque<Action>,
    expected: Option<State>,
    last_stats: Option<SearchStats>,
}

impl PlanningAgent {
    pub fn new(rules: Rules, config: PlannerConfig) -> Self {
        Self::with_heuristic(rules, config, config.heuristic.build())
    }

    pub fn with_heuristic(rules: Rules, config: PlannerConfig, heuristic: Box<dyn Heuristic>) -> Self {
        Self {
            planner: Planner::new(rules, config),
            heuristic,
            current_plan: VecDeque::new(),
            expected: None,
            last_stats: None,
        }
    }

    /// Actions of the current plan that have not been issued yet.
    pub fn remaining_plan(&self) -> impl Iterator<Item = &Action> {
        self.current_plan.iter()
    }

    /// Statistics of the most recent search.
    pub fn last_stats(&self) -> Option<&SearchStats> {
        self.last_stats.as_ref()
    }

    pub fn heuristic_name(&self) -> &'static str {
        self.heuristic.name()
    }

    fn replan(&mut self, maze: &Maze, state: &State) {
        self.current_plan.clear();
        let planner = &self.planner;
        let report = planner.search_with_report(
            maze,
            state,
            |s| planner.rules().is_goal(maze, s),
            self.heuristic.as_mut(),
        );
        self.last_stats = Some(report.stats);
        match report.into_plan() {
            Some(plan) => {
                tracing::debug!(
                    steps = plan.actions.len(),
                    heuristic = self.heuristic.name(),
                    "adopted new plan"
                );
                self.current_plan.extend(plan.actions);
            }
            None => tracing::debug!(
                heuristic = self.heuristic.name(),
                "no plan from the current state"
            ),
        }
    }
}

impl Agent for PlanningAgent {
    fn label(&self) -> &'static str {
        "planner"
    }

    fn next_action(&mut self, maze: &Maze, state: &State) -> Option<Action> {
        // 1. Follow the existing plan while the world matches it
        let on_track = self.expected.as_ref() == Some(state);
        if !on_track || self.current_plan.is_empty() {
            // 2. Otherwise search again from what we observe
            self.replan(maze, state);
        }

        let action = self.current_plan.pop_front();
        self.expected = action.map(|a| self.planner.rules().transition(maze, state, a));
        action
    }
}
