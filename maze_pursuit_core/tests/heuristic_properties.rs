use std::collections::{HashMap, VecDeque};

use maze_pursuit_core::{
    Cost, Position, UNREACHABLE,
    heuristics::HeuristicKind,
    maze::Maze,
    oracle::DistanceOracle,
    planner::{Planner, PlannerConfig},
    rules::Rules,
    state::State,
};

const ROOMS: &str = "\
%%%%%%
%P. .%
% %% %
%.  E%
%%%%%%
";
const TELEPORT: &str = include_str!("../../layouts/teleport.txt");
const WALLS: &str = include_str!("../../layouts/walls.txt");
/// Bonus, wall, food and exit in a row; the detour below is far longer.
const SHORTCUT: &str = "P0%.E\n %%% \n     ";

/// Every state reachable from the layout's start, with its successors.
fn state_graph(planner: &Planner, maze: &Maze) -> HashMap<State, Vec<State>> {
    let initial = State::initial(maze);
    let mut graph = HashMap::new();
    let mut queue = VecDeque::from([initial]);
    while let Some(state) = queue.pop_front() {
        if graph.contains_key(&state) {
            continue;
        }
        let successors: Vec<State> = planner
            .successors(maze, &state)
            .into_iter()
            .map(|(_, next)| next)
            .collect();
        queue.extend(successors.iter().cloned());
        graph.insert(state, successors);
    }
    graph
}

/// Exact cost-to-go of every state in `graph`, by breadth-first search
/// backwards from the goals. States that cannot finish are left out.
fn costs_to_go(
    planner: &Planner,
    maze: &Maze,
    graph: &HashMap<State, Vec<State>>,
) -> HashMap<State, Cost> {
    let mut predecessors: HashMap<&State, Vec<&State>> = HashMap::new();
    for (state, successors) in graph {
        for next in successors {
            predecessors.entry(next).or_default().push(state);
        }
    }
    let mut costs: HashMap<State, Cost> = HashMap::new();
    let mut queue = VecDeque::new();
    for state in graph.keys().filter(|s| planner.rules().is_goal(maze, s)) {
        costs.insert(state.clone(), 0);
        queue.push_back(state);
    }
    while let Some(state) = queue.pop_front() {
        let cost = costs[state] + 1;
        for previous in predecessors.get(state).into_iter().flatten() {
            if !costs.contains_key(*previous) {
                costs.insert((*previous).clone(), cost);
                queue.push_back(*previous);
            }
        }
    }
    costs
}

fn planner() -> Planner {
    Planner::new(Rules::default().without_rotation(), PlannerConfig::default())
}

fn check_admissible(layout: &str, kinds: &[HeuristicKind]) {
    let maze = Maze::from_layout(layout).unwrap();
    let planner = planner();
    let graph = state_graph(&planner, &maze);
    assert!(graph.len() > 10, "fixture should have a real state space");
    let costs = costs_to_go(&planner, &maze, &graph);
    for kind in kinds {
        let mut heuristic = kind.build();
        for state in graph.keys() {
            let view = planner.rules().view(&maze, state);
            let estimate = heuristic.estimate(&view, state);
            let actual = costs.get(state).copied().unwrap_or(UNREACHABLE);
            assert!(
                estimate <= actual,
                "{kind} overestimates at {} (power {}): {estimate} > {actual}",
                state.agent().position,
                state.agent().power_steps
            );
            if planner.rules().is_goal(&maze, state) {
                assert_eq!(estimate, 0, "{kind} is positive on a goal");
            }
        }
    }
}

fn admissible_kinds() -> Vec<HeuristicKind> {
    HeuristicKind::ALL
        .into_iter()
        .filter(|k| k.is_admissible())
        .collect()
}

#[test]
fn admissible_on_plain_rooms() {
    check_admissible(ROOMS, &admissible_kinds());
}

#[test]
fn admissible_while_walls_can_be_eaten() {
    check_admissible(WALLS, &admissible_kinds());
    check_admissible(SHORTCUT, &admissible_kinds());
}

#[test]
fn teleport_aware_estimators_are_admissible_with_corners() {
    check_admissible(
        TELEPORT,
        &[
            HeuristicKind::TeleportAware,
            HeuristicKind::SpanningTree,
            HeuristicKind::FarthestFoodAndExit,
        ],
    );
}

#[test]
fn distance_based_estimators_are_consistent() {
    let planner = planner();
    for layout in [ROOMS, WALLS, SHORTCUT] {
        let maze = Maze::from_layout(layout).unwrap();
        let graph = state_graph(&planner, &maze);
        for kind in [
            HeuristicKind::MazeDistance,
            HeuristicKind::TeleportAware,
            HeuristicKind::FarthestFoodAndExit,
        ] {
            let mut heuristic = kind.build();
            let mut estimate = |state: &State| {
                let view = planner.rules().view(&maze, state);
                heuristic.estimate(&view, state)
            };
            for (state, successors) in &graph {
                let here = estimate(state);
                for next in successors {
                    let there = estimate(next);
                    assert!(
                        here <= there.saturating_add(1),
                        "{kind} is inconsistent at {}: {here} > 1 + {there}",
                        state.agent().position
                    );
                }
            }
        }
    }
}

#[test]
fn shaped_estimate_floors_at_zero_and_is_flagged() {
    assert!(!HeuristicKind::ShapedMazeDistance.is_admissible());
    let maze = Maze::from_layout("P0 G .\n  0  E").unwrap();
    let mut heuristic = HeuristicKind::ShapedMazeDistance.build();
    let state = State::initial(&maze);
    // Walk 5 plus danger 2, minus 5 and 3 for the two bonuses.
    assert_eq!(heuristic.estimate(&maze.view(0), &state), 0);
}

#[test]
fn oracle_cache_follows_wall_eating() {
    let mut maze = Maze::from_layout("P%E").unwrap();
    let mut oracle = DistanceOracle::new();
    let from = Position::new(0, 0);
    let to = Position::new(0, 2);
    assert_eq!(oracle.distance(&maze.view(0), from, to), UNREACHABLE);
    assert!(!oracle.is_empty());

    maze.eat_wall(Position::new(0, 1));
    assert_eq!(oracle.distance(&maze.view(0), from, to), 2);
    assert_eq!(oracle.misses(), 2);
    assert_eq!(oracle.hits(), 0);

    oracle.clear();
    assert!(oracle.is_empty());
}
