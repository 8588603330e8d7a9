//! The transition function of the game.
//!
//! Every operation here is pure: it reads the maze and a [`State`] and
//! returns a new state. An illegal action yields a state equal to the input
//! with the step counter untouched, so callers detect rejection by equality.

use std::{collections::BTreeSet, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    Cost, Direction, Position, UNREACHABLE,
    maze::{Maze, MazeView},
    oracle::distance_field,
    state::{Action, Adversary, State},
};

pub const DEFAULT_ROTATION_INTERVAL: u32 = 30;
pub const DEFAULT_POWER_RELOAD: u32 = 5;

/// How stepping onto a teleport corner is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TeleportMode {
    /// The agent stops and waits for a destination to be selected.
    Manual,
    /// The destination is chosen immediately by a fixed policy.
    #[default]
    Auto,
}

impl fmt::Display for TeleportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TeleportMode::Manual => f.write_str("manual"),
            TeleportMode::Auto => f.write_str("auto"),
        }
    }
}

impl FromStr for TeleportMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "manual" => Ok(TeleportMode::Manual),
            "auto" => Ok(TeleportMode::Auto),
            other => Err(format!("unknown teleport mode '{other}'")),
        }
    }
}

/// Game rules shared by the session and the planner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Rules {
    pub teleport_mode: TeleportMode,
    /// Steps between scheduled right rotations; `None` disables rotation.
    pub rotation_interval: Option<u32>,
    /// Power granted by eating a bonus.
    pub power_reload: u32,
}

impl Default for Rules {
    fn default() -> Self {
        Self {
            teleport_mode: TeleportMode::Auto,
            rotation_interval: Some(DEFAULT_ROTATION_INTERVAL),
            power_reload: DEFAULT_POWER_RELOAD,
        }
    }
}

impl Rules {
    /// Same rules with scheduled rotation switched off.
    pub fn without_rotation(self) -> Self {
        Self {
            rotation_interval: None,
            ..self
        }
    }

    fn interval(&self) -> Option<u32> {
        self.rotation_interval.filter(|interval| *interval > 0)
    }

    /// Quarter turns between the maze as stored and the frame `state` lives in.
    pub fn quarter_turns(&self, maze: &Maze, state: &State) -> u32 {
        match self.interval() {
            Some(interval) => {
                let scheduled = i64::from(state.step_count / interval);
                (scheduled - i64::from(maze.rotations())).rem_euclid(4) as u32
            }
            None => 0,
        }
    }

    /// The maze as seen from `state`.
    pub fn view<'a>(&self, maze: &'a Maze, state: &State) -> MazeView<'a> {
        maze.view(self.quarter_turns(maze, state))
    }

    /// Position of `step` within a full rotation cycle.
    pub fn schedule_phase(&self, step: u32) -> u32 {
        self.interval()
            .map(|interval| step % interval.saturating_mul(4))
            .unwrap_or(0)
    }

    /// Blocked for the agent: a maze wall that was not eaten on this path.
    fn is_blocked(view: &MazeView<'_>, opened: &BTreeSet<Position>, position: Position) -> bool {
        view.is_wall(position) && !opened.contains(&position)
    }

    /// Applies `action` without the scheduled rotation.
    pub fn successor(&self, maze: &Maze, state: &State, action: Action) -> State {
        let view = self.view(maze, state);
        match action {
            Action::Move(direction) => self.move_agent(&view, state, direction),
            Action::Teleport(to) => self.teleport(&view, state, to),
            Action::SelectDestination(index) => self.select_in_view(&view, state, index),
        }
    }

    /// Resolves a pending manual teleport with the 1-based `index` into the
    /// corner's destinations.
    pub fn select_teleport_destination(&self, maze: &Maze, state: &State, index: usize) -> State {
        let view = self.view(maze, state);
        self.select_in_view(&view, state, index)
    }

    /// Applies `action`, then the scheduled rotation when it falls due.
    ///
    /// Used by search, which never rotates the shared maze: the returned
    /// state lives in the frame its own step count implies.
    pub fn transition(&self, maze: &Maze, state: &State, action: Action) -> State {
        let next = self.successor(maze, state, action);
        if self.is_rotation_due(state, &next) {
            let rows = self.view(maze, state).rows();
            self.rotate_state(&next, rows)
        } else {
            next
        }
    }

    /// True when the step counter moved onto a multiple of the interval.
    pub fn is_rotation_due(&self, before: &State, after: &State) -> bool {
        match self.interval() {
            Some(interval) => {
                after.step_count > before.step_count && after.step_count % interval == 0
            }
            None => false,
        }
    }

    /// Remaps every coordinate of `state` through a right rotation of a
    /// frame with `rows` rows.
    pub fn rotate_state(&self, state: &State, rows: usize) -> State {
        let turn = |p: &Position| p.rotated_right(rows);
        let mut next = state.clone();
        next.agent.position = turn(&state.agent.position);
        next.agent.facing = state.agent.facing.rotated_right();
        next.agent.teleport_origin = state.agent.teleport_origin.as_ref().map(turn);
        // Adversaries keep patrolling along the rows of the new frame.
        for adversary in &mut next.adversaries {
            adversary.position = turn(&adversary.position);
        }
        next.food = state.food.iter().map(turn).collect();
        next.bonus = state.bonus.iter().map(turn).collect();
        next.opened_walls = state.opened_walls.iter().map(turn).collect();
        next
    }

    /// Every action that changes `state`, in generation order.
    pub fn legal_actions(&self, maze: &Maze, state: &State) -> Vec<Action> {
        let view = self.view(maze, state);
        if let Some(origin) = state.agent.teleport_origin {
            return (1..=view.teleport_destinations(origin).len())
                .map(Action::SelectDestination)
                .collect();
        }

        let position = state.agent.position;
        let mut actions: Vec<Action> = Direction::ALL
            .into_iter()
            .filter(|direction| {
                view.offset(position, *direction).is_some_and(|target| {
                    state.agent.power_steps > 0
                        || !Self::is_blocked(&view, &state.opened_walls, target)
                })
            })
            .map(Action::Move)
            .collect();
        if view.is_teleport_corner(position) {
            actions.extend(
                view.teleport_destinations(position)
                    .into_iter()
                    .map(Action::Teleport),
            );
        }
        actions
    }

    /// All food eaten, standing on the exit, not caught.
    pub fn is_goal(&self, maze: &Maze, state: &State) -> bool {
        !state.caught
            && state.food.is_empty()
            && state.agent.position == self.view(maze, state).exit()
    }

    fn move_agent(&self, view: &MazeView<'_>, state: &State, direction: Direction) -> State {
        let Some(target) = view.offset(state.agent.position, direction) else {
            return state.clone();
        };
        if view.is_teleport_corner(target) && !state.agent.awaiting_teleport() {
            match self.teleport_mode {
                TeleportMode::Manual if !view.teleport_destinations(target).is_empty() => {
                    return self.await_destination(state, target, direction);
                }
                TeleportMode::Auto => {
                    if let Some(destination) = self.pick_destination(view, state, target) {
                        return self.land(view, state, destination, direction);
                    }
                }
                TeleportMode::Manual => {}
            }
        }
        self.land(view, state, target, direction)
    }

    fn teleport(&self, view: &MazeView<'_>, state: &State, to: Position) -> State {
        let from = state.agent.position;
        let legal = !state.agent.awaiting_teleport()
            && view.is_teleport_corner(from)
            && to != from
            && view.is_teleport_corner(to);
        if !legal {
            return state.clone();
        }
        self.land(view, state, to, state.agent.facing)
    }

    fn select_in_view(&self, view: &MazeView<'_>, state: &State, index: usize) -> State {
        let Some(origin) = state.agent.teleport_origin else {
            return state.clone();
        };
        let destinations = view.teleport_destinations(origin);
        match index.checked_sub(1).and_then(|i| destinations.get(i)) {
            Some(destination) => self.land(view, state, *destination, state.agent.facing),
            None => state.clone(),
        }
    }

    /// The agent stepped onto a corner in manual mode: it stays where it is
    /// and the step is spent on choosing.
    fn await_destination(&self, state: &State, corner: Position, facing: Direction) -> State {
        let mut next = state.clone();
        next.agent.teleport_origin = Some(corner);
        next.agent.facing = facing;
        self.advance_clock(&mut next);
        next
    }

    /// Destination picked by the autonomous policy, `None` for a lone corner.
    fn pick_destination(
        &self,
        view: &MazeView<'_>,
        state: &State,
        entered: Position,
    ) -> Option<Position> {
        let opened = &state.opened_walls;
        let mut best: Option<(Cost, Position)> = None;
        for destination in view.teleport_destinations(entered) {
            let field = distance_field(
                view.rows(),
                view.cols(),
                |p| Self::is_blocked(view, opened, p),
                destination,
            );
            let distance_to = |p: &Position| field.get(*p).copied().unwrap_or(UNREACHABLE);
            let score = if state.food.is_empty() {
                distance_to(&view.exit())
            } else {
                state
                    .food
                    .iter()
                    .map(distance_to)
                    .min()
                    .unwrap_or(UNREACHABLE)
                    .saturating_add(1)
            };
            if best.is_none_or(|(best_score, _)| score < best_score) {
                best = Some((score, destination));
            }
        }
        best.map(|(_, destination)| destination)
    }

    /// Moves the agent onto `target` and lets the world react.
    fn land(
        &self,
        view: &MazeView<'_>,
        state: &State,
        target: Position,
        facing: Direction,
    ) -> State {
        let blocked = Self::is_blocked(view, &state.opened_walls, target);
        if blocked && state.agent.power_steps == 0 {
            return state.clone();
        }

        let mut next = state.clone();
        if blocked {
            next.opened_walls.insert(target);
        }
        next.agent.position = target;
        next.agent.facing = facing;
        next.agent.teleport_origin = None;
        next.agent.power_steps = state.agent.power_steps.saturating_sub(1);
        next.food.remove(&target);
        if next.bonus.remove(&target) {
            next.agent.power_steps = self.power_reload;
        }
        next.adversaries = state
            .adversaries
            .iter()
            .map(|adversary| Self::advance_adversary(view, &next.opened_walls, adversary))
            .collect();
        next.caught = state.caught || Self::is_caught(state, &next);
        self.advance_clock(&mut next);
        next
    }

    /// One horizontal step; a blocked adversary turns around and stays put.
    fn advance_adversary(
        view: &MazeView<'_>,
        opened: &BTreeSet<Position>,
        adversary: &Adversary,
    ) -> Adversary {
        let ahead = view
            .offset(adversary.position, adversary.heading)
            .filter(|p| !Self::is_blocked(view, opened, *p));
        match ahead {
            Some(position) => Adversary {
                position,
                ..adversary.clone()
            },
            None => Adversary {
                heading: adversary.heading.opposite(),
                ..adversary.clone()
            },
        }
    }

    /// Same cell after the step, or agent and adversary swapped cells.
    fn is_caught(before: &State, after: &State) -> bool {
        let agent = after.agent.position;
        after
            .adversaries
            .iter()
            .zip(&before.adversaries)
            .any(|(now, then)| {
                now.position == agent
                    || (then.position == agent && now.position == before.agent.position)
            })
    }

    fn advance_clock(&self, next: &mut State) {
        next.step_count += 1;
        next.schedule_phase = self.schedule_phase(next.step_count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::AgentState;

    const CORNERS: &str = "\
TP  T
%%%%%
T .ET
";

    fn still() -> Rules {
        Rules::default().without_rotation()
    }

    fn run(rules: &Rules, maze: &Maze, mut state: State, actions: &[Action]) -> State {
        for action in actions {
            state = rules.transition(maze, &state, *action);
        }
        state
    }

    #[test]
    fn illegal_moves_leave_the_state_untouched() {
        let maze = Maze::from_layout("P%E").unwrap();
        let rules = still();
        let start = State::initial(&maze);
        for direction in [Direction::North, Direction::West, Direction::East] {
            let next = rules.successor(&maze, &start, Action::Move(direction));
            assert_eq!(next, start);
            assert_eq!(next.step_count(), 0);
        }
    }

    #[test]
    fn wall_eating_costs_one_power_step_and_opens_the_cell() {
        let maze = Maze::from_layout("P0%.E").unwrap();
        let rules = still();
        let east = Action::Move(Direction::East);
        let west = Action::Move(Direction::West);

        let powered = rules.successor(&maze, &State::initial(&maze), east);
        assert_eq!(powered.agent().power_steps, DEFAULT_POWER_RELOAD);
        assert!(powered.bonus().is_empty());

        let ate = rules.successor(&maze, &powered, east);
        assert_eq!(ate.agent().position, Position::new(0, 2));
        assert_eq!(ate.agent().power_steps, DEFAULT_POWER_RELOAD - 1);
        assert!(ate.opened_walls().contains(&Position::new(0, 2)));

        // Burn the remaining power, then walk through the opened cell unpowered.
        let drained = run(&rules, &maze, ate, &[west, east, west, east, west]);
        assert_eq!(drained.agent().power_steps, 0);
        assert_eq!(drained.agent().position, Position::new(0, 1));
        let through = run(&rules, &maze, drained, &[east, east]);
        assert_eq!(through.agent().position, Position::new(0, 3));
        assert_eq!(through.food_left(), 0);
    }

    #[test]
    fn adversaries_reverse_without_moving_when_blocked() {
        let maze = Maze::from_layout("P  G%\n    E").unwrap();
        let rules = still();
        let first = rules.successor(&maze, &State::initial(&maze), Action::Move(Direction::South));
        let ghost = &first.adversaries()[0];
        assert_eq!(ghost.position, Position::new(0, 3));
        assert_eq!(ghost.heading, Direction::West);

        let second = rules.successor(&maze, &first, Action::Move(Direction::East));
        assert_eq!(second.adversaries()[0].position, Position::new(0, 2));
    }

    #[test]
    fn swapping_cells_with_an_adversary_is_a_catch() {
        let maze = Maze::from_layout("P G\n  E").unwrap();
        let rules = still();
        let east = Action::Move(Direction::East);
        let first = rules.successor(&maze, &State::initial(&maze), east);
        assert!(!first.caught());
        let second = rules.successor(&maze, &first, east);
        assert!(second.caught());
        assert!(!rules.is_goal(&maze, &second));
    }

    #[test]
    fn manual_teleport_waits_for_a_selection() {
        let maze = Maze::from_layout(CORNERS).unwrap();
        let rules = Rules {
            teleport_mode: TeleportMode::Manual,
            ..still()
        };
        let waiting = rules.successor(&maze, &State::initial(&maze), Action::Move(Direction::West));
        assert_eq!(waiting.agent().position, Position::new(0, 1));
        assert_eq!(waiting.agent().teleport_origin, Some(Position::new(0, 0)));
        assert_eq!(waiting.step_count(), 1);
        assert_eq!(
            rules.legal_actions(&maze, &waiting),
            vec![
                Action::SelectDestination(1),
                Action::SelectDestination(2),
                Action::SelectDestination(3)
            ]
        );

        for bad in [0, 4] {
            assert_eq!(rules.select_teleport_destination(&maze, &waiting, bad), waiting);
        }
        let landed = rules.select_teleport_destination(&maze, &waiting, 2);
        assert_eq!(landed.agent().position, Position::new(2, 0));
        assert!(!landed.agent().awaiting_teleport());
        assert_eq!(landed.step_count(), 2);
    }

    #[test]
    fn manual_move_while_waiting_cancels_the_choice() {
        let maze = Maze::from_layout(CORNERS).unwrap();
        let rules = Rules {
            teleport_mode: TeleportMode::Manual,
            ..still()
        };
        let waiting = rules.successor(&maze, &State::initial(&maze), Action::Move(Direction::West));
        let walked = rules.successor(&maze, &waiting, Action::Move(Direction::East));
        assert_eq!(walked.agent().position, Position::new(0, 2));
        assert!(!walked.agent().awaiting_teleport());
    }

    #[test]
    fn auto_teleport_heads_for_the_nearest_food_then_the_exit() {
        let maze = Maze::from_layout(CORNERS).unwrap();
        let rules = still();
        let west = Action::Move(Direction::West);

        let jumped = rules.successor(&maze, &State::initial(&maze), west);
        assert_eq!(jumped.agent().position, Position::new(2, 0), "tie goes to the first corner");
        assert_eq!(jumped.step_count(), 1);

        let no_food = State::new(AgentState::new(Position::new(0, 1)), vec![], [], [], 0, 0);
        let to_exit = rules.successor(&maze, &no_food, west);
        assert_eq!(to_exit.agent().position, Position::new(2, 4));
    }

    #[test]
    fn explicit_teleport_requires_standing_on_a_corner() {
        let maze = Maze::from_layout(CORNERS).unwrap();
        let rules = still();
        let start = State::initial(&maze);
        let target = Position::new(2, 4);
        assert_eq!(rules.successor(&maze, &start, Action::Teleport(target)), start);

        let on_corner = rules.successor(&maze, &start, Action::Move(Direction::West));
        let actions = rules.legal_actions(&maze, &on_corner);
        assert!(actions.contains(&Action::Teleport(Position::new(0, 0))));
        assert!(actions.contains(&Action::Teleport(target)));
        let jumped = rules.successor(&maze, &on_corner, Action::Teleport(target));
        assert_eq!(jumped.agent().position, target);
        assert_eq!(
            rules.successor(&maze, &on_corner, Action::Teleport(Position::new(2, 0))),
            on_corner
        );
    }

    #[test]
    fn scheduled_rotation_remaps_the_state_and_turns_the_view() {
        let maze = Maze::from_layout("P  \n .E").unwrap();
        let rules = Rules {
            rotation_interval: Some(2),
            ..Rules::default()
        };
        let east = Action::Move(Direction::East);
        let one = rules.transition(&maze, &State::initial(&maze), east);
        assert_eq!(rules.quarter_turns(&maze, &one), 0);
        assert_eq!(one.schedule_phase(), 1);

        let two = rules.transition(&maze, &one, east);
        assert_eq!(rules.quarter_turns(&maze, &two), 1);
        assert_eq!(two.agent().position, Position::new(2, 1));
        assert_eq!(two.agent().facing, Direction::South);
        assert!(two.food().contains(&Position::new(1, 0)));
        let view = rules.view(&maze, &two);
        assert_eq!((view.rows(), view.cols()), (3, 2));
        assert_eq!(view.exit(), Position::new(2, 0));
    }

    #[test]
    fn goal_needs_every_food_and_the_exit() {
        let maze = Maze::from_layout("P.E").unwrap();
        let rules = still();
        let east = Action::Move(Direction::East);
        let start = State::initial(&maze);
        assert!(!rules.is_goal(&maze, &start));
        let done = run(&rules, &maze, start, &[east, east]);
        assert!(rules.is_goal(&maze, &done));
    }

    #[test]
    fn teleport_mode_parses_case_insensitively() {
        assert_eq!("Manual".parse::<TeleportMode>(), Ok(TeleportMode::Manual));
        assert_eq!("auto".parse::<TeleportMode>(), Ok(TeleportMode::Auto));
        assert!("sideways".parse::<TeleportMode>().is_err());
    }
}
