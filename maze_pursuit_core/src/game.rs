//! The game session: owns the mutable maze and drives turns.
//!
//! Unlike search, the session rotates the maze itself when the schedule says
//! so and commits eaten walls to it, so the state it holds always lives in
//! the maze's own frame.

use serde::Serialize;

use crate::{
    Position,
    agent::Agent,
    maze::{LayoutError, Maze},
    rules::Rules,
    state::{Action, State},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GameStatus {
    Running,
    Won,
    Lost,
}

/// What a single call to [`Game::apply`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StepOutcome {
    Moved,
    /// The action was illegal; nothing changed.
    Blocked,
    /// The agent stepped onto a corner and a destination must be selected.
    AwaitingTeleport,
    Won,
    Caught,
    /// The session already ended; the action was ignored.
    Finished,
}

#[derive(Debug, Clone)]
pub struct Game {
    maze: Maze,
    rules: Rules,
    state: State,
    status: GameStatus,
}

impl Game {
    /// Starts a session on `maze`, restored to its initial layout.
    pub fn new(mut maze: Maze, rules: Rules) -> Self {
        maze.reset();
        let state = State::initial(&maze);
        Self {
            maze,
            rules,
            state,
            status: GameStatus::Running,
        }
    }

    pub fn from_layout(text: &str, rules: Rules) -> Result<Self, LayoutError> {
        Ok(Self::new(Maze::from_layout(text)?, rules))
    }

    pub fn maze(&self) -> &Maze {
        &self.maze
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn rules(&self) -> &Rules {
        &self.rules
    }

    pub fn status(&self) -> GameStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == GameStatus::Running
    }

    /// Destinations offered for the pending manual teleport, in selection order.
    pub fn pending_destinations(&self) -> Vec<Position> {
        match self.state.agent().teleport_origin {
            Some(origin) => self
                .rules
                .view(&self.maze, &self.state)
                .teleport_destinations(origin),
            None => Vec::new(),
        }
    }

    /// Applies one action and reports what happened.
    pub fn apply(&mut self, action: Action) -> StepOutcome {
        if !self.is_running() {
            return StepOutcome::Finished;
        }

        let mut next = self.rules.successor(&self.maze, &self.state, action);
        if next.step_count() == self.state.step_count() {
            tracing::trace!(%action, "action rejected");
            return StepOutcome::Blocked;
        }

        let view = self.rules.view(&self.maze, &self.state);
        let eaten: Vec<Position> = next
            .opened_walls()
            .difference(self.state.opened_walls())
            .filter_map(|wall| view.to_base(*wall))
            .collect();
        for wall in eaten {
            tracing::debug!(%wall, "wall eaten");
            self.maze.eat_wall(wall);
        }

        if self.rules.is_rotation_due(&self.state, &next) {
            let rows = self.maze.rows();
            self.maze.rotate_right();
            next = self.rules.rotate_state(&next, rows);
            tracing::debug!(
                step = next.step_count(),
                rotations = self.maze.rotations(),
                "maze rotated on schedule"
            );
        }
        self.state = next;

        if self.state.caught() {
            self.status = GameStatus::Lost;
            tracing::info!(step = self.state.step_count(), "agent caught");
            StepOutcome::Caught
        } else if self.state.food().is_empty() && self.state.agent().position == self.maze.exit() {
            self.status = GameStatus::Won;
            tracing::info!(step = self.state.step_count(), "exit reached with every food eaten");
            StepOutcome::Won
        } else if self.state.agent().awaiting_teleport() {
            StepOutcome::AwaitingTeleport
        } else {
            StepOutcome::Moved
        }
    }

    /// Asks `agent` for an action and applies it. `None` when the agent has
    /// nothing to do.
    pub fn tick(&mut self, agent: &mut dyn Agent) -> Option<StepOutcome> {
        if !self.is_running() {
            return Some(StepOutcome::Finished);
        }
        let action = agent.next_action(&self.maze, &self.state)?;
        Some(self.apply(action))
    }

    /// Restores the maze and the starting state.
    pub fn reset(&mut self) {
        self.maze.reset();
        self.state = State::initial(&self.maze);
        self.status = GameStatus::Running;
        tracing::info!("session reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Direction, agent::ManualAgent, rules::TeleportMode};

    const EAST: Action = Action::Move(Direction::East);

    fn still() -> Rules {
        Rules::default().without_rotation()
    }

    #[test]
    fn eating_everything_and_reaching_the_exit_wins() {
        let mut game = Game::from_layout("P.E", still()).unwrap();
        assert_eq!(game.apply(Action::Move(Direction::West)), StepOutcome::Blocked);
        assert_eq!(game.apply(EAST), StepOutcome::Moved);
        assert_eq!(game.apply(EAST), StepOutcome::Won);
        assert_eq!(game.status(), GameStatus::Won);
        assert_eq!(game.apply(Action::Move(Direction::West)), StepOutcome::Finished);
    }

    #[test]
    fn exit_without_food_is_just_a_cell() {
        let mut game = Game::from_layout("PE.", still()).unwrap();
        assert_eq!(game.apply(EAST), StepOutcome::Moved);
        assert_eq!(game.apply(EAST), StepOutcome::Moved);
        assert_eq!(game.apply(Action::Move(Direction::West)), StepOutcome::Won);
    }

    #[test]
    fn catches_end_the_session() {
        let mut game = Game::from_layout("P G\n  E", still()).unwrap();
        assert_eq!(game.apply(EAST), StepOutcome::Moved);
        assert_eq!(game.apply(EAST), StepOutcome::Caught);
        assert_eq!(game.status(), GameStatus::Lost);
    }

    #[test]
    fn eaten_walls_are_committed_to_the_maze() {
        let mut game = Game::from_layout("P0%.E", still()).unwrap();
        let version = game.maze().version();
        game.apply(EAST);
        assert_eq!(game.maze().version(), version);
        game.apply(EAST);
        assert!(!game.maze().is_wall(Position::new(0, 2)));
        assert_ne!(game.maze().version(), version);
    }

    #[test]
    fn scheduled_rotation_turns_maze_and_state_together() {
        let rules = Rules {
            rotation_interval: Some(2),
            ..Rules::default()
        };
        let mut game = Game::from_layout("P  \n .E", rules).unwrap();
        game.apply(EAST);
        game.apply(EAST);
        assert_eq!(game.maze().rotations(), 1);
        assert_eq!((game.maze().rows(), game.maze().cols()), (3, 2));
        assert_eq!(game.state().agent().position, Position::new(2, 1));
        assert_eq!(game.rules().quarter_turns(game.maze(), game.state()), 0);

        game.reset();
        assert_eq!(game.maze().rotations(), 0);
        assert_eq!(game.state().agent().position, Position::new(0, 0));
        assert!(game.is_running());
    }

    #[test]
    fn manual_teleport_offers_destinations() {
        let rules = Rules {
            teleport_mode: TeleportMode::Manual,
            ..still()
        };
        let mut game = Game::from_layout("TP  T\n%%%%%\nT .ET", rules).unwrap();
        let mut agent = ManualAgent::new();
        agent.on_input(Action::Move(Direction::West));
        assert_eq!(game.tick(&mut agent), Some(StepOutcome::AwaitingTeleport));
        assert_eq!(
            game.pending_destinations(),
            vec![Position::new(0, 4), Position::new(2, 0), Position::new(2, 4)]
        );
        assert_eq!(game.apply(Action::SelectDestination(9)), StepOutcome::Blocked);
        assert_eq!(game.apply(Action::SelectDestination(3)), StepOutcome::Moved);
        assert_eq!(game.state().agent().position, Position::new(2, 4));
        assert!(game.pending_destinations().is_empty());
        assert_eq!(game.tick(&mut agent), None);
    }
}
