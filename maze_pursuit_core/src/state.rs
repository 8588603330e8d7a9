use std::{
    collections::BTreeSet,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

use crate::{Direction, Position, maze::Maze};

/// Represents actions the agent can take. Every action costs one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Move one cell in a cardinal direction.
    Move(Direction),
    /// Jump from the teleport corner the agent stands on to another corner.
    Teleport(Position),
    /// Resolve a pending manual teleport with a 1-based destination index.
    SelectDestination(usize),
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Action::Move(direction) => write!(f, "{direction:?}"),
            Action::Teleport(to) => write!(f, "Teleport{to}"),
            Action::SelectDestination(index) => write!(f, "Select#{index}"),
        }
    }
}

/// Holds the state of the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub position: Position,
    /// Cosmetic; not part of equality.
    pub facing: Direction,
    /// Remaining powered steps; while positive, walls can be eaten.
    pub power_steps: u32,
    /// The corner whose destination choice is pending, in manual mode.
    pub teleport_origin: Option<Position>,
}

impl AgentState {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            facing: Direction::East,
            power_steps: 0,
            teleport_origin: None,
        }
    }

    pub fn awaiting_teleport(&self) -> bool {
        self.teleport_origin.is_some()
    }
}

impl PartialEq for AgentState {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position
            && self.power_steps == other.power_steps
            && self.teleport_origin == other.teleport_origin
    }
}

impl Eq for AgentState {}

impl Hash for AgentState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.position.hash(state);
        self.power_steps.hash(state);
        self.teleport_origin.hash(state);
    }
}

/// An adversary patrolling horizontally.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Adversary {
    pub position: Position,
    /// Either `East` or `West`.
    pub heading: Direction,
    /// Display identity; not part of equality.
    pub identity: usize,
}

impl Adversary {
    pub fn new(position: Position, identity: usize) -> Self {
        Self {
            position,
            heading: Direction::East,
            identity,
        }
    }
}

impl PartialEq for Adversary {
    fn eq(&self, other: &Self) -> bool {
        self.position == other.position && self.heading == other.heading
    }
}

impl Eq for Adversary {}

impl Hash for Adversary {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.position.hash(state);
        self.heading.hash(state);
    }
}

/// An immutable snapshot of the game, used as a search-graph node.
///
/// Equality and hashing cover everything that influences the future of the
/// game: the agent, the adversaries, the remaining food and bonus, the walls
/// opened on this path, whether the agent was caught, and the position
/// within the rotation schedule. The raw step counter is left out; two
/// states that differ only in it behave identically from here on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub(crate) agent: AgentState,
    pub(crate) adversaries: Vec<Adversary>,
    pub(crate) food: BTreeSet<Position>,
    pub(crate) bonus: BTreeSet<Position>,
    pub(crate) opened_walls: BTreeSet<Position>,
    pub(crate) step_count: u32,
    pub(crate) schedule_phase: u32,
    pub(crate) caught: bool,
}

impl State {
    /// Builds a state from its parts, with no walls opened and nobody caught.
    ///
    /// `schedule_phase` must agree with the rules that will drive the state;
    /// see [`crate::rules::Rules::schedule_phase`].
    pub fn new(
        agent: AgentState,
        adversaries: Vec<Adversary>,
        food: impl IntoIterator<Item = Position>,
        bonus: impl IntoIterator<Item = Position>,
        step_count: u32,
        schedule_phase: u32,
    ) -> Self {
        Self {
            agent,
            adversaries,
            food: food.into_iter().collect(),
            bonus: bonus.into_iter().collect(),
            opened_walls: BTreeSet::new(),
            step_count,
            schedule_phase,
            caught: false,
        }
    }

    /// The starting snapshot described by the maze's layout.
    pub fn initial(maze: &Maze) -> Self {
        let adversaries = maze
            .adversary_starts()
            .iter()
            .enumerate()
            .map(|(identity, p)| Adversary::new(*p, identity))
            .collect();
        State::new(
            AgentState::new(maze.agent_start()),
            adversaries,
            maze.initial_food().iter().copied(),
            maze.initial_bonus().iter().copied(),
            0,
            0,
        )
    }

    pub fn agent(&self) -> &AgentState {
        &self.agent
    }

    pub fn adversaries(&self) -> &[Adversary] {
        &self.adversaries
    }

    pub fn food(&self) -> &BTreeSet<Position> {
        &self.food
    }

    pub fn bonus(&self) -> &BTreeSet<Position> {
        &self.bonus
    }

    /// Walls eaten on the way to this state, in this state's frame.
    pub fn opened_walls(&self) -> &BTreeSet<Position> {
        &self.opened_walls
    }

    pub fn step_count(&self) -> u32 {
        self.step_count
    }

    pub fn schedule_phase(&self) -> u32 {
        self.schedule_phase
    }

    pub fn caught(&self) -> bool {
        self.caught
    }

    pub fn food_left(&self) -> usize {
        self.food.len()
    }
}

impl PartialEq for State {
    fn eq(&self, other: &Self) -> bool {
        self.agent == other.agent
            && self.adversaries == other.adversaries
            && self.food == other.food
            && self.bonus == other.bonus
            && self.opened_walls == other.opened_walls
            && self.schedule_phase == other.schedule_phase
            && self.caught == other.caught
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.agent.hash(state);
        self.adversaries.hash(state);
        self.food.hash(state);
        self.bonus.hash(state);
        self.opened_walls.hash(state);
        self.schedule_phase.hash(state);
        self.caught.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use proptest::prelude::*;

    use super::*;

    fn hash_of<T: Hash>(value: &T) -> u64 {
        let mut hasher = DefaultHasher::new();
        value.hash(&mut hasher);
        hasher.finish()
    }

    fn positions() -> impl Strategy<Value = Vec<Position>> {
        prop::collection::vec((0usize..8, 0usize..8), 0..10)
            .prop_map(|cells| cells.into_iter().map(|(r, c)| Position::new(r, c)).collect())
    }

    proptest! {
        #[test]
        fn equal_contents_in_any_order_compare_and_hash_equal(
            food in positions(),
            bonus in positions(),
            row in 0usize..8,
            col in 0usize..8,
        ) {
            let build = |food: Vec<Position>, bonus: Vec<Position>| {
                State::new(
                    AgentState::new(Position::new(row, col)),
                    vec![Adversary::new(Position::new(1, 1), 0)],
                    food,
                    bonus,
                    3,
                    3,
                )
            };
            let a = build(food.clone(), bonus.clone());
            let mut reversed_food = food;
            reversed_food.reverse();
            let mut reversed_bonus = bonus;
            reversed_bonus.reverse();
            let b = build(reversed_food, reversed_bonus);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(hash_of(&a), hash_of(&b));
        }
    }

    #[test]
    fn cosmetic_fields_do_not_affect_equality() {
        let mut agent = AgentState::new(Position::new(0, 0));
        let a = State::new(
            agent.clone(),
            vec![Adversary::new(Position::new(2, 2), 0)],
            [Position::new(1, 1)],
            [],
            4,
            4,
        );
        agent.facing = Direction::North;
        let b = State::new(
            agent,
            vec![Adversary::new(Position::new(2, 2), 7)],
            [Position::new(1, 1)],
            [],
            124,
            4,
        );
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn power_and_phase_distinguish_states() {
        let base = State::new(AgentState::new(Position::new(0, 0)), vec![], [], [], 0, 0);
        let mut powered = base.clone();
        powered.agent.power_steps = 2;
        assert_ne!(base, powered);

        let later = State::new(AgentState::new(Position::new(0, 0)), vec![], [], [], 7, 7);
        assert_ne!(base, later);
    }
}
