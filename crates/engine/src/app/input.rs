use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    #[default]
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Grid offset in cells; y grows downward.
    pub const fn offset(self) -> (i32, i32) {
        match self {
            Direction::Up => (0, -1),
            Direction::Down => (0, 1),
            Direction::Left => (-1, 0),
            Direction::Right => (1, 0),
        }
    }

    pub const fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Confirm,
    Menu,
}

impl InputAction {
    pub const fn direction(self) -> Option<Direction> {
        match self {
            InputAction::MoveUp => Some(Direction::Up),
            InputAction::MoveDown => Some(Direction::Down),
            InputAction::MoveLeft => Some(Direction::Left),
            InputAction::MoveRight => Some(Direction::Right),
            InputAction::Confirm | InputAction::Menu => None,
        }
    }
}

/// Held movement keys, most recent press first.
#[derive(Debug, Clone, Default)]
pub(crate) struct HeldDirections {
    stack: Vec<Direction>,
}

impl HeldDirections {
    pub(crate) fn press(&mut self, direction: Direction) {
        if !self.stack.contains(&direction) {
            self.stack.insert(0, direction);
        }
    }

    pub(crate) fn release(&mut self, direction: Direction) {
        self.stack.retain(|held| *held != direction);
    }

    pub(crate) fn current(&self) -> Option<Direction> {
        self.stack.first().copied()
    }

    pub(crate) fn clear(&mut self) {
        self.stack.clear();
    }
}
