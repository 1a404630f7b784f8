//! Primitive actions an agent may return to the environment.

use crate::types::{Direction, ObjectId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Exactly one of these is produced per agent per tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    /// Step to the adjacent tile.
    Move(Direction),
    /// Open the given door.
    OpenDoor(ObjectId),
    /// Pick up the given block.
    Grab(ObjectId),
    /// Put the given carried block down on the current tile.
    Drop(ObjectId),
    /// Do nothing this tick.
    Idle,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Move(dir) => write!(f, "Move{:?}", dir),
            Action::OpenDoor(id) => write!(f, "OpenDoor({})", id),
            Action::Grab(id) => write!(f, "Grab({})", id),
            Action::Drop(id) => write!(f, "Drop({})", id),
            Action::Idle => f.write_str("Idle"),
        }
    }
}
