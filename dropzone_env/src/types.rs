//! Common types shared by every Dropzone crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an agent on the team.
///
/// Agent names double as ledger keys, so they are compared verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    /// Creates an id from any string-like value.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Returns the name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Identifier of a world object (block, door, collection site).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectId(pub String);

impl ObjectId {
    /// Creates an id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A grid cell. `y` grows southwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Location {
    pub x: i32,
    pub y: i32,
}

impl Location {
    /// Creates a new location.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Returns this location shifted by `(dx, dy)`.
    pub const fn offset(&self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }

    /// Manhattan distance between two cells.
    pub fn manhattan(&self, other: &Location) -> u32 {
        self.x.abs_diff(other.x) + self.y.abs_diff(other.y)
    }

    /// The four orthogonal neighbours, in `Direction::ALL` order.
    pub fn neighbours(&self) -> [Location; 4] {
        Direction::ALL.map(|dir| self.step(dir))
    }

    /// The cell one step away in `dir`.
    pub fn step(&self, dir: Direction) -> Location {
        let (dx, dy) = dir.delta();
        self.offset(dx, dy)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Movement primitive direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    North,
    South,
    East,
    West,
}

impl Direction {
    /// Every direction, in a fixed order so that path search is deterministic.
    pub const ALL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    /// Grid delta for one step.
    pub const fn delta(&self) -> (i32, i32) {
        match self {
            Direction::North => (0, -1),
            Direction::South => (0, 1),
            Direction::East => (1, 0),
            Direction::West => (-1, 0),
        }
    }

    /// Direction of a single orthogonal step from `from` to `to`, if any.
    pub fn between(from: &Location, to: &Location) -> Option<Direction> {
        Direction::ALL
            .into_iter()
            .find(|dir| from.step(*dir) == *to)
    }
}

/// Colour attribute of a visual signature.
///
/// `Unknown` is what a colour-blind observer records; it renders as `?` on the
/// wire and acts as a wildcard when signatures are compared with
/// [`VisualSignature::matches`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Colour {
    Known(String),
    Unknown,
}

impl Colour {
    /// Wire placeholder for an unknown colour.
    pub const UNKNOWN_MARK: &'static str = "?";

    /// Creates a known colour.
    pub fn known(name: impl Into<String>) -> Self {
        Colour::Known(name.into())
    }

    /// Returns true for the `?` wildcard.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Colour::Unknown)
    }

    /// Colour equality with `Unknown` matching anything.
    pub fn matches(&self, other: &Colour) -> bool {
        match (self, other) {
            (Colour::Unknown, _) | (_, Colour::Unknown) => true,
            (Colour::Known(a), Colour::Known(b)) => a == b,
        }
    }
}

impl From<String> for Colour {
    fn from(raw: String) -> Self {
        if raw.trim() == Colour::UNKNOWN_MARK {
            Colour::Unknown
        } else {
            Colour::Known(raw)
        }
    }
}

impl From<Colour> for String {
    fn from(colour: Colour) -> Self {
        match colour {
            Colour::Known(name) => name,
            Colour::Unknown => Colour::UNKNOWN_MARK.to_string(),
        }
    }
}

impl fmt::Display for Colour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Colour::Known(name) => f.write_str(name),
            Colour::Unknown => f.write_str(Colour::UNKNOWN_MARK),
        }
    }
}

/// What an object looks like: the key used to pair blocks with collection points.
///
/// Field order is the wire order (`size`, `shape`, `colour`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisualSignature {
    pub size: f64,
    pub shape: u32,
    pub colour: Colour,
}

impl VisualSignature {
    /// Creates a signature; a colour of `?` becomes [`Colour::Unknown`].
    pub fn new(shape: u32, colour: impl Into<String>, size: f64) -> Self {
        Self {
            size,
            shape,
            colour: Colour::from(colour.into()),
        }
    }

    /// "Same kind of object": equal shape and size, colour equal unless
    /// either side is the `?` wildcard.
    pub fn matches(&self, other: &VisualSignature) -> bool {
        self.shape == other.shape && self.size == other.size && self.colour.matches(&other.colour)
    }

    /// Copy of this signature with the colour hidden.
    pub fn masked_colour(&self) -> Self {
        Self {
            colour: Colour::Unknown,
            ..self.clone()
        }
    }
}

impl fmt::Display for VisualSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{size: {}, shape: {}, colour: {}}}",
            self.size, self.shape, self.colour
        )
    }
}
