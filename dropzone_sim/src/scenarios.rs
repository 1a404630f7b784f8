//! Team scenarios for the grid world.

use crate::error::SimError;
use crate::oracle::Oracle;
use crate::world::{Layout, LayoutBuilder};
use dropzone_core::PolicyKind;
use dropzone_env::{Location, VisualSignature};
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ScenarioId {
    /// DZ-001: three honest agents, two rooms
    Cooperative,

    /// DZ-002: one of every honest variant
    MixedTeam,

    /// DZ-003: two honest agents and a liar
    Deception,

    /// DZ-004: a strong agent re-sorts the drop zone when done
    Resort,
}

/// One agent on a scenario team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    pub name: String,
    pub variant: PolicyKind,
}

impl TeamMember {
    pub fn new(name: impl Into<String>, variant: PolicyKind) -> Self {
        Self {
            name: name.into(),
            variant,
        }
    }
}

/// Everything needed to build a scenario's world.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioPlan {
    pub rooms: usize,
    /// One collection site per signature, top to bottom
    pub goals: Vec<VisualSignature>,
    /// Blocks nobody wants
    pub distractors: Vec<VisualSignature>,
    pub team: Vec<TeamMember>,
}

fn block(shape: u32, colour: &str) -> VisualSignature {
    VisualSignature::new(shape, colour, 0.5)
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Cooperative,
            ScenarioId::MixedTeam,
            ScenarioId::Deception,
            ScenarioId::Resort,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Cooperative => "cooperative",
            ScenarioId::MixedTeam => "mixed_team",
            ScenarioId::Deception => "deception",
            ScenarioId::Resort => "resort",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Cooperative => "3 cooperative agents, 2 rooms, 2 collection sites",
            ScenarioId::MixedTeam => "cooperative + lazy + strong + colorblind, 3 rooms, 3 sites",
            ScenarioId::Deception => "2 cooperative agents and a liar, 3 rooms, 2 sites",
            ScenarioId::Resort => "strong + cooperative, re-sort after completion",
        }
    }

    /// Layout, blocks and team for this scenario.
    pub fn plan(&self) -> ScenarioPlan {
        use PolicyKind::*;
        match self {
            ScenarioId::Cooperative => ScenarioPlan {
                rooms: 2,
                goals: vec![block(0, "red"), block(1, "blue")],
                distractors: vec![block(3, "red"), block(4, "green")],
                team: vec![
                    TeamMember::new("alice", Cooperative),
                    TeamMember::new("bob", Cooperative),
                    TeamMember::new("carol", Cooperative),
                ],
            },
            ScenarioId::MixedTeam => ScenarioPlan {
                rooms: 3,
                goals: vec![block(0, "red"), block(1, "blue"), block(2, "green")],
                distractors: vec![block(3, "blue"), block(4, "red"), block(5, "green")],
                team: vec![
                    TeamMember::new("alice", Cooperative),
                    TeamMember::new("larry", Lazy),
                    TeamMember::new("sam", Strong),
                    TeamMember::new("cole", Colorblind),
                ],
            },
            ScenarioId::Deception => ScenarioPlan {
                rooms: 3,
                goals: vec![block(0, "red"), block(1, "blue")],
                distractors: vec![block(3, "green"), block(4, "blue"), block(5, "red")],
                team: vec![
                    TeamMember::new("alice", Cooperative),
                    TeamMember::new("bob", Cooperative),
                    TeamMember::new("liam", Liar),
                ],
            },
            ScenarioId::Resort => ScenarioPlan {
                rooms: 2,
                goals: vec![block(0, "red"), block(1, "blue")],
                distractors: vec![block(3, "green")],
                team: vec![TeamMember::new("sam", Strong), TeamMember::new("alice", Cooperative)],
            },
        }
    }
}

impl ScenarioPlan {
    pub fn layout(&self) -> Result<Layout, SimError> {
        LayoutBuilder::new(self.rooms).build(&self.goals)
    }

    /// Scatters one block per goal plus the distractors over distinct room
    /// tiles.
    pub fn populate(&self, oracle: &mut Oracle, rng: &mut ChaCha8Rng) -> Result<(), SimError> {
        let mut tiles: Vec<Location> = oracle
            .layout()
            .rooms
            .iter()
            .flat_map(|r| r.tiles.iter().copied())
            .collect();
        let wanted = self.goals.len() + self.distractors.len();
        if tiles.len() < wanted {
            return Err(SimError::layout(format!(
                "{} blocks do not fit on {} room tiles",
                wanted,
                tiles.len()
            )));
        }
        tiles.shuffle(rng);

        for (signature, location) in self.goals.iter().chain(self.distractors.iter()).zip(tiles) {
            oracle.spawn_block(signature.clone(), location)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cooperative" | "dz-001" => Ok(ScenarioId::Cooperative),
            "mixed_team" | "mixed" | "dz-002" => Ok(ScenarioId::MixedTeam),
            "deception" | "liar" | "dz-003" => Ok(ScenarioId::Deception),
            "resort" | "dz-004" => Ok(ScenarioId::Resort),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}
