//! Ground truth oracle for simulation.
//!
//! The Oracle maintains the "God's eye view" of the grid world:
//! - True locations of blocks and agent bodies
//! - Door states
//! - Action resolution (one action per agent per tick)
//! - Observation rendering within each agent's sense radius

use crate::error::SimError;
use crate::world::Layout;
use dropzone_env::{
    Action, AgentId, DoorState, Location, ObjectId, Observation, ObservedBlock, SelfState, VisualSignature,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A block in the simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundTruthBlock {
    pub id: ObjectId,
    pub signature: VisualSignature,
    /// `None` while carried
    pub location: Option<Location>,
    pub carrier: Option<AgentId>,
}

/// An agent's body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentBody {
    pub id: AgentId,
    pub location: Location,
    /// Held blocks, oldest first
    pub carrying: Vec<ObjectId>,
    pub capacity: usize,
}

/// The Oracle - owns ground truth and resolves actions.
pub struct Oracle {
    layout: Layout,

    doors: Vec<DoorState>,

    blocks: Vec<GroundTruthBlock>,

    agents: Vec<AgentBody>,

    sense_radius: u32,

    /// Current tick
    tick: u64,

    next_block: u64,
}

impl Oracle {
    /// Creates an oracle with every door closed.
    pub fn new(layout: Layout, sense_radius: u32) -> Self {
        let doors = layout
            .rooms
            .iter()
            .map(|room| DoorState {
                id: room.door_id.clone(),
                room: room.name.clone(),
                location: room.door_location,
                is_open: false,
            })
            .collect();

        Self {
            layout,
            doors,
            blocks: Vec::new(),
            agents: Vec::new(),
            sense_radius,
            tick: 0,
            next_block: 0,
        }
    }

    /// Places a block on a floor cell.
    pub fn spawn_block(&mut self, signature: VisualSignature, location: Location) -> Result<ObjectId, SimError> {
        if !self.layout.plan.is_floor(&location) {
            return Err(SimError::layout(format!("block placed off the floor at {}", location)));
        }
        let id = ObjectId::new(format!("block_{}", self.next_block));
        self.next_block += 1;
        self.blocks.push(GroundTruthBlock {
            id: id.clone(),
            signature,
            location: Some(location),
            carrier: None,
        });
        Ok(id)
    }

    /// Places an agent body on a floor cell.
    pub fn spawn_agent(&mut self, id: AgentId, location: Location, capacity: usize) -> Result<(), SimError> {
        if self.agent(&id).is_some() {
            return Err(SimError::layout(format!("agent {} spawned twice", id)));
        }
        if !self.layout.plan.is_floor(&location) {
            return Err(SimError::layout(format!("agent {} spawned off the floor at {}", id, location)));
        }
        self.agents.push(AgentBody {
            id,
            location,
            carrying: Vec::new(),
            capacity,
        });
        Ok(())
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// Returns the current tick.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advances the clock by one tick.
    pub fn advance(&mut self) {
        self.tick += 1;
    }

    pub fn agent(&self, id: &AgentId) -> Option<&AgentBody> {
        self.agents.iter().find(|a| &a.id == id)
    }

    pub fn agents(&self) -> &[AgentBody] {
        &self.agents
    }

    pub fn blocks(&self) -> &[GroundTruthBlock] {
        &self.blocks
    }

    pub fn doors(&self) -> &[DoorState] {
        &self.doors
    }

    /// Floor, or a door that is open.
    pub fn is_walkable(&self, location: &Location) -> bool {
        if self.layout.plan.is_floor(location) {
            return true;
        }
        self.doors.iter().any(|d| &d.location == location && d.is_open)
    }

    /// Number of collection sites holding a matching block.
    pub fn satisfied_sites(&self) -> usize {
        self.layout
            .sites
            .iter()
            .filter(|site| {
                self.blocks
                    .iter()
                    .any(|b| b.location == Some(site.location) && b.signature.matches(&site.signature))
            })
            .count()
    }

    pub fn all_sites_satisfied(&self) -> bool {
        self.satisfied_sites() == self.layout.sites.len()
    }

    /// Renders what `id` perceives this tick.
    pub fn observe(&self, id: &AgentId) -> Result<Observation, SimError> {
        let body = self.agent(id).ok_or_else(|| SimError::UnknownAgent(id.to_string()))?;
        let here = body.location;

        let blocks = self
            .blocks
            .iter()
            .filter_map(|b| {
                let location = b.location?;
                (location.manhattan(&here) <= self.sense_radius).then(|| ObservedBlock {
                    id: b.id.clone(),
                    signature: b.signature.clone(),
                    location,
                })
            })
            .collect();

        let carrying = body
            .carrying
            .iter()
            .filter_map(|held| self.blocks.iter().find(|b| &b.id == held))
            .map(|b| ObservedBlock {
                id: b.id.clone(),
                signature: b.signature.clone(),
                location: here,
            })
            .collect();

        Ok(Observation {
            tick: self.tick,
            me: SelfState {
                id: id.clone(),
                location: here,
                carrying,
            },
            blocks,
            doors: self.doors.clone(),
            rooms: self.layout.rooms.clone(),
            collection_sites: self.layout.sites.clone(),
            team: self.agents.iter().map(|a| a.id.clone()).collect(),
            sense_radius: self.sense_radius,
        })
    }

    /// Resolves one action for `id`. A rejected action changes nothing.
    pub fn apply(&mut self, id: &AgentId, action: &Action) -> Result<(), SimError> {
        let index = self
            .agents
            .iter()
            .position(|a| &a.id == id)
            .ok_or_else(|| SimError::UnknownAgent(id.to_string()))?;
        let here = self.agents[index].location;

        match action {
            Action::Idle => Ok(()),

            Action::Move(dir) => {
                let to = here.step(*dir);
                if !self.is_walkable(&to) {
                    return Err(SimError::rejected(id, format!("{} is not walkable", to)));
                }
                self.agents[index].location = to;
                Ok(())
            }

            Action::OpenDoor(door) => {
                let state = self
                    .doors
                    .iter_mut()
                    .find(|d| &d.id == door)
                    .ok_or_else(|| SimError::rejected(id, format!("no door {}", door)))?;
                if state.location.manhattan(&here) > 1 {
                    return Err(SimError::rejected(id, format!("{} is out of reach", door)));
                }
                if !state.is_open {
                    debug!("{} opened {}", id, door);
                }
                state.is_open = true;
                Ok(())
            }

            Action::Grab(block) => {
                let body = &self.agents[index];
                if body.carrying.len() >= body.capacity {
                    return Err(SimError::rejected(id, "hands full"));
                }
                let target = self
                    .blocks
                    .iter_mut()
                    .find(|b| &b.id == block)
                    .ok_or_else(|| SimError::rejected(id, format!("no block {}", block)))?;
                match target.location {
                    Some(location) if location.manhattan(&here) <= 1 => {
                        target.location = None;
                        target.carrier = Some(id.clone());
                        self.agents[index].carrying.push(block.clone());
                        Ok(())
                    }
                    _ => Err(SimError::rejected(id, format!("{} is out of reach", block))),
                }
            }

            Action::Drop(block) => {
                let slot = self.agents[index]
                    .carrying
                    .iter()
                    .position(|held| held == block)
                    .ok_or_else(|| SimError::rejected(id, format!("not carrying {}", block)))?;
                self.agents[index].carrying.remove(slot);
                if let Some(target) = self.blocks.iter_mut().find(|b| &b.id == block) {
                    target.location = Some(here);
                    target.carrier = None;
                }
                Ok(())
            }
        }
    }
}
