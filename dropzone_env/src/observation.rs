//! Per-tick observation snapshot handed to an agent by the environment.
//!
//! The snapshot is refreshed wholesale before every decision call. Blocks are
//! only listed when they are within the agent's sense radius; the room
//! enumeration, doors, collection sites and team roster are always present.

use crate::types::{AgentId, Location, ObjectId, VisualSignature};
use serde::{Deserialize, Serialize};

/// A block as seen this tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedBlock {
    pub id: ObjectId,
    pub signature: VisualSignature,
    pub location: Location,
}

/// A door and its current state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorState {
    pub id: ObjectId,
    pub room: String,
    pub location: Location,
    pub is_open: bool,
}

/// Static description of a room: its door and floor tiles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomLayout {
    pub name: String,
    pub door_id: ObjectId,
    pub door_location: Location,
    pub tiles: Vec<Location>,
}

/// A drop zone requiring a specific kind of block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionSite {
    pub id: ObjectId,
    pub signature: VisualSignature,
    pub location: Location,
}

/// The observing agent's own body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelfState {
    pub id: AgentId,
    pub location: Location,
    /// Blocks currently held, oldest first.
    pub carrying: Vec<ObservedBlock>,
}

impl SelfState {
    /// Returns true if the agent holds at least one block.
    pub fn is_carrying(&self) -> bool {
        !self.carrying.is_empty()
    }
}

/// Everything an agent perceives in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub tick: u64,
    pub me: SelfState,
    /// Blocks lying in the world within the sense radius (not the carried ones).
    pub blocks: Vec<ObservedBlock>,
    pub doors: Vec<DoorState>,
    pub rooms: Vec<RoomLayout>,
    pub collection_sites: Vec<CollectionSite>,
    /// Every agent on the team, including the observer.
    pub team: Vec<AgentId>,
    pub sense_radius: u32,
}

impl Observation {
    /// Returns true if `location` is inside the sense radius this tick.
    pub fn can_see(&self, location: &Location) -> bool {
        self.me.location.manhattan(location) <= self.sense_radius
    }

    /// Looks up a visible block by id.
    pub fn block(&self, id: &ObjectId) -> Option<&ObservedBlock> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    /// Visible blocks lying on `location`.
    pub fn blocks_at<'a>(&'a self, location: &'a Location) -> impl Iterator<Item = &'a ObservedBlock> + 'a {
        self.blocks.iter().filter(move |b| &b.location == location)
    }

    /// Looks up a door by id.
    pub fn door(&self, id: &ObjectId) -> Option<&DoorState> {
        self.doors.iter().find(|d| &d.id == id)
    }

    /// Team members other than the observer.
    pub fn peers(&self) -> impl Iterator<Item = &AgentId> {
        self.team.iter().filter(move |member| **member != self.me.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> Observation {
        Observation {
            tick: 0,
            me: SelfState {
                id: AgentId::from("alice"),
                location: Location::new(2, 2),
                carrying: Vec::new(),
            },
            blocks: vec![ObservedBlock {
                id: ObjectId::from("block_1"),
                signature: VisualSignature::new(1, "red", 0.5),
                location: Location::new(2, 3),
            }],
            doors: Vec::new(),
            rooms: Vec::new(),
            collection_sites: Vec::new(),
            team: vec![AgentId::from("alice"), AgentId::from("bob")],
            sense_radius: 1,
        }
    }

    #[test]
    fn test_can_see_uses_manhattan_radius() {
        let obs = snapshot();
        assert!(obs.can_see(&Location::new(2, 3)));
        assert!(obs.can_see(&Location::new(1, 2)));
        assert!(!obs.can_see(&Location::new(3, 3)));
    }

    #[test]
    fn test_peers_excludes_self() {
        let obs = snapshot();
        let peers: Vec<_> = obs.peers().collect();
        assert_eq!(peers, vec![&AgentId::from("bob")]);
    }

    #[test]
    fn test_blocks_at() {
        let obs = snapshot();
        assert_eq!(obs.blocks_at(&Location::new(2, 3)).count(), 1);
        assert_eq!(obs.blocks_at(&Location::new(2, 2)).count(), 0);
        assert!(obs.block(&ObjectId::from("block_1")).is_some());
    }
}
