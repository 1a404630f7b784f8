//! The World Knowledge Store - one agent's belief about rooms, doors,
//! collection points and blocks.
//!
//! Built incrementally from partial observations. Peer reports only enter
//! through [`WorldKnowledge::report_block`] and
//! [`WorldKnowledge::note_peer_delivery`], and never set a collection point's
//! `delivered_confirmed` flag: that flag follows direct observation only.

use dropzone_env::{
    AgentId, CollectionSite, DoorState, Location, ObjectId, Observation, ObservedBlock, RoomLayout,
    VisualSignature,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Which visual attributes this agent can perceive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AttributeMask {
    /// Full perception
    #[default]
    None,
    /// Colour is always read as `?`
    Colour,
}

impl AttributeMask {
    /// The signature as this agent perceives it.
    pub fn apply(&self, signature: &VisualSignature) -> VisualSignature {
        match self {
            AttributeMask::None => signature.clone(),
            AttributeMask::Colour => signature.masked_colour(),
        }
    }
}

/// Where a block record came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provenance {
    Observed,
    Reported(AgentId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Room {
    pub name: String,
    pub door_id: ObjectId,
    pub door_location: Location,
    pub door_open: bool,
    /// Floor tiles ("squares")
    pub tiles: Vec<Location>,
    pub explored: bool,
}

impl Room {
    pub fn door(&self) -> Door {
        Door {
            id: self.door_id.clone(),
            room: self.name.clone(),
            location: self.door_location,
            is_open: self.door_open,
        }
    }

    pub fn contains(&self, location: &Location) -> bool {
        self.tiles.contains(location)
    }
}

/// Read-only view of a room's door.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Door {
    pub id: ObjectId,
    pub room: String,
    pub location: Location,
    pub is_open: bool,
}

/// A drop zone and what this agent knows about its fulfilment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionPoint {
    pub id: ObjectId,
    pub signature: VisualSignature,
    pub location: Location,
    /// Set only by direct observation of a matching block on `location`
    pub delivered_confirmed: bool,
    pub delivered_by_me: bool,
    /// Carried blocks this agent intends to drop here, in order
    pub pending_drops: Vec<ObjectId>,
    /// A trusted peer said it delivered here; cleared when seen empty
    pub claimed_by: Option<AgentId>,
}

impl CollectionPoint {
    /// Returns true if a block with `signature` fulfils this point.
    pub fn accepts(&self, signature: &VisualSignature) -> bool {
        self.signature.matches(signature)
    }

    /// Still needs a delivery that nobody (including us) has in hand.
    pub fn is_open(&self) -> bool {
        !self.delivered_confirmed && self.pending_drops.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnownBlock {
    pub id: ObjectId,
    pub signature: VisualSignature,
    /// Last known location
    pub location: Location,
    pub room: Option<String>,
    pub is_goal: bool,
    pub delivered: bool,
    pub delivered_by_me: bool,
    pub delivered_confirmed: bool,
    pub carried_by_me: bool,
    pub provenance: Provenance,
    /// A FOUND report has gone out for this block
    pub announced: bool,
    /// Discovery order
    pub seq: u64,
}

/// Result of [`WorldKnowledge::observe_block`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserveOutcome {
    New { is_goal: bool },
    Updated,
    Unchanged,
}

/// Result of checking a peer's block claim against local knowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimCheck {
    /// A locally observed block at that location has the claimed shape
    Confirmed,
    /// Locally observed blocks are there, none with the claimed shape
    Contradicted,
    /// Nothing locally known at that location
    Unknown,
}

/// One agent's world model.
#[derive(Debug, Clone, Default)]
pub struct WorldKnowledge {
    mask: AttributeMask,
    rooms: Vec<Room>,
    collection_points: Vec<CollectionPoint>,
    /// Insertion (discovery) order
    blocks: Vec<KnownBlock>,
    next_seq: u64,
}

impl WorldKnowledge {
    pub fn new(mask: AttributeMask) -> Self {
        Self {
            mask,
            ..Self::default()
        }
    }

    pub fn mask(&self) -> AttributeMask {
        self.mask
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    /// Registers a room. Returns false if the name is already known.
    pub fn register_room(&mut self, layout: &RoomLayout, door_open: bool) -> bool {
        if self.room(&layout.name).is_some() {
            return false;
        }
        self.rooms.push(Room {
            name: layout.name.clone(),
            door_id: layout.door_id.clone(),
            door_location: layout.door_location,
            door_open,
            tiles: layout.tiles.clone(),
            explored: false,
        });
        true
    }

    /// Registers a collection point. Returns false if the id is already known.
    pub fn register_collection_point(&mut self, site: &CollectionSite) -> bool {
        if self.collection_point(&site.id).is_some() {
            return false;
        }
        self.collection_points.push(CollectionPoint {
            id: site.id.clone(),
            signature: self.mask.apply(&site.signature),
            location: site.location,
            delivered_confirmed: false,
            delivered_by_me: false,
            pending_drops: Vec::new(),
            claimed_by: None,
        });
        true
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn rooms(&self) -> &[Room] {
        &self.rooms
    }

    pub fn room(&self, name: &str) -> Option<&Room> {
        self.rooms.iter().find(|r| r.name == name)
    }

    pub fn collection_points(&self) -> &[CollectionPoint] {
        &self.collection_points
    }

    pub fn collection_point(&self, id: &ObjectId) -> Option<&CollectionPoint> {
        self.collection_points.iter().find(|cp| &cp.id == id)
    }

    pub fn blocks(&self) -> &[KnownBlock] {
        &self.blocks
    }

    pub fn block(&self, id: &ObjectId) -> Option<&KnownBlock> {
        self.blocks.iter().find(|b| &b.id == id)
    }

    pub fn unexplored_rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.iter().filter(|r| !r.explored)
    }

    pub fn has_unexplored_rooms(&self) -> bool {
        self.unexplored_rooms().next().is_some()
    }

    pub fn room_by_door_location(&self, location: &Location) -> Option<&Room> {
        self.rooms.iter().find(|r| &r.door_location == location)
    }

    /// The room whose floor holds `location`.
    pub fn room_containing(&self, location: &Location) -> Option<&Room> {
        self.rooms.iter().find(|r| r.contains(location))
    }

    /// Returns true if some collection point wants this kind of block.
    pub fn is_goal_signature(&self, signature: &VisualSignature) -> bool {
        self.collection_points.iter().any(|cp| cp.accepts(signature))
    }

    pub fn all_confirmed(&self) -> bool {
        self.collection_points.iter().all(|cp| cp.delivered_confirmed)
    }

    /// The collection point currently being worked on: the first open one,
    /// preferring points no trusted peer has claimed.
    pub fn focus_point(&self) -> Option<&CollectionPoint> {
        self.collection_points
            .iter()
            .filter(|cp| cp.is_open())
            .min_by_key(|cp| cp.claimed_by.is_some())
    }

    /// Goal blocks for the focus point, in discovery order.
    pub fn pending_goals(&self) -> Vec<&KnownBlock> {
        let Some(point) = self.focus_point() else {
            return Vec::new();
        };
        self.blocks
            .iter()
            .filter(|b| b.is_goal && !b.delivered && !b.carried_by_me && point.accepts(&b.signature))
            .collect()
    }

    /// Checks a peer's claim that a block with `signature` lies at `location`.
    ///
    /// Only blocks this agent observed itself count; shapes are compared.
    pub fn validate_claim(&self, location: &Location, signature: &VisualSignature) -> ClaimCheck {
        let mut local = self
            .blocks
            .iter()
            .filter(|b| &b.location == location && !b.carried_by_me && b.provenance == Provenance::Observed)
            .peekable();
        if local.peek().is_none() {
            return ClaimCheck::Unknown;
        }
        if local.any(|b| b.signature.shape == signature.shape) {
            ClaimCheck::Confirmed
        } else {
            ClaimCheck::Contradicted
        }
    }

    // ------------------------------------------------------------------
    // Observation
    // ------------------------------------------------------------------

    /// Applies one tick's snapshot: doors, visible blocks, own inventory and
    /// collection-point confirmations.
    ///
    /// Returns the ids of goal blocks seen for the first time.
    pub fn refresh(&mut self, observation: &Observation) -> Vec<ObjectId> {
        self.refresh_doors(&observation.doors);

        let mut new_goals = Vec::new();
        for block in &observation.blocks {
            if let ObserveOutcome::New { is_goal: true } = self.observe_block(block) {
                new_goals.push(block.id.clone());
            }
        }

        self.note_carried(&observation.me.carrying);
        self.refresh_collection_points(observation);
        new_goals
    }

    pub fn refresh_doors(&mut self, doors: &[DoorState]) {
        for door in doors {
            if let Some(room) = self.rooms.iter_mut().find(|r| r.door_id == door.id) {
                room.door_open = door.is_open;
            }
        }
    }

    /// Idempotent upsert of a directly observed block.
    pub fn observe_block(&mut self, block: &ObservedBlock) -> ObserveOutcome {
        let signature = self.mask.apply(&block.signature);
        let room = self.room_containing(&block.location).map(|r| r.name.clone());
        let is_goal = self.is_goal_signature(&signature);
        let delivered = self.mark_point_if_delivered(&block.location, &signature);

        if let Some(known) = self.blocks.iter_mut().find(|b| b.id == block.id) {
            let changed = known.signature != signature
                || known.location != block.location
                || known.provenance != Provenance::Observed
                || known.delivered != delivered
                || known.carried_by_me;
            if !changed {
                return ObserveOutcome::Unchanged;
            }
            known.signature = signature;
            known.location = block.location;
            known.room = room;
            known.is_goal = is_goal;
            known.delivered = delivered;
            known.delivered_confirmed = delivered;
            known.carried_by_me = false;
            known.provenance = Provenance::Observed;
            return ObserveOutcome::Updated;
        }

        // A direct sighting supersedes whatever peers told us about the cell.
        self.blocks.retain(|b| {
            !(matches!(b.provenance, Provenance::Reported(_))
                && b.location == block.location
                && b.signature.matches(&signature))
        });

        debug!("Discovered {} {} at {}", block.id, signature, block.location);
        self.blocks.push(KnownBlock {
            id: block.id.clone(),
            signature,
            location: block.location,
            room,
            is_goal,
            delivered,
            delivered_by_me: false,
            delivered_confirmed: delivered,
            carried_by_me: false,
            provenance: Provenance::Observed,
            announced: delivered,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        ObserveOutcome::New { is_goal }
    }

    /// Confirms the collection point at `location` if `signature` fulfils it.
    fn mark_point_if_delivered(&mut self, location: &Location, signature: &VisualSignature) -> bool {
        match self
            .collection_points
            .iter_mut()
            .find(|cp| &cp.location == location && cp.accepts(signature))
        {
            Some(point) => {
                if !point.delivered_confirmed {
                    info!("Collection point {} confirmed", point.id);
                }
                point.delivered_confirmed = true;
                true
            }
            None => false,
        }
    }

    /// Tracks own inventory. Blocks no longer carried keep their last
    /// location until they are seen again.
    pub fn note_carried(&mut self, carrying: &[ObservedBlock]) {
        for block in self.blocks.iter_mut() {
            block.carried_by_me = false;
        }
        for held in carrying {
            let signature = self.mask.apply(&held.signature);
            let is_goal = self.is_goal_signature(&signature);
            match self.blocks.iter_mut().find(|b| b.id == held.id) {
                Some(known) => {
                    known.carried_by_me = true;
                    known.location = held.location;
                    known.room = None;
                    known.delivered = false;
                    known.delivered_confirmed = false;
                }
                None => {
                    self.blocks.push(KnownBlock {
                        id: held.id.clone(),
                        signature,
                        location: held.location,
                        room: None,
                        is_goal,
                        delivered: false,
                        delivered_by_me: false,
                        delivered_confirmed: false,
                        carried_by_me: true,
                        provenance: Provenance::Observed,
                        announced: true,
                        seq: self.next_seq,
                    });
                    self.next_seq += 1;
                }
            }
        }
    }

    /// Re-checks every visible collection point.
    ///
    /// A confirmation is only withdrawn when the point's own cell is seen
    /// without a matching block.
    pub fn refresh_collection_points(&mut self, observation: &Observation) {
        let mask = self.mask;
        for point in self.collection_points.iter_mut() {
            if !observation.can_see(&point.location) {
                continue;
            }
            let holds = observation
                .blocks_at(&point.location)
                .any(|b| point.accepts(&mask.apply(&b.signature)));
            if holds {
                if !point.delivered_confirmed {
                    info!("Collection point {} confirmed", point.id);
                }
                point.delivered_confirmed = true;
            } else {
                if point.delivered_confirmed {
                    info!("Collection point {} no longer holds its block", point.id);
                }
                point.delivered_confirmed = false;
                point.claimed_by = None;
            }
        }
    }

    /// Discards a block (it vanished from its last known cell).
    pub fn forget_block(&mut self, id: &ObjectId) -> Option<KnownBlock> {
        let index = self.blocks.iter().position(|b| &b.id == id)?;
        for point in self.collection_points.iter_mut() {
            point.pending_drops.retain(|pending| pending != id);
        }
        Some(self.blocks.remove(index))
    }

    /// Goal blocks in `room` that have not been announced yet; marks them
    /// announced.
    pub fn take_unannounced_goals(&mut self, room: &str) -> Vec<KnownBlock> {
        let mut fresh = Vec::new();
        for block in self.blocks.iter_mut() {
            if block.is_goal
                && !block.announced
                && !block.delivered
                && !block.carried_by_me
                && block.provenance == Provenance::Observed
                && block.room.as_deref() == Some(room)
            {
                block.announced = true;
                fresh.push(block.clone());
            }
        }
        fresh
    }

    // ------------------------------------------------------------------
    // Exploration
    // ------------------------------------------------------------------

    pub fn mark_explored(&mut self, name: &str) -> bool {
        match self.rooms.iter_mut().find(|r| r.name == name) {
            Some(room) => {
                room.explored = true;
                true
            }
            None => false,
        }
    }

    pub fn reset_exploration(&mut self) {
        for room in self.rooms.iter_mut() {
            room.explored = false;
        }
    }

    // ------------------------------------------------------------------
    // Delivery bookkeeping
    // ------------------------------------------------------------------

    /// Reserves a collection point for a carried block.
    ///
    /// Returns the point already holding the reservation, or the first open
    /// point accepting the block.
    pub fn assign_dropoff(&mut self, block: &ObjectId, signature: &VisualSignature) -> Option<ObjectId> {
        if let Some(point) = self
            .collection_points
            .iter()
            .find(|cp| cp.pending_drops.contains(block))
        {
            return Some(point.id.clone());
        }
        let point = self
            .collection_points
            .iter_mut()
            .find(|cp| cp.is_open() && cp.accepts(signature))?;
        point.pending_drops.push(block.clone());
        Some(point.id.clone())
    }

    /// Records that this agent dropped `block` at its reserved point.
    pub fn complete_drop(&mut self, block: &ObjectId) -> Option<ObjectId> {
        let point = self
            .collection_points
            .iter_mut()
            .find(|cp| cp.pending_drops.contains(block))?;
        point.pending_drops.retain(|pending| pending != block);
        point.delivered_by_me = true;
        let point_id = point.id.clone();
        if let Some(known) = self.blocks.iter_mut().find(|b| &b.id == block) {
            known.delivered_by_me = true;
        }
        Some(point_id)
    }

    // ------------------------------------------------------------------
    // Peer claims (already trust-gated by the caller)
    // ------------------------------------------------------------------

    /// Stores a trusted peer's FOUND claim if it names a goal where nothing
    /// is known yet.
    pub fn report_block(&mut self, peer: &AgentId, signature: &VisualSignature, location: &Location) -> bool {
        let signature = self.mask.apply(signature);
        if !self.is_goal_signature(&signature) {
            return false;
        }
        if self.blocks.iter().any(|b| &b.location == location && !b.carried_by_me) {
            return false;
        }
        if self.collection_points.iter().any(|cp| &cp.location == location) {
            return false;
        }
        let room = self.room_containing(location).map(|r| r.name.clone());
        debug!("Stored {}'s report of {} at {}", peer, signature, location);
        self.blocks.push(KnownBlock {
            id: ObjectId::new(format!("reported:{}@{},{}", peer, location.x, location.y)),
            signature,
            location: *location,
            room,
            is_goal: true,
            delivered: false,
            delivered_by_me: false,
            delivered_confirmed: false,
            carried_by_me: false,
            provenance: Provenance::Reported(peer.clone()),
            announced: true,
            seq: self.next_seq,
        });
        self.next_seq += 1;
        true
    }

    /// Notes a trusted peer's delivery claim. Never confirms the point.
    pub fn note_peer_delivery(&mut self, peer: &AgentId, signature: &VisualSignature, location: &Location) -> bool {
        let signature = self.mask.apply(signature);
        match self
            .collection_points
            .iter_mut()
            .find(|cp| &cp.location == location && cp.accepts(&signature) && !cp.delivered_confirmed)
        {
            Some(point) => {
                point.claimed_by = Some(peer.clone());
                true
            }
            None => false,
        }
    }
}
