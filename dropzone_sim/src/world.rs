//! Static grid layout: rooms, doors, hallway and collection sites.
//!
//! ```text
//!  y
//!  0   # # # # # # # # # #
//!  1   # . . . # # . . . #          rooms: interior tiles `.`
//!  2   # . . . # # . . . #
//!  3   # . . . # # . . . #
//!  4   # # D # # # # D # #          doors `D` in the south wall
//!  5   _ _ _ _ _ _ _ _ _ _ _ _      hallway `_`
//!  6   _ _ _ _ _ _ _ _ _ _ s C      collection sites `C`, staging `s`
//!  7   _ _ _ _ _ _ _ _ _ _ s C
//!  8   _ _ _ _ _ _ _ _ _ _ _ _
//! ```

use crate::error::SimError;
use dropzone_env::{CollectionSite, Location, ObjectId, RoomLayout, VisualSignature};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Configuration for a simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimConfig {
    /// Master seed for determinism
    pub seed: u64,

    /// Tick budget
    pub max_ticks: u64,

    /// Manhattan radius within which agents see blocks
    pub sense_radius: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            max_ticks: 2_000,
            sense_radius: 1,
        }
    }
}

/// Walkable cells and door cells of a layout. Door state lives in the oracle.
#[derive(Debug, Clone, Default)]
pub struct FloorPlan {
    floor: BTreeSet<Location>,
    doors: BTreeMap<Location, ObjectId>,
}

impl FloorPlan {
    pub fn is_floor(&self, location: &Location) -> bool {
        self.floor.contains(location)
    }

    pub fn door_at(&self, location: &Location) -> Option<&ObjectId> {
        self.doors.get(location)
    }

    /// Floor or door, whatever the door's state.
    pub fn is_passable(&self, location: &Location) -> bool {
        self.is_floor(location) || self.doors.contains_key(location)
    }

    pub fn floor_len(&self) -> usize {
        self.floor.len()
    }
}

/// A complete scenario map.
#[derive(Debug, Clone)]
pub struct Layout {
    pub rooms: Vec<RoomLayout>,
    pub hallway: Vec<Location>,
    pub sites: Vec<CollectionSite>,
    /// Bottom hallway row, west to east
    pub spawn_points: Vec<Location>,
    pub plan: Arc<FloorPlan>,
}

impl Layout {
    /// The room whose interior holds `location`.
    pub fn room_of(&self, location: &Location) -> Option<&RoomLayout> {
        self.rooms.iter().find(|r| r.tiles.contains(location))
    }
}

/// Builds a row of equally sized rooms above a hallway, with the collection
/// sites stacked on the hallway's east edge.
#[derive(Debug, Clone, Copy)]
pub struct LayoutBuilder {
    room_count: usize,
    room_width: i32,
    room_height: i32,
}

impl LayoutBuilder {
    pub fn new(room_count: usize) -> Self {
        Self {
            room_count,
            room_width: 3,
            room_height: 3,
        }
    }

    /// Sets the interior size of every room.
    pub fn room_size(mut self, width: i32, height: i32) -> Self {
        self.room_width = width;
        self.room_height = height;
        self
    }

    pub fn build(&self, site_signatures: &[VisualSignature]) -> Result<Layout, SimError> {
        if self.room_count == 0 {
            return Err(SimError::layout("at least one room is required"));
        }
        if self.room_width < 1 || self.room_height < 1 {
            return Err(SimError::layout(format!(
                "room interior {}x{} is empty",
                self.room_width, self.room_height
            )));
        }
        if site_signatures.is_empty() {
            return Err(SimError::layout("at least one collection site is required"));
        }

        let (w, h) = (self.room_width, self.room_height);
        let stride = w + 2;
        let mut plan = FloorPlan::default();
        let mut rooms = Vec::with_capacity(self.room_count);

        for i in 0..self.room_count {
            let west = i as i32 * stride;
            let tiles: Vec<Location> = (1..=h)
                .flat_map(|y| (west + 1..=west + w).map(move |x| Location::new(x, y)))
                .collect();
            plan.floor.extend(tiles.iter().copied());

            let door_location = Location::new(west + 1 + w / 2, h + 1);
            let door_id = ObjectId::new(format!("door_{}", i + 1));
            plan.doors.insert(door_location, door_id.clone());
            rooms.push(RoomLayout {
                name: format!("room_{}", i + 1),
                door_id,
                door_location,
                tiles,
            });
        }

        let site_x = self.room_count as i32 * stride + 1;
        let top = h + 2;
        let bottom = top + site_signatures.len() as i32 + 1;
        let hallway: Vec<Location> = (top..=bottom)
            .flat_map(|y| (0..=site_x).map(move |x| Location::new(x, y)))
            .collect();
        plan.floor.extend(hallway.iter().copied());

        let sites = site_signatures
            .iter()
            .enumerate()
            .map(|(k, signature)| CollectionSite {
                id: ObjectId::new(format!("drop_{}", k + 1)),
                signature: signature.clone(),
                location: Location::new(site_x, top + 1 + k as i32),
            })
            .collect();

        let spawn_points = (0..site_x).map(|x| Location::new(x, bottom)).collect();

        Ok(Layout {
            rooms,
            hallway,
            sites,
            spawn_points,
            plan: Arc::new(plan),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig(shape: u32, colour: &str) -> VisualSignature {
        VisualSignature::new(shape, colour, 0.5)
    }

    #[test]
    fn test_layout_geometry() {
        let layout = LayoutBuilder::new(2).build(&[sig(1, "red"), sig(2, "blue")]).unwrap();

        assert_eq!(layout.rooms.len(), 2);
        assert_eq!(layout.rooms[0].door_location, Location::new(2, 4));
        assert_eq!(layout.rooms[1].door_location, Location::new(7, 4));
        assert_eq!(layout.rooms[1].tiles.len(), 9);

        // Door approach cells are hallway floor.
        for room in &layout.rooms {
            assert!(layout.plan.is_floor(&room.door_location.offset(0, 1)));
            assert!(!layout.plan.is_floor(&room.door_location));
            assert!(layout.plan.is_passable(&room.door_location));
        }

        // Sites and their west staging cells are walkable.
        for site in &layout.sites {
            assert!(layout.plan.is_floor(&site.location));
            assert!(layout.plan.is_floor(&site.location.offset(-1, 0)));
        }
        assert_eq!(layout.sites[1].location.y, layout.sites[0].location.y + 1);
    }

    #[test]
    fn test_room_walls_separate_rooms() {
        let layout = LayoutBuilder::new(2).build(&[sig(1, "red")]).unwrap();
        assert!(!layout.plan.is_passable(&Location::new(4, 2)));
        assert!(!layout.plan.is_passable(&Location::new(5, 2)));
        assert_eq!(layout.room_of(&Location::new(6, 1)).map(|r| r.name.as_str()), Some("room_2"));
    }

    #[test]
    fn test_layout_rejects_empty_inputs() {
        assert!(matches!(LayoutBuilder::new(0).build(&[sig(1, "red")]), Err(SimError::Layout(_))));
        assert!(matches!(LayoutBuilder::new(1).build(&[]), Err(SimError::Layout(_))));
        assert!(LayoutBuilder::new(1).room_size(0, 2).build(&[sig(1, "red")]).is_err());
    }
}
