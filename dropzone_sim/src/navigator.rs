//! Breadth-first path executor over a [`FloorPlan`].

use crate::world::FloorPlan;
use dropzone_env::{Direction, Location, NavStep, Navigator, Observation};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

/// Waypoint follower that replans with BFS every tick.
///
/// Doors are planned through whatever their state; a closed door as the next
/// cell yields [`NavStep::Blocked`] so the agent can open it.
pub struct GridNavigator {
    plan: Arc<FloorPlan>,
    waypoints: VecDeque<Location>,
}

impl GridNavigator {
    pub fn new(plan: Arc<FloorPlan>) -> Self {
        Self {
            plan,
            waypoints: VecDeque::new(),
        }
    }

    pub fn waypoints(&self) -> impl Iterator<Item = &Location> {
        self.waypoints.iter()
    }

    /// First cell on a shortest path from `from` to `to`.
    fn first_step(&self, from: Location, to: Location) -> Option<Location> {
        if !self.plan.is_passable(&to) {
            return None;
        }
        let mut parent: HashMap<Location, Location> = HashMap::new();
        let mut queue = VecDeque::from([from]);
        parent.insert(from, from);

        while let Some(cell) = queue.pop_front() {
            if cell == to {
                break;
            }
            for next in cell.neighbours() {
                if self.plan.is_passable(&next) && !parent.contains_key(&next) {
                    parent.insert(next, cell);
                    queue.push_back(next);
                }
            }
        }

        let mut cell = to;
        loop {
            let prev = *parent.get(&cell)?;
            if prev == from {
                return Some(cell);
            }
            cell = prev;
        }
    }
}

impl Navigator for GridNavigator {
    fn reset_path(&mut self) {
        self.waypoints.clear();
    }

    fn add_waypoints(&mut self, points: &[Location]) {
        self.waypoints.extend(points.iter().copied());
    }

    fn next_step(&mut self, observation: &Observation) -> NavStep {
        let here = observation.me.location;
        while self.waypoints.front() == Some(&here) {
            self.waypoints.pop_front();
        }
        let Some(goal) = self.waypoints.front().copied() else {
            return NavStep::Arrived;
        };

        let Some(next) = self.first_step(here, goal) else {
            return NavStep::Blocked;
        };
        if self.plan.door_at(&next).is_some() {
            let open = observation.doors.iter().any(|d| d.location == next && d.is_open);
            if !open {
                return NavStep::Blocked;
            }
        }
        match Direction::between(&here, &next) {
            Some(dir) => NavStep::Move(dir),
            None => NavStep::Blocked,
        }
    }
}
