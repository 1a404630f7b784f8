//! Path-execution collaborator.
//!
//! Path planning is not the agent's concern: the controller hands a list of
//! waypoints to a [`Navigator`] and asks it, once per tick, for the next
//! movement primitive.

use crate::observation::Observation;
use crate::types::{Direction, Location};

/// Result of asking the navigator for the next step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavStep {
    /// Take this step now.
    Move(Direction),
    /// Every waypoint has been reached.
    Arrived,
    /// No step can be made towards the current waypoint this tick.
    Blocked,
}

/// A waypoint-following path executor.
///
/// # Implementations
///
/// - **Simulation**: `dropzone_sim::GridNavigator` (BFS over the oracle map)
/// - **Tests**: scripted navigators that replay a fixed sequence of steps
pub trait Navigator {
    /// Forgets all pending waypoints.
    fn reset_path(&mut self);

    /// Appends waypoints to visit in order.
    fn add_waypoints(&mut self, points: &[Location]);

    /// Returns the next primitive towards the current waypoint.
    ///
    /// Waypoints equal to the agent's current location are consumed before
    /// a step is computed, so `Arrived` is returned on the tick the agent
    /// stands on the last waypoint.
    fn next_step(&mut self, observation: &Observation) -> NavStep;
}

impl<N: Navigator + ?Sized> Navigator for Box<N> {
    fn reset_path(&mut self) {
        (**self).reset_path();
    }

    fn add_waypoints(&mut self, points: &[Location]) {
        (**self).add_waypoints(points);
    }

    fn next_step(&mut self, observation: &Observation) -> NavStep {
        (**self).next_step(observation)
    }
}
