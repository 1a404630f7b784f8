//! The Task-Phase Controller - the per-tick decision function.
//!
//! One [`Phase`] is active at a time and persists between ticks. Within a
//! tick the controller keeps transitioning until a handler yields an action;
//! every handler either yields or moves to a *different* phase, and the total
//! number of in-tick transitions is capped (the cap trips to a no-op).
//!
//! ```text
//! SETUP → PLAN_EXPLORE ⇄ FOLLOW_EXPLORE → OPEN_DOOR → PLAN_ROOM_SCAN → SCAN_ROOM ─┐
//!              ▲                                                                  │
//!              └──────────────────────────────────────────────────────────────────┘
//! PLAN_GRAB → FOLLOW_GRAB → GRAB → PLAN_DROPOFF → FOLLOW_DROPOFF → PLAN_VERIFY → FOLLOW_VERIFY
//!                                                                  │
//!                          PLAN_CLEANUP → CLEANUP → DONE ◄─────────┘ (all confirmed)
//! ```

use crate::codec::Event;
use crate::policy::{AgentPolicy, RoomChoice};
use crate::trust::TrustEngine;
use crate::world::{KnownBlock, Provenance, WorldKnowledge};
use dropzone_env::{Action, Location, NavStep, Navigator, ObjectId, Observation, VisualSignature};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, info, warn};

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Setup,
    PlanExplore,
    FollowExplore,
    OpenDoor,
    PlanRoomScan,
    ScanRoom,
    PlanGrab,
    FollowGrab,
    Grab,
    PlanDropoff,
    FollowDropoff,
    PlanVerify,
    FollowVerify,
    PlanCleanup,
    Cleanup,
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// What a phase handler decided.
enum Step {
    /// Continue in another phase within this tick.
    Goto(Phase),
    /// Return this action; resume in the given phase next tick.
    Yield(Action, Phase),
}

/// The block PLAN_GRAB settled on.
#[derive(Debug, Clone, PartialEq)]
struct GrabTarget {
    id: ObjectId,
    signature: VisualSignature,
    location: Location,
}

/// The carried block FOLLOW_DROPOFF is delivering.
#[derive(Debug, Clone, PartialEq)]
struct DropTarget {
    block: ObjectId,
    signature: VisualSignature,
    point: ObjectId,
}

#[derive(Debug, Clone, PartialEq)]
enum CleanupStep {
    Walk(Location),
    Lift { at: Location, signature: VisualSignature },
    Place,
}

/// Everything a decision may read or touch during one tick.
pub struct Decision<'a> {
    pub observation: &'a Observation,
    pub world: &'a mut WorldKnowledge,
    pub trust: &'a TrustEngine,
    pub policy: &'a mut dyn AgentPolicy,
    pub navigator: &'a mut dyn Navigator,
    /// Reports produced this tick, in order
    pub reports: &'a mut Vec<Event>,
}

/// Controller tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControllerConfig {
    pub door_approach: (i32, i32),
    pub transition_cap: usize,
    pub rescan_when_exhausted: bool,
}

/// Persistent per-agent phase machine.
pub struct TaskController {
    phase: Phase,
    config: ControllerConfig,
    rng: StdRng,
    target_room: Option<String>,
    abandoned_room: Option<String>,
    scan_ticks: u32,
    grab_target: Option<GrabTarget>,
    drop_target: Option<DropTarget>,
    cleanup: VecDeque<CleanupStep>,
    cleanup_walking: bool,
    cleaned: bool,
}

impl TaskController {
    pub fn new(config: ControllerConfig, seed: u64) -> Self {
        Self {
            phase: Phase::Setup,
            config,
            rng: StdRng::seed_from_u64(seed),
            target_room: None,
            abandoned_room: None,
            scan_ticks: 0,
            grab_target: None,
            drop_target: None,
            cleanup: VecDeque::new(),
            cleanup_walking: false,
            cleaned: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The room currently being scanned, if any.
    pub fn searching_room(&self) -> Option<&str> {
        match self.phase {
            Phase::ScanRoom => self.target_room.as_deref(),
            _ => None,
        }
    }

    /// Runs the phase machine until it yields exactly one action.
    pub fn decide(&mut self, cx: &mut Decision<'_>) -> Action {
        for _ in 0..self.config.transition_cap {
            match self.step(cx) {
                Step::Goto(next) => {
                    debug!("{} -> {}", self.phase, next);
                    self.phase = next;
                }
                Step::Yield(action, next) => {
                    if next != self.phase {
                        debug!("{} -> {} after {}", self.phase, next, action);
                    }
                    self.phase = next;
                    return action;
                }
            }
        }
        warn!(
            "{}: transition cap of {} hit in {}, idling",
            cx.observation.me.id, self.config.transition_cap, self.phase
        );
        Action::Idle
    }

    fn step(&mut self, cx: &mut Decision<'_>) -> Step {
        match self.phase {
            Phase::Setup => Step::Goto(Phase::PlanExplore),
            Phase::PlanExplore => self.plan_explore(cx),
            Phase::FollowExplore => self.follow(cx, Phase::OpenDoor),
            Phase::OpenDoor => self.open_door(cx),
            Phase::PlanRoomScan => self.plan_room_scan(cx),
            Phase::ScanRoom => self.scan_room(cx),
            Phase::PlanGrab => self.plan_grab(cx),
            Phase::FollowGrab => self.follow(cx, Phase::Grab),
            Phase::Grab => self.grab(cx),
            Phase::PlanDropoff => self.plan_dropoff(cx),
            Phase::FollowDropoff => self.follow_dropoff(cx),
            Phase::PlanVerify => self.plan_verify(cx),
            Phase::FollowVerify => match cx.navigator.next_step(cx.observation) {
                NavStep::Move(dir) => Step::Yield(Action::Move(dir), Phase::FollowVerify),
                NavStep::Blocked => self.blocked(cx),
                NavStep::Arrived => Step::Goto(self.after_verify(cx)),
            },
            Phase::PlanCleanup => self.plan_cleanup(cx),
            Phase::Cleanup => self.run_cleanup(cx),
            Phase::Done => {
                if cx.world.all_confirmed() {
                    Step::Yield(Action::Idle, Phase::Done)
                } else {
                    Step::Goto(Phase::PlanGrab)
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Navigation helpers
    // ------------------------------------------------------------------

    fn set_path(cx: &mut Decision<'_>, points: &[Location]) {
        cx.navigator.reset_path();
        cx.navigator.add_waypoints(points);
    }

    /// Shared FOLLOW_* behaviour: one move per tick, `arrived` on arrival.
    fn follow(&mut self, cx: &mut Decision<'_>, arrived: Phase) -> Step {
        match cx.navigator.next_step(cx.observation) {
            NavStep::Move(dir) => Step::Yield(Action::Move(dir), self.phase),
            NavStep::Arrived => Step::Goto(arrived),
            NavStep::Blocked => self.blocked(cx),
        }
    }

    /// A closed door next to us is opened; anything else waits a tick.
    fn blocked(&mut self, cx: &mut Decision<'_>) -> Step {
        let here = cx.observation.me.location;
        let door = cx
            .observation
            .doors
            .iter()
            .find(|d| !d.is_open && d.location.manhattan(&here) <= 1);
        match door {
            Some(door) => {
                cx.reports.push(Event::Opening { room: door.room.clone() });
                Step::Yield(Action::OpenDoor(door.id.clone()), self.phase)
            }
            None => {
                debug!("{}: path blocked in {}", cx.observation.me.id, self.phase);
                Step::Yield(Action::Idle, self.phase)
            }
        }
    }

    fn approach(&self, door: Location) -> Location {
        let (dx, dy) = self.config.door_approach;
        door.offset(dx, dy)
    }

    // ------------------------------------------------------------------
    // Exploration
    // ------------------------------------------------------------------

    fn plan_explore(&mut self, cx: &mut Decision<'_>) -> Step {
        if !self.grab_candidates(cx).is_empty() {
            return Step::Goto(Phase::PlanGrab);
        }

        let mut rooms: Vec<(String, Location)> = cx
            .world
            .unexplored_rooms()
            .map(|r| (r.name.clone(), r.door_location))
            .collect();
        if rooms.is_empty() {
            return Step::Goto(Phase::PlanGrab);
        }
        if rooms.len() > 1 {
            if let Some(abandoned) = &self.abandoned_room {
                rooms.retain(|(name, _)| name != abandoned);
            }
        }

        let choice = match cx.policy.room_choice() {
            RoomChoice::Queue => rooms.first(),
            RoomChoice::Random => rooms.choose(&mut self.rng),
        };
        let Some((room, door)) = choice.cloned() else {
            return Step::Goto(Phase::PlanGrab);
        };

        Self::set_path(cx, &[self.approach(door)]);
        cx.reports.push(Event::Moving { room: room.clone() });
        debug!("{}: exploring {}", cx.observation.me.id, room);
        self.target_room = Some(room);
        Step::Goto(Phase::FollowExplore)
    }

    fn open_door(&mut self, cx: &mut Decision<'_>) -> Step {
        let Some(room) = self.target_room.clone() else {
            return Step::Goto(Phase::PlanExplore);
        };
        let door = cx
            .world
            .room(&room)
            .map(|r| r.door_id.clone())
            .and_then(|id| cx.observation.door(&id));
        match door {
            Some(door) if !door.is_open => {
                cx.reports.push(Event::Opening { room });
                Step::Yield(Action::OpenDoor(door.id.clone()), Phase::PlanRoomScan)
            }
            _ => Step::Goto(Phase::PlanRoomScan),
        }
    }

    fn plan_room_scan(&mut self, cx: &mut Decision<'_>) -> Step {
        let Some(room) = self.target_room.clone() else {
            return Step::Goto(Phase::PlanExplore);
        };
        let Some(tiles) = cx.world.room(&room).map(|r| serpentine(&r.tiles)) else {
            return Step::Goto(Phase::PlanExplore);
        };

        Self::set_path(cx, &tiles);
        cx.reports.push(Event::Searching { room });
        cx.policy.on_scan_start();
        self.scan_ticks = 0;
        Step::Goto(Phase::ScanRoom)
    }

    fn scan_room(&mut self, cx: &mut Decision<'_>) -> Step {
        self.scan_ticks += 1;
        if cx.policy.abandon_scan(self.scan_ticks) {
            info!(
                "{}: quitting scan of {:?} after {} ticks",
                cx.observation.me.id, self.target_room, self.scan_ticks
            );
            self.abandoned_room = self.target_room.take();
            return Step::Goto(Phase::PlanExplore);
        }
        match cx.navigator.next_step(cx.observation) {
            NavStep::Move(dir) => Step::Yield(Action::Move(dir), Phase::ScanRoom),
            NavStep::Blocked => self.blocked(cx),
            NavStep::Arrived => {
                if let Some(room) = self.target_room.take() {
                    cx.world.mark_explored(&room);
                    info!("{}: finished searching {}", cx.observation.me.id, room);
                }
                self.abandoned_room = None;
                Step::Goto(Phase::PlanExplore)
            }
        }
    }

    // ------------------------------------------------------------------
    // Retrieval
    // ------------------------------------------------------------------

    /// Pending goals that pass the trust gate, best candidate first: blocks
    /// no trusted peer claimed come before claimed ones, newest first within
    /// each group.
    fn grab_candidates(&self, cx: &Decision<'_>) -> Vec<KnownBlock> {
        let claimed = cx.trust.claimed_pickup_locations();
        let mut candidates: Vec<KnownBlock> = cx
            .world
            .pending_goals()
            .into_iter()
            .filter(|b| match &b.provenance {
                Provenance::Observed => true,
                Provenance::Reported(peer) => cx.trust.trustworthy(peer),
            })
            .cloned()
            .collect();
        candidates.sort_by_key(|b| (claimed.contains(&b.location), std::cmp::Reverse(b.seq)));
        candidates
    }

    fn plan_grab(&mut self, cx: &mut Decision<'_>) -> Step {
        let carried = cx.observation.me.carrying.len();
        if carried >= cx.policy.max_carry() {
            return Step::Goto(Phase::PlanDropoff);
        }

        let Some(target) = self.grab_candidates(cx).into_iter().next() else {
            if carried > 0 {
                return Step::Goto(Phase::PlanDropoff);
            }
            if cx.world.has_unexplored_rooms() {
                return Step::Goto(Phase::PlanExplore);
            }
            // Every room searched: check the drop zone before searching again.
            if cx.world.all_confirmed() || self.config.rescan_when_exhausted {
                return Step::Goto(Phase::PlanVerify);
            }
            return Step::Yield(Action::Idle, Phase::PlanGrab);
        };

        if let Some(room) = &target.room {
            cx.reports.push(Event::Moving { room: room.clone() });
        }
        Self::set_path(cx, &[target.location]);
        self.grab_target = Some(GrabTarget {
            id: target.id,
            signature: target.signature,
            location: target.location,
        });
        Step::Goto(Phase::FollowGrab)
    }

    fn grab(&mut self, cx: &mut Decision<'_>) -> Step {
        let Some(target) = self.grab_target.take() else {
            return Step::Goto(Phase::PlanGrab);
        };
        let mask = cx.world.mask();
        let wanted = |signature: &VisualSignature| {
            let signature = mask.apply(signature);
            signature.matches(&target.signature)
                && cx.world.is_goal_signature(&signature)
                && cx.world.focus_point().is_some_and(|cp| cp.accepts(&signature))
        };
        // A reported target may carry a wildcard colour, so whatever sits in
        // the cell has to be a goal block in its own right.
        let seen = cx
            .observation
            .block(&target.id)
            .filter(|b| b.location == target.location)
            .or_else(|| {
                cx.observation
                    .blocks_at(&target.location)
                    .find(|b| wanted(&b.signature))
            })
            .cloned();

        match seen {
            Some(block) => {
                cx.reports.push(Event::PickingUp {
                    signature: mask.apply(&block.signature),
                    location: block.location,
                });
                Step::Yield(Action::Grab(block.id), Phase::PlanDropoff)
            }
            None => {
                debug!(
                    "{}: {} is gone from {}, replanning",
                    cx.observation.me.id, target.id, target.location
                );
                cx.world.forget_block(&target.id);
                Step::Goto(Phase::PlanGrab)
            }
        }
    }

    // ------------------------------------------------------------------
    // Delivery
    // ------------------------------------------------------------------

    fn plan_dropoff(&mut self, cx: &mut Decision<'_>) -> Step {
        let observation = cx.observation;
        let carrying = &observation.me.carrying;
        if carrying.is_empty() {
            return Step::Goto(Phase::PlanGrab);
        }

        let mask = cx.world.mask();
        let mut first_target = None;
        for held in carrying {
            let signature = mask.apply(&held.signature);
            if let Some(point) = cx.world.assign_dropoff(&held.id, &signature) {
                if first_target.is_none() {
                    first_target = Some(DropTarget {
                        block: held.id.clone(),
                        signature,
                        point,
                    });
                }
            }
        }

        if carrying.len() < cx.policy.max_carry() && !self.grab_candidates(cx).is_empty() {
            return Step::Goto(Phase::PlanGrab);
        }

        let Some(target) = first_target else {
            // Nothing we hold is wanted anywhere: put it down here.
            let surplus = carrying[0].id.clone();
            debug!("{}: dropping surplus {}", observation.me.id, surplus);
            return Step::Yield(Action::Drop(surplus), Phase::PlanDropoff);
        };
        let Some(location) = cx.world.collection_point(&target.point).map(|cp| cp.location) else {
            return Step::Goto(Phase::PlanGrab);
        };

        Self::set_path(cx, &[location]);
        self.drop_target = Some(target);
        Step::Goto(Phase::FollowDropoff)
    }

    fn follow_dropoff(&mut self, cx: &mut Decision<'_>) -> Step {
        match cx.navigator.next_step(cx.observation) {
            NavStep::Move(dir) => Step::Yield(Action::Move(dir), Phase::FollowDropoff),
            NavStep::Blocked => self.blocked(cx),
            NavStep::Arrived => {
                let Some(target) = self.drop_target.take() else {
                    return Step::Goto(Phase::PlanDropoff);
                };
                let observation = cx.observation;
                let carrying = &observation.me.carrying;
                if !carrying.iter().any(|b| b.id == target.block) {
                    return Step::Goto(Phase::PlanDropoff);
                }
                let here = observation.me.location;
                cx.world.complete_drop(&target.block);
                cx.reports.push(Event::Dropped {
                    signature: target.signature,
                    location: here,
                });
                info!("{}: delivered {} to {}", observation.me.id, target.block, target.point);
                let next = if carrying.len() > 1 {
                    Phase::PlanDropoff
                } else {
                    Phase::PlanVerify
                };
                Step::Yield(Action::Drop(target.block), next)
            }
        }
    }

    fn plan_verify(&mut self, cx: &mut Decision<'_>) -> Step {
        let tour: Vec<Location> = cx.world.collection_points().iter().map(|cp| cp.location).collect();
        Self::set_path(cx, &tour);
        Step::Goto(Phase::FollowVerify)
    }

    /// Where a finished verification tour leads.
    fn after_verify(&self, cx: &mut Decision<'_>) -> Phase {
        if cx.world.all_confirmed() {
            if cx.policy.reorders_on_completion() && !self.cleaned {
                Phase::PlanCleanup
            } else {
                Phase::Done
            }
        } else if cx.world.has_unexplored_rooms() {
            Phase::PlanExplore
        } else if self.config.rescan_when_exhausted && cx.world.pending_goals().is_empty() {
            info!("{}: every room searched, starting over", cx.observation.me.id);
            cx.world.reset_exploration();
            Phase::PlanExplore
        } else {
            Phase::PlanGrab
        }
    }

    // ------------------------------------------------------------------
    // Cleanup
    // ------------------------------------------------------------------

    /// Lift every delivered block (last point first) onto the cell west of
    /// its point, then put them back in point order.
    fn plan_cleanup(&mut self, cx: &mut Decision<'_>) -> Step {
        let points: Vec<(Location, VisualSignature)> = cx
            .world
            .collection_points()
            .iter()
            .map(|cp| (cp.location, cp.signature.clone()))
            .collect();

        self.cleanup.clear();
        for (location, signature) in points.iter().rev() {
            let staging = location.offset(-1, 0);
            self.cleanup.push_back(CleanupStep::Walk(*location));
            self.cleanup.push_back(CleanupStep::Lift {
                at: *location,
                signature: signature.clone(),
            });
            self.cleanup.push_back(CleanupStep::Walk(staging));
            self.cleanup.push_back(CleanupStep::Place);
        }
        for (location, signature) in points.iter() {
            let staging = location.offset(-1, 0);
            self.cleanup.push_back(CleanupStep::Walk(staging));
            self.cleanup.push_back(CleanupStep::Lift {
                at: staging,
                signature: signature.clone(),
            });
            self.cleanup.push_back(CleanupStep::Walk(*location));
            self.cleanup.push_back(CleanupStep::Place);
        }
        self.cleanup_walking = false;
        info!("{}: re-sorting {} collection points", cx.observation.me.id, points.len());
        Step::Goto(Phase::Cleanup)
    }

    /// Works through the cleanup queue. Instant steps (nothing to lift,
    /// nothing to place, already there) are consumed in place, so the queue
    /// length bounds this loop.
    fn run_cleanup(&mut self, cx: &mut Decision<'_>) -> Step {
        let observation = cx.observation;
        while let Some(step) = self.cleanup.front().cloned() {
            match step {
                CleanupStep::Walk(location) => {
                    if !self.cleanup_walking {
                        Self::set_path(cx, &[location]);
                        self.cleanup_walking = true;
                    }
                    match cx.navigator.next_step(observation) {
                        NavStep::Move(dir) => return Step::Yield(Action::Move(dir), Phase::Cleanup),
                        NavStep::Blocked => return self.blocked(cx),
                        NavStep::Arrived => {
                            self.cleanup.pop_front();
                            self.cleanup_walking = false;
                        }
                    }
                }
                CleanupStep::Lift { at, signature } => {
                    self.cleanup.pop_front();
                    let mask = cx.world.mask();
                    if let Some(block) = observation
                        .blocks_at(&at)
                        .find(|b| mask.apply(&b.signature).matches(&signature))
                    {
                        return Step::Yield(Action::Grab(block.id.clone()), Phase::Cleanup);
                    }
                }
                CleanupStep::Place => {
                    self.cleanup.pop_front();
                    if let Some(block) = observation.me.carrying.first() {
                        return Step::Yield(Action::Drop(block.id.clone()), Phase::Cleanup);
                    }
                }
            }
        }
        self.cleaned = true;
        Step::Goto(Phase::Done)
    }
}

/// Boustrophedon ordering of a room's tiles: rows from the door side (south)
/// northwards, alternating direction.
pub fn serpentine(tiles: &[Location]) -> Vec<Location> {
    let mut rows: Vec<i32> = tiles.iter().map(|t| t.y).collect();
    rows.sort_unstable_by(|a, b| b.cmp(a));
    rows.dedup();

    let mut path = Vec::with_capacity(tiles.len());
    for (i, y) in rows.into_iter().enumerate() {
        let mut row: Vec<Location> = tiles.iter().filter(|t| t.y == y).copied().collect();
        row.sort_by_key(|t| t.x);
        if i % 2 == 1 {
            row.reverse();
        }
        path.extend(row);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrustConfig;
    use crate::ledger::MemoryLedgerStore;
    use crate::policy::{Cooperative, Strong};
    use crate::world::AttributeMask;
    use dropzone_env::{
        AgentId, CollectionSite, Direction, DoorState, ObservedBlock, RoomLayout, SelfState,
    };
    use std::sync::Arc;

    /// Replays a fixed script; `Arrived` once the script runs out.
    #[derive(Default)]
    struct ScriptedNavigator {
        script: VecDeque<NavStep>,
        waypoints: Vec<Location>,
        resets: usize,
    }

    impl Navigator for ScriptedNavigator {
        fn reset_path(&mut self) {
            self.resets += 1;
            self.waypoints.clear();
        }

        fn add_waypoints(&mut self, points: &[Location]) {
            self.waypoints.extend_from_slice(points);
        }

        fn next_step(&mut self, _observation: &Observation) -> NavStep {
            self.script.pop_front().unwrap_or(NavStep::Arrived)
        }
    }

    fn red() -> VisualSignature {
        VisualSignature::new(2, "red", 0.5)
    }

    fn observation(at: Location, blocks: Vec<ObservedBlock>) -> Observation {
        Observation {
            tick: 0,
            me: SelfState {
                id: AgentId::from("alice"),
                location: at,
                carrying: Vec::new(),
            },
            blocks,
            doors: vec![DoorState {
                id: ObjectId::from("door_1"),
                room: "room_1".to_string(),
                location: Location::new(2, 3),
                is_open: false,
            }],
            rooms: vec![RoomLayout {
                name: "room_1".to_string(),
                door_id: ObjectId::from("door_1"),
                door_location: Location::new(2, 3),
                tiles: vec![Location::new(1, 1), Location::new(2, 1), Location::new(1, 2), Location::new(2, 2)],
            }],
            collection_sites: vec![CollectionSite {
                id: ObjectId::from("drop_1"),
                signature: red(),
                location: Location::new(6, 4),
            }],
            team: vec![AgentId::from("alice"), AgentId::from("bob")],
            sense_radius: 1,
        }
    }

    struct Fixture {
        world: WorldKnowledge,
        trust: TrustEngine,
        navigator: ScriptedNavigator,
        controller: TaskController,
    }

    impl Fixture {
        fn new(obs: &Observation) -> Self {
            let mut world = WorldKnowledge::new(AttributeMask::None);
            for room in &obs.rooms {
                world.register_room(room, false);
            }
            for site in &obs.collection_sites {
                world.register_collection_point(site);
            }
            let mut trust = TrustEngine::new(
                AgentId::from("alice"),
                TrustConfig::default(),
                Arc::new(MemoryLedgerStore::new()),
            );
            trust.open_roster(&obs.team);
            Self {
                world,
                trust,
                navigator: ScriptedNavigator::default(),
                controller: TaskController::new(
                    ControllerConfig {
                        door_approach: (0, 1),
                        transition_cap: 24,
                        rescan_when_exhausted: true,
                    },
                    1,
                ),
            }
        }

        fn tick(&mut self, obs: &Observation, policy: &mut dyn AgentPolicy) -> (Action, Vec<Event>) {
            self.world.refresh(obs);
            let mut reports = Vec::new();
            let action = self.controller.decide(&mut Decision {
                observation: obs,
                world: &mut self.world,
                trust: &self.trust,
                policy,
                navigator: &mut self.navigator,
                reports: &mut reports,
            });
            (action, reports)
        }
    }

    #[test]
    fn test_first_tick_moves_towards_a_room() {
        let obs = observation(Location::new(6, 6), Vec::new());
        let mut fx = Fixture::new(&obs);
        fx.navigator.script.push_back(NavStep::Move(Direction::North));

        let (action, reports) = fx.tick(&obs, &mut Cooperative);
        assert_eq!(action, Action::Move(Direction::North));
        assert_eq!(reports, vec![Event::Moving { room: "room_1".into() }]);
        assert_eq!(fx.navigator.waypoints, vec![Location::new(2, 4)]);
        assert_eq!(fx.controller.phase(), Phase::FollowExplore);
    }

    #[test]
    fn test_arrival_opens_door_then_scans() {
        let obs = observation(Location::new(2, 4), Vec::new());
        let mut fx = Fixture::new(&obs);
        fx.navigator.script.push_back(NavStep::Move(Direction::North));
        fx.tick(&obs, &mut Cooperative);

        // Script exhausted: arrival, door is closed.
        let (action, reports) = fx.tick(&obs, &mut Cooperative);
        assert_eq!(action, Action::OpenDoor(ObjectId::from("door_1")));
        assert_eq!(reports, vec![Event::Opening { room: "room_1".into() }]);

        fx.navigator.script.push_back(NavStep::Move(Direction::North));
        let (action, reports) = fx.tick(&obs, &mut Cooperative);
        assert_eq!(action, Action::Move(Direction::North));
        assert_eq!(reports, vec![Event::Searching { room: "room_1".into() }]);
        assert_eq!(fx.controller.searching_room(), Some("room_1"));
        assert_eq!(fx.navigator.waypoints.len(), 4);

        // Scan complete and nothing found: tour the drop zone, then search
        // again. The scripted navigator arrives everywhere instantly.
        let (action, reports) = fx.tick(&obs, &mut Cooperative);
        assert!(!fx.world.rooms()[0].explored, "exploration resets when exhausted");
        assert_eq!(action, Action::OpenDoor(ObjectId::from("door_1")));
        assert_eq!(
            reports,
            vec![Event::Moving { room: "room_1".into() }, Event::Opening { room: "room_1".into() }]
        );
        assert_eq!(fx.controller.phase(), Phase::PlanRoomScan);
    }

    #[test]
    fn test_grab_skips_block_already_at_collection_point() {
        let on_point = ObservedBlock {
            id: ObjectId::from("b1"),
            signature: red(),
            location: Location::new(6, 4),
        };
        let obs = observation(Location::new(6, 5), vec![on_point]);
        let mut fx = Fixture::new(&obs);
        fx.world.mark_explored("room_1");

        let (action, _) = fx.tick(&obs, &mut Cooperative);
        assert!(!matches!(action, Action::Grab(_)));
        assert!(fx.world.all_confirmed());
    }

    #[test]
    fn test_stale_target_replans_within_tick() {
        let block = ObservedBlock {
            id: ObjectId::from("b1"),
            signature: red(),
            location: Location::new(1, 1),
        };
        let seen = observation(Location::new(1, 2), vec![block]);
        let mut fx = Fixture::new(&seen);
        fx.controller.config.rescan_when_exhausted = false;
        fx.world.mark_explored("room_1");
        fx.navigator.script.push_back(NavStep::Move(Direction::North));

        let (action, reports) = fx.tick(&seen, &mut Cooperative);
        assert_eq!(action, Action::Move(Direction::North));
        assert_eq!(reports, vec![Event::Moving { room: "room_1".into() }]);

        // Arrive to an empty cell: forget, replan, end up idle; never a grab.
        let gone = observation(Location::new(1, 1), Vec::new());
        let (action, reports) = fx.tick(&gone, &mut Cooperative);
        assert_eq!(action, Action::Idle);
        assert!(reports.is_empty());
        assert!(fx.world.blocks().is_empty());
        assert_eq!(fx.controller.phase(), Phase::PlanGrab);
    }

    #[test]
    fn test_grab_then_deliver() {
        let block = ObservedBlock {
            id: ObjectId::from("b1"),
            signature: red(),
            location: Location::new(1, 1),
        };
        let obs = observation(Location::new(1, 1), vec![block.clone()]);
        let mut fx = Fixture::new(&obs);
        fx.world.mark_explored("room_1");

        let (action, reports) = fx.tick(&obs, &mut Cooperative);
        assert_eq!(action, Action::Grab(ObjectId::from("b1")));
        assert_eq!(
            reports,
            vec![
                Event::Moving { room: "room_1".into() },
                Event::PickingUp {
                    signature: red(),
                    location: Location::new(1, 1)
                }
            ]
        );

        let mut carrying = observation(Location::new(6, 4), Vec::new());
        carrying.me.carrying.push(ObservedBlock {
            location: Location::new(6, 4),
            ..block
        });
        let (action, reports) = fx.tick(&carrying, &mut Cooperative);
        assert_eq!(action, Action::Drop(ObjectId::from("b1")));
        assert_eq!(
            reports,
            vec![Event::Dropped {
                signature: red(),
                location: Location::new(6, 4)
            }]
        );
        assert_eq!(fx.controller.phase(), Phase::PlanVerify);
        assert!(fx.world.collection_points()[0].delivered_by_me);
    }

    #[test]
    fn test_untrusted_report_is_not_a_target() {
        let obs = observation(Location::new(6, 6), Vec::new());
        let mut fx = Fixture::new(&obs);
        fx.controller.config.rescan_when_exhausted = false;
        fx.world.mark_explored("room_1");
        let bob = AgentId::from("bob");
        fx.world.report_block(&bob, &red(), &Location::new(2, 2));

        // Bob lies about searching without moving first.
        fx.trust.ingest(&bob, &Event::Searching { room: "room_1".into() }, &fx.world);
        assert!(!fx.trust.trustworthy(&bob));

        let (action, reports) = fx.tick(&obs, &mut Cooperative);
        assert_eq!(action, Action::Idle);
        assert!(reports.is_empty());
    }

    #[test]
    fn test_wildcard_report_does_not_grab_other_colour() {
        let obs = observation(Location::new(6, 6), Vec::new());
        let mut fx = Fixture::new(&obs);
        fx.controller.config.rescan_when_exhausted = false;
        fx.world.mark_explored("room_1");
        let bob = AgentId::from("bob");
        assert!(fx.world.report_block(&bob, &VisualSignature::new(2, "?", 0.5), &Location::new(2, 2)));
        fx.navigator.script.push_back(NavStep::Move(Direction::North));

        let (action, _) = fx.tick(&obs, &mut Cooperative);
        assert_eq!(action, Action::Move(Direction::North));

        // Bob could not see colour: the shape-2 block there is blue.
        let blue = ObservedBlock {
            id: ObjectId::from("blue_1"),
            signature: VisualSignature::new(2, "blue", 0.5),
            location: Location::new(2, 2),
        };
        let arrived = observation(Location::new(2, 2), vec![blue]);
        let (action, reports) = fx.tick(&arrived, &mut Cooperative);
        assert_ne!(action, Action::Grab(ObjectId::from("blue_1")));
        assert!(!reports.iter().any(|e| matches!(e, Event::PickingUp { .. })));
        assert!(fx.world.pending_goals().is_empty());
        assert_eq!(fx.world.block(&ObjectId::from("blue_1")).map(|b| b.is_goal), Some(false));
    }

    #[test]
    fn test_blocked_next_to_closed_door_opens_it() {
        let obs = observation(Location::new(2, 4), Vec::new());
        let mut fx = Fixture::new(&obs);
        fx.navigator.script.push_back(NavStep::Blocked);

        let (action, reports) = fx.tick(&obs, &mut Cooperative);
        assert_eq!(action, Action::OpenDoor(ObjectId::from("door_1")));
        assert_eq!(
            reports,
            vec![Event::Moving { room: "room_1".into() }, Event::Opening { room: "room_1".into() }]
        );
        assert_eq!(fx.controller.phase(), Phase::FollowExplore);
    }

    #[test]
    fn test_strong_goes_back_for_a_second_block() {
        let first = ObservedBlock {
            id: ObjectId::from("b1"),
            signature: red(),
            location: Location::new(1, 1),
        };
        let second = ObservedBlock {
            id: ObjectId::from("b2"),
            signature: VisualSignature::new(0, "blue", 1.0),
            location: Location::new(2, 1),
        };
        let mut obs = observation(Location::new(1, 1), vec![first.clone(), second]);
        obs.collection_sites.push(CollectionSite {
            id: ObjectId::from("drop_2"),
            signature: VisualSignature::new(0, "blue", 1.0),
            location: Location::new(6, 5),
        });
        let mut fx = Fixture::new(&obs);
        fx.world.mark_explored("room_1");
        let mut strong = Strong;

        let (action, _) = fx.tick(&obs, &mut strong);
        assert_eq!(action, Action::Grab(ObjectId::from("b1")));

        let mut holding = obs.clone();
        holding.blocks.retain(|b| b.id != first.id);
        holding.me.carrying.push(first);
        fx.navigator.script.push_back(NavStep::Move(Direction::East));
        let (action, _) = fx.tick(&holding, &mut strong);
        assert_eq!(action, Action::Move(Direction::East));
        assert_eq!(fx.controller.phase(), Phase::FollowGrab);
        assert_eq!(fx.navigator.waypoints, vec![Location::new(2, 1)]);
    }

    #[test]
    fn test_transition_cap_yields_idle() {
        let obs = observation(Location::new(6, 6), Vec::new());
        let mut fx = Fixture::new(&obs);
        fx.controller.config.transition_cap = 1;

        let (action, _) = fx.tick(&obs, &mut Cooperative);
        assert_eq!(action, Action::Idle);
        assert_eq!(fx.controller.phase(), Phase::PlanExplore);
    }

    #[test]
    fn test_serpentine_covers_room_from_door_side() {
        let tiles = vec![
            Location::new(1, 1),
            Location::new(2, 1),
            Location::new(3, 1),
            Location::new(1, 2),
            Location::new(2, 2),
            Location::new(3, 2),
        ];
        assert_eq!(
            serpentine(&tiles),
            vec![
                Location::new(1, 2),
                Location::new(2, 2),
                Location::new(3, 2),
                Location::new(3, 1),
                Location::new(2, 1),
                Location::new(1, 1),
            ]
        );
    }
}
