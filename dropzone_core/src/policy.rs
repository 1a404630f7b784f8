//! Agent Variant Policies.
//!
//! One task-phase controller drives every agent; variants differ only through
//! the small capability surface of [`AgentPolicy`]:
//!
//! | variant      | reports            | carry | perception  | rooms  | other                 |
//! |--------------|--------------------|-------|-------------|--------|-----------------------|
//! | Cooperative  | honest             | 1     | full        | queue  |                       |
//! | Lazy         | honest             | 1     | full        | random | may abandon scans     |
//! | Liar         | 80% false payloads | 1     | full        | random |                       |
//! | Strong       | honest             | 2     | full        | queue  | re-sorts on completion|
//! | Colorblind   | colour sent as `?` | 1     | colour hidden | queue |                      |
//!
//! Policies only ever rewrite report *content*. The action returned to the
//! environment is never touched.

use crate::codec::Event;
use crate::world::{AttributeMask, WorldKnowledge};
use dropzone_env::{AgentId, Location, VisualSignature};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the next room to explore is picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomChoice {
    /// First unexplored room in registration order
    Queue,
    /// Uniformly among unexplored rooms
    Random,
}

/// What a policy may consult when rewriting a report.
pub struct ReportContext<'a> {
    pub me: &'a AgentId,
    pub world: &'a WorldKnowledge,
}

/// Capability interface implemented by every agent variant.
pub trait AgentPolicy: Send {
    fn kind(&self) -> PolicyKind;

    /// Rewrites an outgoing report. Honest variants return it unchanged.
    fn report_transform(&mut self, event: Event, _ctx: &ReportContext<'_>) -> Event {
        event
    }

    /// Blocks carried at once.
    fn max_carry(&self) -> usize {
        1
    }

    fn attribute_mask(&self) -> AttributeMask {
        AttributeMask::None
    }

    fn room_choice(&self) -> RoomChoice {
        RoomChoice::Queue
    }

    /// Called when a room scan starts.
    fn on_scan_start(&mut self) {}

    /// Whether to walk away from the current scan after `scan_ticks` ticks.
    fn abandon_scan(&self, _scan_ticks: u32) -> bool {
        false
    }

    /// Whether to lift and re-place delivered blocks once everything is
    /// confirmed.
    fn reorders_on_completion(&self) -> bool {
        false
    }
}

/// Agent variant selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyKind {
    Cooperative,
    Lazy,
    Liar,
    Strong,
    Colorblind,
}

impl PolicyKind {
    pub fn all() -> [PolicyKind; 5] {
        [
            PolicyKind::Cooperative,
            PolicyKind::Lazy,
            PolicyKind::Liar,
            PolicyKind::Strong,
            PolicyKind::Colorblind,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            PolicyKind::Cooperative => "cooperative",
            PolicyKind::Lazy => "lazy",
            PolicyKind::Liar => "liar",
            PolicyKind::Strong => "strong",
            PolicyKind::Colorblind => "colorblind",
        }
    }

    /// Builds the policy object, seeding any randomness from `seed`.
    pub fn build(&self, seed: u64) -> Box<dyn AgentPolicy> {
        match self {
            PolicyKind::Cooperative => Box::new(Cooperative),
            PolicyKind::Lazy => Box::new(Lazy::new(seed)),
            PolicyKind::Liar => Box::new(Liar::new(seed)),
            PolicyKind::Strong => Box::new(Strong),
            PolicyKind::Colorblind => Box::new(Colorblind),
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyKind::all()
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown agent variant: {}", s))
    }
}

/// The baseline team player.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cooperative;

impl AgentPolicy for Cooperative {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Cooperative
    }
}

/// Picks rooms at random and gives up on half of its room scans.
#[derive(Debug, Clone)]
pub struct Lazy {
    rng: StdRng,
    quitting: bool,
}

impl Lazy {
    /// Chance of giving up on a given room.
    pub const QUIT_PROBABILITY: f64 = 0.5;

    /// Scan ticks a quitter puts in before walking away.
    pub const PATIENCE: u32 = 7;

    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            quitting: false,
        }
    }
}

impl AgentPolicy for Lazy {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Lazy
    }

    fn room_choice(&self) -> RoomChoice {
        RoomChoice::Random
    }

    fn on_scan_start(&mut self) {
        self.quitting = self.rng.gen_bool(Self::QUIT_PROBABILITY);
    }

    fn abandon_scan(&self, scan_ticks: u32) -> bool {
        self.quitting && scan_ticks > Self::PATIENCE
    }
}

/// Acts honestly, reports falsely most of the time.
#[derive(Debug, Clone)]
pub struct Liar {
    rng: StdRng,
    lie_probability: f64,
}

impl Liar {
    pub const LIE_PROBABILITY: f64 = 0.8;

    pub fn new(seed: u64) -> Self {
        Self::with_probability(seed, Self::LIE_PROBABILITY)
    }

    pub fn with_probability(seed: u64, lie_probability: f64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            lie_probability: lie_probability.clamp(0.0, 1.0),
        }
    }

    fn other_room(&mut self, room: &str, world: &WorldKnowledge) -> Option<String> {
        let others: Vec<&str> = world
            .rooms()
            .iter()
            .map(|r| r.name.as_str())
            .filter(|name| *name != room)
            .collect();
        others.choose(&mut self.rng).map(|name| name.to_string())
    }

    fn other_signature(&mut self, signature: &VisualSignature, world: &WorldKnowledge) -> Option<VisualSignature> {
        let others: Vec<&VisualSignature> = world
            .collection_points()
            .iter()
            .map(|cp| &cp.signature)
            .filter(|s| *s != signature)
            .collect();
        others.choose(&mut self.rng).map(|s| (*s).clone())
    }

    fn other_location(&mut self, location: &Location, world: &WorldKnowledge) -> Option<Location> {
        let mut others: Vec<Location> = world
            .blocks()
            .iter()
            .map(|b| b.location)
            .chain(world.rooms().iter().flat_map(|r| r.tiles.iter().copied()))
            .filter(|l| l != location)
            .collect();
        others.sort();
        others.dedup();
        others.choose(&mut self.rng).copied()
    }

    /// A false `(signature, location)` pair: one of the two is swapped.
    fn falsify_block(
        &mut self,
        signature: &VisualSignature,
        location: &Location,
        world: &WorldKnowledge,
    ) -> Option<(VisualSignature, Location)> {
        let swap_signature_first = self.rng.gen_bool(0.5);
        for swap_signature in [swap_signature_first, !swap_signature_first] {
            if swap_signature {
                if let Some(fake) = self.other_signature(signature, world) {
                    return Some((fake, *location));
                }
            } else if let Some(fake) = self.other_location(location, world) {
                return Some((signature.clone(), fake));
            }
        }
        None
    }
}

impl AgentPolicy for Liar {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Liar
    }

    fn room_choice(&self) -> RoomChoice {
        RoomChoice::Random
    }

    fn report_transform(&mut self, event: Event, ctx: &ReportContext<'_>) -> Event {
        if !self.rng.gen_bool(self.lie_probability) {
            return event;
        }
        let world = ctx.world;
        match event {
            Event::Moving { room } => match self.other_room(&room, world) {
                Some(fake) => Event::Moving { room: fake },
                None => Event::Moving { room },
            },
            Event::Opening { room } => match self.other_room(&room, world) {
                Some(fake) => Event::Opening { room: fake },
                None => Event::Opening { room },
            },
            Event::Searching { room } => match self.other_room(&room, world) {
                Some(fake) => Event::Searching { room: fake },
                None => Event::Searching { room },
            },
            Event::Found { signature, location } => match self.falsify_block(&signature, &location, world) {
                Some((signature, location)) => Event::Found { signature, location },
                None => Event::Found { signature, location },
            },
            Event::PickingUp { signature, location } => match self.falsify_block(&signature, &location, world) {
                Some((signature, location)) => Event::PickingUp { signature, location },
                None => Event::PickingUp { signature, location },
            },
            Event::Dropped { signature, location } => match self.falsify_block(&signature, &location, world) {
                Some((signature, location)) => Event::Dropped { signature, location },
                None => Event::Dropped { signature, location },
            },
            // Confirmations and beliefs about others pass through.
            other => other,
        }
    }
}

/// Carries two blocks and re-sorts the collection points when done.
#[derive(Debug, Clone, Copy, Default)]
pub struct Strong;

impl AgentPolicy for Strong {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Strong
    }

    fn max_carry(&self) -> usize {
        2
    }

    fn reorders_on_completion(&self) -> bool {
        true
    }
}

/// Cannot see colour; everything it reports carries `?`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Colorblind;

impl AgentPolicy for Colorblind {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Colorblind
    }

    fn attribute_mask(&self) -> AttributeMask {
        AttributeMask::Colour
    }

    fn report_transform(&mut self, event: Event, _ctx: &ReportContext<'_>) -> Event {
        match event {
            Event::Found { signature, location } => Event::Found {
                signature: signature.masked_colour(),
                location,
            },
            Event::PickingUp { signature, location } => Event::PickingUp {
                signature: signature.masked_colour(),
                location,
            },
            Event::Dropped { signature, location } => Event::Dropped {
                signature: signature.masked_colour(),
                location,
            },
            other => other,
        }
    }
}
