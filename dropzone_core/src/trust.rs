//! The "TRUST" Engine - per-peer reputation from cross-validated claims.
//!
//! Every decoded, non-duplicate peer event is checked against what the
//! receiving agent knows itself:
//! - **Sequencing**: SEARCHING must follow a MOVING to the same room, FOUND must
//!   lie in the room last searched, PICKING_UP in the room last moved to, and
//!   DROPPED must follow a PICKING_UP of the same signature
//! - **Ground truth**: OPENING is checked against the door state, FOUND against
//!   locally observed blocks (and answered with a confirmation broadcast)
//! - **Third-party signals**: confirmations and trust beliefs about someone
//!   else feed that peer's indirect and reputation components
//!
//! A checked claim adds the truth reward, a failed one subtracts the (larger)
//! lie cost. Rows are persisted through an injected [`LedgerStore`]; storage
//! failures are logged and the in-memory ledger stays authoritative.

use crate::codec::{Event, EventKind, Verdict};
use crate::config::TrustConfig;
use crate::ledger::{LedgerStore, PeerRecord};
use crate::world::{ClaimCheck, WorldKnowledge};
use dropzone_env::{AgentId, Location, VisualSignature};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What this agent remembers about one peer's messages.
#[derive(Debug, Clone, Default)]
pub struct PeerLog {
    /// Last message of each type
    pub last: BTreeMap<EventKind, Event>,

    /// Recent pick-up claims, oldest first
    pub pickups: Vec<(VisualSignature, Location)>,
}

impl PeerLog {
    fn last_room(&self, kind: EventKind) -> Option<&str> {
        match self.last.get(&kind)? {
            Event::Moving { room } | Event::Searching { room } | Event::Opening { room } => Some(room),
            _ => None,
        }
    }
}

/// How a claim was scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Score {
    Truth,
    Lie,
}

impl PeerRecord {
    /// Weighted combination favouring direct experience.
    pub fn composite(&self, config: &TrustConfig) -> f64 {
        (config.direct_weight * self.direct
            + config.indirect_weight * self.indirect
            + config.reputation_weight * self.reputation)
            / config.normaliser
    }
}

/// Per-agent trust ledger and the rules that update it.
pub struct TrustEngine {
    me: AgentId,
    config: TrustConfig,
    records: BTreeMap<AgentId, PeerRecord>,
    logs: BTreeMap<AgentId, PeerLog>,
    store: Arc<dyn LedgerStore>,
}

impl TrustEngine {
    /// Creates an engine with no peers yet; see [`TrustEngine::open_roster`].
    pub fn new(me: AgentId, config: TrustConfig, store: Arc<dyn LedgerStore>) -> Self {
        Self {
            me,
            config,
            records: BTreeMap::new(),
            logs: BTreeMap::new(),
            store,
        }
    }

    /// Loads the persisted ledger for `roster` (self is skipped).
    ///
    /// A ledger whose peer set differs from the roster is reset to neutral
    /// rows for the current roster.
    pub fn open_roster(&mut self, roster: &[AgentId]) {
        let peers: Vec<AgentId> = {
            let mut peers: Vec<AgentId> = roster.iter().filter(|p| **p != self.me).cloned().collect();
            peers.sort();
            peers.dedup();
            peers
        };

        let stored = match self.store.list() {
            Ok(rows) => rows,
            Err(e) => {
                warn!("{}: failed to load trust ledger: {}", self.me, e);
                Vec::new()
            }
        };
        let stored_peers: Vec<AgentId> = stored.iter().map(|r| r.peer.clone()).collect();

        self.logs = peers.iter().map(|p| (p.clone(), PeerLog::default())).collect();

        if !stored.is_empty() && stored_peers == peers {
            info!("{}: loaded trust ledger with {} peers", self.me, stored.len());
            self.records = stored.into_iter().map(|r| (r.peer.clone(), r)).collect();
            return;
        }

        if !stored.is_empty() {
            warn!(
                "{}: ledger peers {:?} do not match roster {:?}, resetting",
                self.me, stored_peers, peers
            );
            if let Err(e) = self.store.clear() {
                warn!("{}: failed to clear trust ledger: {}", self.me, e);
            }
        }

        let neutral = self.config.neutral;
        self.records = peers
            .iter()
            .map(|p| (p.clone(), PeerRecord::neutral(p.clone(), neutral)))
            .collect();
        for record in self.records.values() {
            if let Err(e) = self.store.put(record) {
                warn!("{}: failed to persist trust row for {}: {}", self.me, record.peer, e);
            }
        }
        info!("{}: initialised trust ledger for {} peers", self.me, self.records.len());
    }

    pub fn me(&self) -> &AgentId {
        &self.me
    }

    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    pub fn record(&self, peer: &AgentId) -> Option<&PeerRecord> {
        self.records.get(peer)
    }

    pub fn records(&self) -> impl Iterator<Item = &PeerRecord> {
        self.records.values()
    }

    pub fn log(&self, peer: &AgentId) -> Option<&PeerLog> {
        self.logs.get(peer)
    }

    /// Composite trust of a known peer.
    pub fn composite(&self, peer: &AgentId) -> Option<f64> {
        self.records.get(peer).map(|r| r.composite(&self.config))
    }

    /// The trust gate. Unknown peers are not trustworthy.
    pub fn trustworthy(&self, peer: &AgentId) -> bool {
        self.composite(peer)
            .map(|c| c >= self.config.threshold)
            .unwrap_or(false)
    }

    /// Locations trustworthy peers last claimed to be picking up from.
    pub fn claimed_pickup_locations(&self) -> Vec<Location> {
        self.logs
            .iter()
            .filter(|(peer, _)| self.trustworthy(peer))
            .flat_map(|(_, log)| log.pickups.iter().map(|(_, loc)| *loc))
            .collect()
    }

    /// Applies one decoded peer event.
    ///
    /// Returns the broadcasts this agent should send in response
    /// (found-block confirmations and trust beliefs).
    pub fn ingest(&mut self, sender: &AgentId, event: &Event, world: &WorldKnowledge) -> Vec<Event> {
        let mut outbound = Vec::new();

        if *sender == self.me || !self.records.contains_key(sender) {
            debug!("{}: ignoring message from {}", self.me, sender);
            return outbound;
        }
        let Some(kind) = event.kind() else {
            return outbound;
        };
        let duplicate = self
            .logs
            .get(sender)
            .and_then(|log| log.last.get(&kind))
            .is_some_and(|last| last == event);
        if duplicate {
            return outbound;
        }

        match event {
            Event::Moving { .. } => {}
            Event::Opening { room } => {
                let open = world.room(room).map(|r| r.door_open).unwrap_or(false);
                self.score(sender, if open { Score::Truth } else { Score::Lie }, kind);
            }
            Event::Searching { room } => {
                let moved_there = self.last_room(sender, EventKind::Moving) == Some(room.as_str());
                self.score(sender, if moved_there { Score::Truth } else { Score::Lie }, kind);
            }
            Event::Found { signature, location } => {
                // Claims outside every room carry no search sequence to check.
                if let Some(room) = world.room_containing(location).map(|r| r.name.as_str()) {
                    let searched_there = self.last_room(sender, EventKind::Searching) == Some(room);
                    self.score(sender, if searched_there { Score::Truth } else { Score::Lie }, kind);
                }

                match world.validate_claim(location, signature) {
                    ClaimCheck::Confirmed => {
                        self.score(sender, Score::Truth, kind);
                        outbound.push(Event::FoundConfirmation {
                            peer: sender.clone(),
                            verdict: Verdict::Approved,
                        });
                    }
                    ClaimCheck::Contradicted => {
                        self.score(sender, Score::Lie, kind);
                        outbound.push(Event::FoundConfirmation {
                            peer: sender.clone(),
                            verdict: Verdict::Denied,
                        });
                    }
                    ClaimCheck::Unknown => {}
                }
            }
            Event::PickingUp { signature, location } => {
                if let Some(room) = world.room_containing(location).map(|r| r.name.as_str()) {
                    let moved_there = self.last_room(sender, EventKind::Moving) == Some(room);
                    self.score(sender, if moved_there { Score::Truth } else { Score::Lie }, kind);
                }

                let max = self.config.max_remembered_pickups.max(1);
                if let Some(log) = self.logs.get_mut(sender) {
                    if log.pickups.len() >= max {
                        log.pickups.clear();
                    }
                    log.pickups.push((signature.clone(), *location));
                }
                if let Some(value) = self.composite(sender) {
                    outbound.push(Event::TrustBelief {
                        peer: sender.clone(),
                        value,
                    });
                }
            }
            Event::Dropped { signature, .. } => {
                let picked_up = self
                    .logs
                    .get(sender)
                    .is_some_and(|log| log.pickups.iter().any(|(s, _)| s == signature));
                self.score(sender, if picked_up { Score::Truth } else { Score::Lie }, kind);
            }
            Event::FoundConfirmation { peer, verdict } => {
                if self.accepts_third_party(sender, peer) {
                    let delta = match verdict {
                        Verdict::Approved => self.config.truth_reward,
                        Verdict::Denied => -self.config.lie_cost,
                    };
                    self.update(peer, |r| r.indirect += delta);
                    debug!("{}: {} says {} {:?}", self.me, sender, peer, verdict);
                }
            }
            Event::TrustBelief { peer, value } => {
                if self.accepts_third_party(sender, peer) {
                    let value = *value;
                    self.update(peer, |r| r.reputation = (r.reputation + value) / 2.0);
                    debug!("{}: {} believes {} at {:.3}", self.me, sender, peer, value);
                }
            }
            Event::Invalid => {}
        }

        if let Some(log) = self.logs.get_mut(sender) {
            log.last.insert(kind, event.clone());
        }
        outbound
    }

    fn last_room(&self, peer: &AgentId, kind: EventKind) -> Option<&str> {
        self.logs.get(peer)?.last_room(kind)
    }

    /// Third-party updates must be about someone else, someone known, and come
    /// from a trustworthy sender.
    fn accepts_third_party(&self, sender: &AgentId, subject: &AgentId) -> bool {
        if *subject == self.me || subject == sender {
            debug!("{}: discarding self-referential message from {}", self.me, sender);
            return false;
        }
        self.records.contains_key(subject) && self.trustworthy(sender)
    }

    fn score(&mut self, peer: &AgentId, score: Score, kind: EventKind) {
        let delta = match score {
            Score::Truth => self.config.truth_reward,
            Score::Lie => -self.config.lie_cost,
        };
        self.update(peer, |r| r.direct += delta);
        debug!(
            "{}: {:?} claim from {} scored {:?} ({:+.2})",
            self.me, kind, peer, score, delta
        );
    }

    fn update(&mut self, peer: &AgentId, apply: impl FnOnce(&mut PeerRecord)) {
        let Some(record) = self.records.get_mut(peer) else {
            return;
        };
        apply(record);
        if let Err(e) = self.store.put(record) {
            warn!("{}: failed to persist trust row for {}: {}", self.me, peer, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedgerStore;
    use approx::assert_relative_eq;
    use dropzone_env::{CollectionSite, ObjectId, ObservedBlock, RoomLayout};
    use proptest::prelude::*;

    fn ids(names: &[&str]) -> Vec<AgentId> {
        names.iter().map(|n| AgentId::from(*n)).collect()
    }

    fn red() -> VisualSignature {
        VisualSignature::new(2, "red", 0.5)
    }

    fn world() -> WorldKnowledge {
        let mut world = WorldKnowledge::default();
        for (name, x) in [("room_1", 1), ("room_2", 5)] {
            world.register_room(
                &RoomLayout {
                    name: name.to_string(),
                    door_id: ObjectId::new(format!("door_{}", name)),
                    door_location: Location::new(x, 3),
                    tiles: vec![Location::new(x, 1), Location::new(x, 2)],
                },
                name == "room_1",
            );
        }
        world.register_collection_point(&CollectionSite {
            id: ObjectId::from("drop_1"),
            signature: red(),
            location: Location::new(10, 1),
        });
        world
    }

    fn engine() -> TrustEngine {
        let mut engine = TrustEngine::new(
            AgentId::from("alice"),
            TrustConfig::default(),
            Arc::new(MemoryLedgerStore::new()),
        );
        engine.open_roster(&ids(&["alice", "bob", "carol"]));
        engine
    }

    fn direct(engine: &TrustEngine, peer: &str) -> f64 {
        engine.record(&AgentId::from(peer)).unwrap().direct
    }

    #[test]
    fn test_open_roster_skips_self() {
        let engine = engine();
        let peers: Vec<_> = engine.records().map(|r| r.peer.as_str().to_string()).collect();
        assert_eq!(peers, vec!["bob", "carol"]);
        assert!(engine.trustworthy(&AgentId::from("bob")));
        assert!(!engine.trustworthy(&AgentId::from("mallory")));
    }

    #[test]
    fn test_ledger_survives_reopen_and_resets_on_mismatch() {
        let store: Arc<dyn LedgerStore> = Arc::new(MemoryLedgerStore::new());
        let bob = AgentId::from("bob");
        let world = world();

        let mut first = TrustEngine::new(AgentId::from("alice"), TrustConfig::default(), store.clone());
        first.open_roster(&ids(&["alice", "bob", "carol"]));
        first.ingest(&bob, &Event::Searching { room: "room_2".into() }, &world);

        let mut second = TrustEngine::new(AgentId::from("alice"), TrustConfig::default(), store.clone());
        second.open_roster(&ids(&["alice", "bob", "carol"]));
        assert_relative_eq!(second.record(&bob).unwrap().direct, -0.4);

        let mut third = TrustEngine::new(AgentId::from("alice"), TrustConfig::default(), store.clone());
        third.open_roster(&ids(&["alice", "bob", "dave"]));
        assert_relative_eq!(third.record(&bob).unwrap().direct, 0.0);
        assert_eq!(store.list().unwrap().len(), 2);
    }

    #[test]
    fn test_searching_requires_matching_moving() {
        let mut engine = engine();
        let world = world();
        let bob = AgentId::from("bob");

        engine.ingest(&bob, &Event::Moving { room: "room_2".into() }, &world);
        engine.ingest(&bob, &Event::Searching { room: "room_2".into() }, &world);
        assert_relative_eq!(direct(&engine, "bob"), 0.1);

        engine.ingest(&bob, &Event::Searching { room: "room_1".into() }, &world);
        assert_relative_eq!(direct(&engine, "bob"), -0.3);
    }

    #[test]
    fn test_duplicates_are_ignored() {
        let mut engine = engine();
        let world = world();
        let bob = AgentId::from("bob");
        let lie = Event::Searching { room: "room_2".into() };

        engine.ingest(&bob, &lie, &world);
        engine.ingest(&bob, &lie, &world);
        assert_relative_eq!(direct(&engine, "bob"), -0.4);
    }

    #[test]
    fn test_opening_checked_against_door() {
        let mut engine = engine();
        let world = world();
        let bob = AgentId::from("bob");

        engine.ingest(&bob, &Event::Opening { room: "room_1".into() }, &world);
        assert_relative_eq!(direct(&engine, "bob"), 0.1);
        engine.ingest(&bob, &Event::Opening { room: "room_2".into() }, &world);
        assert_relative_eq!(direct(&engine, "bob"), -0.3);
        engine.ingest(&bob, &Event::Opening { room: "nowhere".into() }, &world);
        assert_relative_eq!(direct(&engine, "bob"), -0.7);
    }

    #[test]
    fn test_dropped_without_pickup_is_a_lie() {
        let mut engine = engine();
        let world = world();
        let bob = AgentId::from("bob");

        let dropped = crate::codec::decode(
            "Dropped goal block {shape:2,colour:red,size:0.5} at drop location (3,4)",
        );
        engine.ingest(&bob, &dropped, &world);
        assert_relative_eq!(direct(&engine, "bob"), -0.4);
    }

    #[test]
    fn test_pickup_then_drop_is_truthful_and_broadcasts_belief() {
        let mut engine = engine();
        let world = world();
        let bob = AgentId::from("bob");

        engine.ingest(&bob, &Event::Moving { room: "room_2".into() }, &world);
        let out = engine.ingest(
            &bob,
            &Event::PickingUp {
                signature: red(),
                location: Location::new(5, 1),
            },
            &world,
        );
        assert_eq!(out.len(), 1);
        match &out[0] {
            Event::TrustBelief { peer, value } => {
                assert_eq!(peer, &bob);
                assert_relative_eq!(*value, 0.06);
            }
            other => panic!("unexpected {:?}", other),
        }

        engine.ingest(
            &bob,
            &Event::Dropped {
                signature: red(),
                location: Location::new(10, 1),
            },
            &world,
        );
        assert_relative_eq!(direct(&engine, "bob"), 0.2);
    }

    #[test]
    fn test_pickup_memory_is_bounded() {
        let mut engine = engine();
        let world = world();
        let bob = AgentId::from("bob");

        for x in 0..3 {
            engine.ingest(
                &bob,
                &Event::PickingUp {
                    signature: VisualSignature::new(x, "red", 0.5),
                    location: Location::new(5, 1),
                },
                &world,
            );
        }
        assert_eq!(engine.log(&bob).unwrap().pickups.len(), 1);
    }

    #[test]
    fn test_found_validated_against_local_blocks() {
        let mut engine = engine();
        let mut world = world();
        world.observe_block(&ObservedBlock {
            id: ObjectId::from("b1"),
            signature: red(),
            location: Location::new(5, 1),
        });
        let bob = AgentId::from("bob");
        let carol = AgentId::from("carol");

        engine.ingest(&bob, &Event::Moving { room: "room_2".into() }, &world);
        engine.ingest(&bob, &Event::Searching { room: "room_2".into() }, &world);
        let out = engine.ingest(
            &bob,
            &Event::Found {
                signature: red(),
                location: Location::new(5, 1),
            },
            &world,
        );
        assert_eq!(
            out,
            vec![Event::FoundConfirmation {
                peer: bob.clone(),
                verdict: Verdict::Approved
            }]
        );
        assert_relative_eq!(direct(&engine, "bob"), 0.3);

        engine.ingest(&carol, &Event::Moving { room: "room_2".into() }, &world);
        engine.ingest(&carol, &Event::Searching { room: "room_2".into() }, &world);
        let out = engine.ingest(
            &carol,
            &Event::Found {
                signature: VisualSignature::new(0, "red", 0.5),
                location: Location::new(5, 1),
            },
            &world,
        );
        assert_eq!(
            out,
            vec![Event::FoundConfirmation {
                peer: carol.clone(),
                verdict: Verdict::Denied
            }]
        );
        assert_relative_eq!(direct(&engine, "carol"), -0.2);
    }

    #[test]
    fn test_third_party_updates() {
        let mut engine = engine();
        let world = world();
        let bob = AgentId::from("bob");
        let carol = AgentId::from("carol");

        engine.ingest(
            &bob,
            &Event::FoundConfirmation {
                peer: carol.clone(),
                verdict: Verdict::Denied,
            },
            &world,
        );
        assert_relative_eq!(engine.record(&carol).unwrap().indirect, -0.4);

        engine.ingest(&bob, &Event::TrustBelief { peer: carol.clone(), value: 0.6 }, &world);
        assert_relative_eq!(engine.record(&carol).unwrap().reputation, 0.3);

        // About the receiver, or about the sender itself: discarded.
        engine.ingest(&bob, &Event::TrustBelief { peer: AgentId::from("alice"), value: -1.0 }, &world);
        engine.ingest(&bob, &Event::TrustBelief { peer: bob.clone(), value: 5.0 }, &world);
        assert_relative_eq!(engine.record(&bob).unwrap().reputation, 0.0);
    }

    #[test]
    fn test_self_and_strangers_ignored() {
        let mut engine = engine();
        let world = world();
        engine.ingest(&AgentId::from("alice"), &Event::Searching { room: "room_1".into() }, &world);
        engine.ingest(&AgentId::from("mallory"), &Event::Searching { room: "room_1".into() }, &world);
        assert!(engine.records().all(|r| r.direct == 0.0));
    }

    #[test]
    fn test_untrusted_claims_are_filtered() {
        let mut engine = engine();
        let world = world();
        let bob = AgentId::from("bob");

        engine.ingest(&bob, &Event::Moving { room: "room_1".into() }, &world);
        engine.ingest(
            &bob,
            &Event::PickingUp {
                signature: red(),
                location: Location::new(1, 1),
            },
            &world,
        );
        assert_eq!(engine.claimed_pickup_locations(), vec![Location::new(1, 1)]);

        engine.ingest(&bob, &Event::Searching { room: "room_2".into() }, &world);
        assert!(!engine.trustworthy(&bob));
        assert!(engine.claimed_pickup_locations().is_empty());
    }

    #[test]
    fn test_hallway_claims_skip_sequencing() {
        let mut engine = engine();
        let world = world();
        let bob = AgentId::from("bob");

        engine.ingest(
            &bob,
            &Event::PickingUp {
                signature: red(),
                location: Location::new(7, 7),
            },
            &world,
        );
        assert_relative_eq!(direct(&engine, "bob"), 0.0);
        assert_eq!(engine.log(&bob).unwrap().pickups.len(), 1);

        let out = engine.ingest(
            &bob,
            &Event::Found {
                signature: red(),
                location: Location::new(8, 7),
            },
            &world,
        );
        assert!(out.is_empty());
        assert_relative_eq!(direct(&engine, "bob"), 0.0);

        // The matching drop still counts as truthful.
        engine.ingest(
            &bob,
            &Event::Dropped {
                signature: red(),
                location: Location::new(10, 1),
            },
            &world,
        );
        assert_relative_eq!(direct(&engine, "bob"), 0.1);
    }

    proptest! {
        #[test]
        fn prop_one_lie_outweighs_one_truth(
            direct in -1.0f64..1.0,
            indirect in -1.0f64..1.0,
            reputation in -1.0f64..1.0,
            honest_room in prop::sample::select(vec!["room_1", "room_2"]),
        ) {
            let store = Arc::new(MemoryLedgerStore::new());
            let bob = AgentId::from("bob");
            store.put(&PeerRecord { peer: bob.clone(), direct, indirect, reputation }).unwrap();

            let mut engine = TrustEngine::new(AgentId::from("alice"), TrustConfig::default(), store);
            engine.open_roster(&ids(&["alice", "bob"]));
            let world = world();
            let before = engine.composite(&bob).unwrap();

            let lied_about = if honest_room == "room_1" { "room_2" } else { "room_1" };
            engine.ingest(&bob, &Event::Searching { room: lied_about.into() }, &world);
            engine.ingest(&bob, &Event::Moving { room: honest_room.into() }, &world);
            engine.ingest(&bob, &Event::Searching { room: honest_room.into() }, &world);

            prop_assert!((engine.record(&bob).unwrap().direct - (direct - 0.3)).abs() < 1e-9);
            prop_assert!(engine.composite(&bob).unwrap() < before);
        }

        #[test]
        fn prop_gate_matches_composite(direct in -2.0f64..2.0, indirect in -2.0f64..2.0, reputation in -2.0f64..2.0) {
            let store = Arc::new(MemoryLedgerStore::new());
            let bob = AgentId::from("bob");
            store.put(&PeerRecord { peer: bob.clone(), direct, indirect, reputation }).unwrap();

            let mut engine = TrustEngine::new(AgentId::from("alice"), TrustConfig::default(), store);
            engine.open_roster(&[AgentId::from("alice"), bob.clone()]);
            let composite = engine.composite(&bob).unwrap();
            prop_assert_eq!(engine.trustworthy(&bob), composite >= 0.0);
        }
    }
}
