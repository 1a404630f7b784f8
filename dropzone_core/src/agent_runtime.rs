//! Agent Runtime - wires the Dropzone engines into one per-tick call.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        BlockAgent                           │
//! │                                                             │
//! │  Observation ──► WORLD KNOWLEDGE ◄── trusted claims ──┐     │
//! │                        │                              │     │
//! │  inbox ──► CODEC ──► TRUST ENGINE ──► confirmations ──┼──┐  │
//! │                        │                              │  │  │
//! │                  TASK-PHASE CONTROLLER ──► Action     │  │  │
//! │                        │                              │  │  │
//! │                     reports ──► POLICY ──► CODEC ──► outbox │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dropzone_core::{AgentConfig, BlockAgent, MemoryLedgerStore, PolicyKind};
//! use std::sync::Arc;
//!
//! let config = AgentConfig::named("alice", 7);
//! let policy = PolicyKind::Cooperative.build(config.seed);
//! let mut agent = BlockAgent::new(config, policy, navigator, Arc::new(MemoryLedgerStore::new()));
//!
//! let out = agent.tick(&observation, &inbox);
//! ```

use crate::codec::{self, Event};
use crate::config::AgentConfig;
use crate::controller::{ControllerConfig, Decision, Phase, TaskController};
use crate::ledger::LedgerStore;
use crate::policy::{AgentPolicy, PolicyKind, ReportContext};
use crate::trust::TrustEngine;
use crate::world::WorldKnowledge;
use dropzone_env::{Action, AgentId, Envelope, MessageTransport, Navigator, Observation};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Everything an agent hands back for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutput {
    pub action: Action,
    pub outbox: Vec<Envelope>,
}

/// A block-delivery agent.
///
/// Generic over the navigator so the same agent runs against the grid
/// simulator or a scripted test double.
pub struct BlockAgent<N: Navigator> {
    /// Agent identifier
    id: AgentId,

    /// Configuration
    config: AgentConfig,

    /// World Knowledge Store
    world: WorldKnowledge,

    /// Trust & Reputation Engine
    trust: TrustEngine,

    /// Task-Phase Controller
    controller: TaskController,

    /// Variant behaviour
    policy: Box<dyn AgentPolicy>,

    /// Path executor
    navigator: N,

    /// Rooms, collection points and ledger registered
    ready: bool,

    /// Current tick number
    tick_count: u64,
}

impl<N: Navigator> BlockAgent<N> {
    /// Creates an agent. Setup happens on the first tick, once the roster
    /// and layout are visible.
    pub fn new(
        config: AgentConfig,
        policy: Box<dyn AgentPolicy>,
        navigator: N,
        store: Arc<dyn LedgerStore>,
    ) -> Self {
        let id = AgentId::new(config.name.clone());
        let controller = TaskController::new(
            ControllerConfig {
                door_approach: config.door_approach,
                transition_cap: config.transition_cap.max(1),
                rescan_when_exhausted: config.rescan_when_exhausted,
            },
            config.seed,
        );

        Self {
            trust: TrustEngine::new(id.clone(), config.trust.clone(), store),
            world: WorldKnowledge::new(policy.attribute_mask()),
            id,
            config,
            controller,
            policy,
            navigator,
            ready: false,
            tick_count: 0,
        }
    }

    pub fn id(&self) -> &AgentId {
        &self.id
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn kind(&self) -> PolicyKind {
        self.policy.kind()
    }

    pub fn policy(&self) -> &dyn AgentPolicy {
        self.policy.as_ref()
    }

    pub fn phase(&self) -> Phase {
        self.controller.phase()
    }

    pub fn world(&self) -> &WorldKnowledge {
        &self.world
    }

    pub fn trust(&self) -> &TrustEngine {
        &self.trust
    }

    /// Returns the current tick count.
    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Runs one decision: refresh, ingest peer messages, decide, report.
    ///
    /// Always returns a well-formed action, `Idle` when there is nothing to do.
    pub fn tick(&mut self, observation: &Observation, inbox: &[Envelope]) -> TickOutput {
        self.tick_count += 1;
        if !self.ready {
            self.setup(observation);
        }

        let new_goals = self.world.refresh(observation);
        if !new_goals.is_empty() {
            debug!("{}: spotted goal blocks {:?}", self.id, new_goals);
        }

        let mut received = HashSet::new();
        let mut replies = Vec::new();
        for envelope in inbox {
            if !envelope.is_for(&self.id) {
                continue;
            }
            received.insert(envelope.content.trim().to_string());
            let event = codec::decode(&envelope.content);
            if event.is_invalid() {
                debug!("{}: dropping malformed message from {}", self.id, envelope.sender);
                continue;
            }
            replies.extend(self.trust.ingest(&envelope.sender, &event, &self.world));
            self.apply_claim(&envelope.sender, &event);
        }

        let mut reports = Vec::new();
        let action = self.controller.decide(&mut Decision {
            observation,
            world: &mut self.world,
            trust: &self.trust,
            policy: self.policy.as_mut(),
            navigator: &mut self.navigator,
            reports: &mut reports,
        });

        if let Some(room) = self.controller.searching_room().map(str::to_string) {
            for block in self.world.take_unannounced_goals(&room) {
                reports.push(Event::Found {
                    signature: block.signature,
                    location: block.location,
                });
            }
        }

        let outbox = self.compose(reports.into_iter().chain(replies), &received);
        TickOutput { action, outbox }
    }

    /// Runs one tick against a transport: drains the mailbox and sends the
    /// outbox. Send failures are logged.
    pub fn tick_with<T: MessageTransport>(&mut self, observation: &Observation, transport: &mut T) -> Action {
        let inbox = transport.drain();
        let output = self.tick(observation, &inbox);
        for envelope in output.outbox {
            if let Err(e) = transport.send(envelope) {
                warn!("{}: failed to send report: {}", self.id, e);
            }
        }
        output.action
    }

    fn setup(&mut self, observation: &Observation) {
        for room in &observation.rooms {
            let open = observation
                .doors
                .iter()
                .any(|d| d.id == room.door_id && d.is_open);
            self.world.register_room(room, open);
        }
        for site in &observation.collection_sites {
            self.world.register_collection_point(site);
        }
        self.trust.open_roster(&observation.team);
        self.ready = true;
        info!(
            "{} ({}) ready: {} rooms, {} collection points",
            self.id,
            self.policy.kind(),
            self.world.rooms().len(),
            self.world.collection_points().len()
        );
    }

    /// Feeds a trusted peer's claim into the world store.
    fn apply_claim(&mut self, sender: &AgentId, event: &Event) {
        if !self.trust.trustworthy(sender) {
            return;
        }
        match event {
            Event::Found { signature, location } => {
                self.world.report_block(sender, signature, location);
            }
            Event::Dropped { signature, location } => {
                self.world.note_peer_delivery(sender, signature, location);
            }
            _ => {}
        }
    }

    /// Policy rewrite, encoding, and de-duplication against this tick's inbox
    /// and against itself.
    fn compose(&mut self, events: impl IntoIterator<Item = Event>, received: &HashSet<String>) -> Vec<Envelope> {
        let mut sent = HashSet::new();
        let mut outbox = Vec::new();
        for event in events {
            let ctx = ReportContext {
                me: &self.id,
                world: &self.world,
            };
            let event = self.policy.report_transform(event, &ctx);
            let Some(text) = codec::encode(&event) else {
                continue;
            };
            if received.contains(&text) || !sent.insert(text.clone()) {
                continue;
            }
            outbox.push(Envelope::broadcast(self.id.clone(), text));
        }
        outbox
    }
}
