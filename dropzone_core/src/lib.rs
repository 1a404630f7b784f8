//! Dropzone Core - decision logic for cooperative block-delivery agents
//!
//! A team of agents explores rooms, finds blocks matching the collection
//! points' signatures, and delivers them. The core answers three questions
//! every tick:
//! 1. **What is out there?** World knowledge built from partial observations
//! 2. **Whom can I believe?** A persistent trust ledger scored from peer claims
//! 3. **What do I do next?** A phase machine that yields exactly one action
//!
//! Variant behaviours (lazy, lying, strong, colour-blind) are policies
//! plugged into the same agent.

pub mod agent_runtime;
pub mod codec;
pub mod config;
pub mod controller;
pub mod ledger;
pub mod policy;
pub mod trust;
pub mod world;

// Re-export key types for convenience
pub use agent_runtime::{BlockAgent, TickOutput};
pub use codec::{decode, encode, Event, EventKind, Verdict};
pub use config::{AgentConfig, TrustConfig};
pub use controller::{ControllerConfig, Phase, TaskController};
pub use ledger::{LedgerError, LedgerStore, MemoryLedgerStore, PeerRecord, SledLedgerStore};
pub use policy::{AgentPolicy, PolicyKind};
pub use trust::TrustEngine;
pub use world::{AttributeMask, CollectionPoint, KnownBlock, Provenance, WorldKnowledge};
