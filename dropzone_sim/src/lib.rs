//! Dropzone Deterministic Simulation Harness
//!
//! A small grid world in which whole Dropzone teams run end to end, fully
//! reproducible from a single 64-bit seed.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ScenarioRunner                         │
//! │                                                             │
//! │  ┌─────────┐   Observation   ┌────────────┐                 │
//! │  │ Oracle  │ ──────────────► │ BlockAgent │ ──► Action ──┐  │
//! │  │ (truth) │ ◄────────────────────────────────────────────┘  │
//! │  └─────────┘                 └─────┬──────┘                 │
//! │                                    │ Envelopes              │
//! │                              ┌─────▼──────┐                 │
//! │                              │  MailBus   │ (T+1 delivery)  │
//! │                              └────────────┘                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use dropzone_sim::{ScenarioRunner, SimConfig};
//! use dropzone_sim::scenarios::ScenarioId;
//!
//! let result = ScenarioRunner::new(SimConfig::default()).run(ScenarioId::Cooperative)?;
//! assert!(result.passed);
//! ```

mod error;
mod exporter;
mod navigator;
mod network;
mod oracle;
mod runner;
pub mod scenarios;
mod world;

pub use error::SimError;
pub use exporter::{AgentFrame, SimExport, SimFrame, TrustRow};
pub use navigator::GridNavigator;
pub use network::{BusEndpoint, BusStats, MailBus};
pub use oracle::{AgentBody, GroundTruthBlock, Oracle};
pub use runner::{AgentSummary, ScenarioResult, ScenarioRunner};
pub use world::{FloorPlan, Layout, LayoutBuilder, SimConfig};
