//! Error types for the simulation harness.

use thiserror::Error;

/// Errors raised by the simulator.
#[derive(Debug, Error)]
pub enum SimError {
    /// A scenario layout is inconsistent
    #[error("Layout error: {0}")]
    Layout(String),

    /// The oracle refused an agent's action
    #[error("Action rejected for {agent}: {reason}")]
    ActionRejected { agent: String, reason: String },

    /// No such agent body in the oracle
    #[error("Unknown agent: {0}")]
    UnknownAgent(String),

    /// Message bus refused a registration or envelope
    #[error("Transport error: {0}")]
    Transport(#[from] dropzone_env::EnvError),

    /// Trust ledger database could not be opened
    #[error("Ledger error: {0}")]
    Ledger(#[from] dropzone_core::LedgerError),

    #[error("Export I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Export serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SimError {
    pub fn layout(msg: impl Into<String>) -> Self {
        Self::Layout(msg.into())
    }

    pub fn rejected(agent: impl std::fmt::Display, reason: impl Into<String>) -> Self {
        Self::ActionRejected {
            agent: agent.to_string(),
            reason: reason.into(),
        }
    }
}
