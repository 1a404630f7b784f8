//! Error types for the Dropzone environment abstraction.

use thiserror::Error;

/// Errors that can occur in the environment abstraction layer.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Unicast addressed to an agent that is not on the bus
    #[error("Unknown recipient: {0}")]
    UnknownRecipient(String),

    /// Sender is not registered on the bus
    #[error("Unknown sender: {0}")]
    UnknownSender(String),
}

impl EnvError {
    /// Creates an unknown-recipient error.
    pub fn unknown_recipient(agent: impl std::fmt::Display) -> Self {
        Self::UnknownRecipient(agent.to_string())
    }

    /// Creates an unknown-sender error.
    pub fn unknown_sender(agent: impl std::fmt::Display) -> Self {
        Self::UnknownSender(agent.to_string())
    }
}
