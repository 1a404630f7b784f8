//! Message transport abstraction between agents.

use crate::error::EnvError;
use crate::types::AgentId;
use serde::{Deserialize, Serialize};

/// An opaque text message on the team bus.
///
/// `recipient == None` means broadcast to every other team member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub content: String,
    pub sender: AgentId,
    pub recipient: Option<AgentId>,
}

impl Envelope {
    /// Creates a broadcast envelope.
    pub fn broadcast(sender: AgentId, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sender,
            recipient: None,
        }
    }

    /// Creates a unicast envelope.
    pub fn unicast(sender: AgentId, recipient: AgentId, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            sender,
            recipient: Some(recipient),
        }
    }

    /// Returns true if `agent` should receive this envelope.
    pub fn is_for(&self, agent: &AgentId) -> bool {
        if &self.sender == agent {
            return false;
        }
        match &self.recipient {
            Some(recipient) => recipient == agent,
            None => true,
        }
    }
}

/// Mailbox-style transport seen from one agent.
///
/// # Delivery
///
/// Messages sent during tick `T` become visible to recipients from tick
/// `T + 1`; each message instance is drained at most once.
pub trait MessageTransport {
    /// This agent's id.
    fn local_id(&self) -> &AgentId;

    /// Queues an envelope for delivery.
    ///
    /// # Returns
    /// * `Err(EnvError::UnknownRecipient)` - unicast to an agent not on the bus
    fn send(&mut self, envelope: Envelope) -> Result<(), EnvError>;

    /// Takes every envelope deliverable to this agent now.
    fn drain(&mut self) -> Vec<Envelope>;
}
