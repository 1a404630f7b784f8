//! Simulated team message bus.
//!
//! Envelopes sent during a tick are held until [`MailBus::deliver`] runs at
//! the end of that tick, so recipients see them from the next tick on.

use dropzone_env::{AgentId, EnvError, Envelope, MessageTransport};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Traffic counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Envelopes accepted from senders
    pub sent: u64,
    /// Envelope copies placed in mailboxes
    pub delivered: u64,
}

#[derive(Debug, Default)]
struct BusState {
    outgoing: Vec<Envelope>,
    mailboxes: BTreeMap<AgentId, Vec<Envelope>>,
    stats: BusStats,
}

/// Shared mailbox router for one team.
#[derive(Debug, Clone)]
pub struct MailBus {
    state: Arc<Mutex<BusState>>,
}

fn lock(state: &Mutex<BusState>) -> MutexGuard<'_, BusState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MailBus {
    /// Creates a bus with one mailbox per roster member.
    pub fn new(roster: impl IntoIterator<Item = AgentId>) -> Self {
        let state = BusState {
            mailboxes: roster.into_iter().map(|id| (id, Vec::new())).collect(),
            ..BusState::default()
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Returns the transport handle for a roster member.
    pub fn endpoint(&self, id: AgentId) -> Result<BusEndpoint, EnvError> {
        if !lock(&self.state).mailboxes.contains_key(&id) {
            return Err(EnvError::unknown_sender(&id));
        }
        Ok(BusEndpoint {
            local_id: id,
            state: Arc::clone(&self.state),
        })
    }

    /// Moves this tick's envelopes into the recipients' mailboxes.
    ///
    /// Returns the number of copies delivered.
    pub fn deliver(&self) -> usize {
        let mut state = lock(&self.state);
        let outgoing = std::mem::take(&mut state.outgoing);
        let mut copies = 0;
        for envelope in outgoing {
            for (member, mailbox) in state.mailboxes.iter_mut() {
                if envelope.is_for(member) {
                    mailbox.push(envelope.clone());
                    copies += 1;
                }
            }
        }
        state.stats.delivered += copies as u64;
        copies
    }

    pub fn stats(&self) -> BusStats {
        lock(&self.state).stats
    }
}

/// One agent's view of the [`MailBus`].
#[derive(Debug)]
pub struct BusEndpoint {
    local_id: AgentId,
    state: Arc<Mutex<BusState>>,
}

impl MessageTransport for BusEndpoint {
    fn local_id(&self) -> &AgentId {
        &self.local_id
    }

    fn send(&mut self, envelope: Envelope) -> Result<(), EnvError> {
        if envelope.sender != self.local_id {
            return Err(EnvError::unknown_sender(&envelope.sender));
        }
        let mut state = lock(&self.state);
        if let Some(recipient) = &envelope.recipient {
            if !state.mailboxes.contains_key(recipient) {
                return Err(EnvError::unknown_recipient(recipient));
            }
        }
        state.outgoing.push(envelope);
        state.stats.sent += 1;
        Ok(())
    }

    fn drain(&mut self) -> Vec<Envelope> {
        lock(&self.state)
            .mailboxes
            .get_mut(&self.local_id)
            .map(std::mem::take)
            .unwrap_or_default()
    }
}
