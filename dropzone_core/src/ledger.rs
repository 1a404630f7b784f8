//! Trust ledger persistence.
//!
//! One ledger per agent, one row per peer. The engine owns the in-memory
//! copy; stores only make it durable.

use dropzone_env::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

/// Ledger storage errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Corrupt ledger row for {peer}: {reason}")]
    CorruptRow { peer: String, reason: String },
}

impl LedgerError {
    fn storage(context: &str, err: impl std::fmt::Display) -> Self {
        Self::StorageError(format!("{}: {}", context, err))
    }
}

/// One trust ledger row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub peer: AgentId,

    /// Claims this agent could check for itself
    pub direct: f64,

    /// Other agents' confirmations about this peer
    pub indirect: f64,

    /// Broadcast trust beliefs about this peer
    pub reputation: f64,
}

impl PeerRecord {
    /// A fresh row with every component at `neutral`.
    pub fn neutral(peer: AgentId, neutral: f64) -> Self {
        Self {
            peer,
            direct: neutral,
            indirect: neutral,
            reputation: neutral,
        }
    }
}

/// Trait for persistent trust ledger storage
///
/// Implementations must be thread-safe; rows are keyed by peer name.
pub trait LedgerStore: Send + Sync {
    /// Load one row
    fn get(&self, peer: &AgentId) -> Result<Option<PeerRecord>, LedgerError>;

    /// Insert or overwrite one row
    fn put(&self, record: &PeerRecord) -> Result<(), LedgerError>;

    /// Load every row, ordered by peer name
    fn list(&self) -> Result<Vec<PeerRecord>, LedgerError>;

    /// Remove every row
    fn clear(&self) -> Result<(), LedgerError>;
}

/// Sled-based persistent ledger
///
/// Each agent gets its own tree inside the database, so a whole team can
/// share one database directory.
pub struct SledLedgerStore {
    tree: sled::Tree,
}

impl SledLedgerStore {
    /// Open a persistent store at the given path for one agent
    pub fn open<P: AsRef<Path>>(path: P, agent: &AgentId) -> Result<Self, LedgerError> {
        let db = sled::open(path).map_err(|e| LedgerError::storage("Failed to open sled DB", e))?;
        Self::from_db(&db, agent)
    }

    /// Open the agent's tree inside an already opened database
    pub fn from_db(db: &sled::Db, agent: &AgentId) -> Result<Self, LedgerError> {
        let tree = db
            .open_tree(format!("ledger/{}", agent))
            .map_err(|e| LedgerError::storage("Failed to open ledger tree", e))?;
        Ok(Self { tree })
    }

    /// Create a temporary store (for testing)
    #[cfg(test)]
    pub fn open_temp(agent: &AgentId) -> Result<Self, LedgerError> {
        let db = sled::Config::new()
            .temporary(true)
            .open()
            .map_err(|e| LedgerError::storage("Failed to open temp DB", e))?;
        Self::from_db(&db, agent)
    }

    fn decode_row(key: &[u8], value: &[u8]) -> Result<PeerRecord, LedgerError> {
        serde_json::from_slice(value).map_err(|e| LedgerError::CorruptRow {
            peer: String::from_utf8_lossy(key).into_owned(),
            reason: e.to_string(),
        })
    }
}

impl LedgerStore for SledLedgerStore {
    fn get(&self, peer: &AgentId) -> Result<Option<PeerRecord>, LedgerError> {
        let key = peer.as_str().as_bytes();
        match self.tree.get(key).map_err(|e| LedgerError::storage("Get failed", e))? {
            Some(value) => Ok(Some(Self::decode_row(key, &value)?)),
            None => Ok(None),
        }
    }

    fn put(&self, record: &PeerRecord) -> Result<(), LedgerError> {
        let value = serde_json::to_vec(record).map_err(|e| LedgerError::storage("Encode failed", e))?;
        self.tree
            .insert(record.peer.as_str().as_bytes(), value)
            .map_err(|e| LedgerError::storage("Insert failed", e))?;
        self.tree.flush().map_err(|e| LedgerError::storage("Flush failed", e))?;
        Ok(())
    }

    fn list(&self) -> Result<Vec<PeerRecord>, LedgerError> {
        let mut rows = Vec::new();
        for result in self.tree.iter() {
            let (key, value) = result.map_err(|e| LedgerError::storage("Iteration failed", e))?;
            rows.push(Self::decode_row(&key, &value)?);
        }
        Ok(rows)
    }

    fn clear(&self) -> Result<(), LedgerError> {
        self.tree.clear().map_err(|e| LedgerError::storage("Clear failed", e))?;
        self.tree.flush().map_err(|e| LedgerError::storage("Flush failed", e))?;
        Ok(())
    }
}

/// In-memory ledger for tests and simulation runs.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    rows: Mutex<BTreeMap<AgentId, PeerRecord>>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<AgentId, PeerRecord>>, LedgerError> {
        self.rows
            .lock()
            .map_err(|_| LedgerError::StorageError("ledger mutex poisoned".to_string()))
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn get(&self, peer: &AgentId) -> Result<Option<PeerRecord>, LedgerError> {
        Ok(self.lock()?.get(peer).cloned())
    }

    fn put(&self, record: &PeerRecord) -> Result<(), LedgerError> {
        self.lock()?.insert(record.peer.clone(), record.clone());
        Ok(())
    }

    fn list(&self) -> Result<Vec<PeerRecord>, LedgerError> {
        Ok(self.lock()?.values().cloned().collect())
    }

    fn clear(&self) -> Result<(), LedgerError> {
        self.lock()?.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exercise(store: &dyn LedgerStore) {
        let bob = AgentId::from("bob");
        assert!(store.get(&bob).unwrap().is_none());

        let mut row = PeerRecord::neutral(bob.clone(), 0.0);
        store.put(&row).unwrap();
        row.direct = -0.4;
        store.put(&row).unwrap();
        store.put(&PeerRecord::neutral(AgentId::from("alice"), 0.0)).unwrap();

        assert_eq!(store.get(&bob).unwrap(), Some(row));
        let names: Vec<_> = store.list().unwrap().into_iter().map(|r| r.peer).collect();
        assert_eq!(names, vec![AgentId::from("alice"), bob.clone()]);

        store.clear().unwrap();
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn test_memory_store() {
        exercise(&MemoryLedgerStore::new());
    }

    #[test]
    fn test_sled_store() {
        let store = SledLedgerStore::open_temp(&AgentId::from("carol")).unwrap();
        exercise(&store);
    }

    #[test]
    fn test_sled_trees_are_per_agent() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let carol = SledLedgerStore::from_db(&db, &AgentId::from("carol")).unwrap();
        let dave = SledLedgerStore::from_db(&db, &AgentId::from("dave")).unwrap();

        carol.put(&PeerRecord::neutral(AgentId::from("bob"), 0.0)).unwrap();
        assert_eq!(carol.list().unwrap().len(), 1);
        assert!(dave.list().unwrap().is_empty());
    }

    #[test]
    fn test_sled_corrupt_row_is_reported() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = SledLedgerStore::from_db(&db, &AgentId::from("carol")).unwrap();
        db.open_tree("ledger/carol").unwrap().insert("bob", "not json").unwrap();

        assert!(matches!(
            store.get(&AgentId::from("bob")),
            Err(LedgerError::CorruptRow { .. })
        ));
    }
}
