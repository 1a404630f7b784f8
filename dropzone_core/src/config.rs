//! Agent and trust configuration.

use serde::{Deserialize, Serialize};

/// Trust & reputation tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Starting value of every ledger component
    pub neutral: f64,

    /// Added for a claim that checks out
    pub truth_reward: f64,

    /// Subtracted for a claim that does not
    pub lie_cost: f64,

    pub direct_weight: f64,
    pub indirect_weight: f64,
    pub reputation_weight: f64,

    /// Divisor of the weighted sum
    pub normaliser: f64,

    /// Composite trust at or above this passes the gate
    pub threshold: f64,

    /// Pick-up claims remembered per peer before the memory restarts
    pub max_remembered_pickups: usize,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            neutral: 0.0,
            truth_reward: 0.1,
            lie_cost: 0.4,
            direct_weight: 3.0,
            indirect_weight: 1.0,
            reputation_weight: 1.0,
            normaliser: 5.0,
            threshold: 0.0,
            max_remembered_pickups: 2,
        }
    }
}

/// Configuration for a Dropzone agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Agent's logical name (also the ledger key)
    pub name: String,

    /// Seed for room choice and policy coin flips
    pub seed: u64,

    /// Offset from a door to the tile an agent waits on before entering
    pub door_approach: (i32, i32),

    /// Phase transitions allowed within one tick before giving up with a no-op
    pub transition_cap: usize,

    /// Reset exploration once every room is explored but work remains
    pub rescan_when_exhausted: bool,

    pub trust: TrustConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: "dropzone-agent".to_string(),
            seed: 0,
            door_approach: (0, 1),
            transition_cap: 24,
            rescan_when_exhausted: true,
            trust: TrustConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Default configuration with the given name and seed.
    pub fn named(name: impl Into<String>, seed: u64) -> Self {
        Self {
            name: name.into(),
            seed,
            ..Self::default()
        }
    }
}
