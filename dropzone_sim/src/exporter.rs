//! JSON exporter for run replays.
//!
//! Exports per-tick frames plus the final trust table.

use dropzone_env::Location;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::error::SimError;

/// A single frame of simulation data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimFrame {
    /// Tick the frame was taken after
    pub tick: u64,

    /// Collection sites holding a matching block
    pub satisfied_sites: usize,

    /// Agent states
    pub agents: Vec<AgentFrame>,

    /// Envelope copies delivered at the end of this tick
    #[serde(default, skip_serializing_if = "is_zero")]
    pub messages: usize,
}

fn is_zero(n: &usize) -> bool {
    *n == 0
}

/// Agent frame data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFrame {
    pub name: String,
    pub variant: String,
    pub location: Location,
    pub phase: String,
    pub carrying: usize,
}

/// One agent's view of one peer at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrustRow {
    pub observer: String,
    pub peer: String,
    pub direct: f64,
    pub indirect: f64,
    pub reputation: f64,
    pub composite: f64,
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Ticks simulated
    pub ticks: u64,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    /// Final trust table
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub trust: Vec<TrustRow>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            ticks: 0,
            frames: Vec::new(),
            passed: false,
            trust: Vec::new(),
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.ticks = frame.tick;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, trust: Vec<TrustRow>) {
        self.passed = passed;
        self.trust = trust;
    }

    /// Writes to a JSON file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), SimError> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_json_shape() {
        let mut export = SimExport::new("cooperative", 7);
        export.add_frame(SimFrame {
            tick: 1,
            satisfied_sites: 0,
            agents: vec![AgentFrame {
                name: "alice".to_string(),
                variant: "cooperative".to_string(),
                location: Location::new(0, 7),
                phase: "FollowExplore".to_string(),
                carrying: 0,
            }],
            messages: 0,
        });
        export.finalize(false, Vec::new());

        let json: serde_json::Value = serde_json::to_value(&export).unwrap();
        assert_eq!(json["ticks"], 1);
        assert_eq!(json["frames"][0]["agents"][0]["location"]["y"], 7);
        assert!(json["frames"][0].get("messages").is_none());
        assert!(json.get("trust").is_none());
    }
}
