//! Scenario runner - drives a team through a grid-world scenario.

use crate::error::SimError;
use crate::exporter::{AgentFrame, SimExport, SimFrame, TrustRow};
use crate::navigator::GridNavigator;
use crate::network::{BusEndpoint, BusStats, MailBus};
use crate::oracle::Oracle;
use crate::scenarios::{ScenarioId, TeamMember};
use crate::world::SimConfig;

use dropzone_core::{
    AgentConfig, AgentPolicy, BlockAgent, LedgerError, LedgerStore, MemoryLedgerStore, Phase, PolicyKind,
    SledLedgerStore,
};
use dropzone_env::AgentId;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Final state of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSummary {
    pub name: String,
    pub variant: PolicyKind,
    pub phase: Phase,
    pub ticks: u64,
}

/// Results from running a scenario.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioResult {
    /// Scenario that was run
    pub scenario: ScenarioId,

    /// Seed used
    pub seed: u64,

    /// Every collection site held a matching block at the end
    pub passed: bool,

    /// Total ticks executed
    pub total_ticks: u64,

    /// Collection sites satisfied at the end
    pub deliveries: usize,

    /// Collection sites in the layout
    pub sites: usize,

    /// Failure message if any
    pub failure_reason: Option<String>,

    /// Bus traffic
    pub messages: BusStats,

    pub agents: Vec<AgentSummary>,

    /// Every agent's view of every peer
    pub trust: Vec<TrustRow>,
}

impl ScenarioResult {
    /// Composite trust `observer` holds in `peer`.
    pub fn composite(&self, observer: &str, peer: &str) -> Option<f64> {
        self.trust
            .iter()
            .find(|row| row.observer == observer && row.peer == peer)
            .map(|row| row.composite)
    }
}

/// A team member wired to the bus.
struct Member {
    variant: PolicyKind,
    agent: BlockAgent<GridNavigator>,
    endpoint: BusEndpoint,
}

/// Runs team scenarios.
pub struct ScenarioRunner {
    config: SimConfig,

    /// Overrides the scenario's own team
    team: Option<Vec<TeamMember>>,

    /// Sled database holding every agent's ledger; in-memory when unset
    ledger_dir: Option<PathBuf>,
}

impl ScenarioRunner {
    /// Creates a new scenario runner.
    pub fn new(config: SimConfig) -> Self {
        Self {
            config,
            team: None,
            ledger_dir: None,
        }
    }

    /// Sets the tick budget.
    pub fn with_ticks(mut self, max_ticks: u64) -> Self {
        self.config.max_ticks = max_ticks;
        self
    }

    /// Replaces the scenario's team.
    pub fn with_team(mut self, team: Vec<TeamMember>) -> Self {
        self.team = Some(team);
        self
    }

    /// Persists trust ledgers in a sled database at `dir`, so trust carries
    /// over between runs with the same team.
    pub fn with_ledger_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.ledger_dir = Some(dir.into());
        self
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Runs a scenario and returns the result.
    pub fn run(&self, scenario: ScenarioId) -> Result<ScenarioResult, SimError> {
        self.execute(scenario, None)
    }

    /// Runs a scenario, recording one frame per tick.
    pub fn run_with_export(&self, scenario: ScenarioId) -> Result<(ScenarioResult, SimExport), SimError> {
        let mut export = SimExport::new(scenario.name(), self.config.seed);
        let result = self.execute(scenario, Some(&mut export))?;
        export.finalize(result.passed, result.trust.clone());
        Ok((result, export))
    }

    fn execute(&self, scenario: ScenarioId, mut export: Option<&mut SimExport>) -> Result<ScenarioResult, SimError> {
        info!("Starting scenario: {} (seed={})", scenario.name(), self.config.seed);

        let plan = scenario.plan();
        let team = self.team.clone().unwrap_or_else(|| plan.team.clone());
        if team.is_empty() {
            return Err(SimError::layout("scenario team is empty"));
        }

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let mut oracle = Oracle::new(plan.layout()?, self.config.sense_radius);
        plan.populate(&mut oracle, &mut rng)?;

        let bus = MailBus::new(team.iter().map(|m| AgentId::new(m.name.clone())));
        let db = match &self.ledger_dir {
            Some(dir) => Some(sled::open(dir).map_err(|e| LedgerError::StorageError(e.to_string()))?),
            None => None,
        };
        let spawns = oracle.layout().spawn_points.clone();
        let floor = Arc::clone(&oracle.layout().plan);

        let mut members = Vec::with_capacity(team.len());
        for (i, member) in team.iter().enumerate() {
            let seed: u64 = rng.gen();
            let id = AgentId::new(member.name.clone());
            let policy = member.variant.build(seed);
            let spawn = spawns[i % spawns.len()];
            oracle.spawn_agent(id.clone(), spawn, policy.max_carry())?;

            let store: Arc<dyn LedgerStore> = match &db {
                Some(db) => Arc::new(SledLedgerStore::from_db(db, &id)?),
                None => Arc::new(MemoryLedgerStore::new()),
            };
            let agent = BlockAgent::new(
                AgentConfig::named(member.name.clone(), seed),
                policy,
                GridNavigator::new(Arc::clone(&floor)),
                store,
            );
            members.push(Member {
                variant: member.variant,
                agent,
                endpoint: bus.endpoint(id)?,
            });
            debug!("Spawned {} ({}) at {}", member.name, member.variant, spawn);
        }

        let mut ticks = 0;
        while ticks < self.config.max_ticks && !finished(&oracle, &members) {
            for member in members.iter_mut() {
                let id = member.agent.id().clone();
                let observation = oracle.observe(&id)?;
                let action = member.agent.tick_with(&observation, &mut member.endpoint);
                if let Err(e) = oracle.apply(&id, &action) {
                    debug!("tick {}: {}", ticks, e);
                }
            }
            let delivered = bus.deliver();
            oracle.advance();
            ticks += 1;

            if let Some(export) = export.as_deref_mut() {
                export.add_frame(frame(ticks, &oracle, &members, delivered));
            }
        }

        let deliveries = oracle.satisfied_sites();
        let sites = oracle.layout().sites.len();
        let passed = deliveries == sites;
        let failure_reason = (!passed).then(|| {
            format!("{}/{} collection sites satisfied after {} ticks", deliveries, sites, ticks)
        });
        if passed {
            info!("{}: all {} sites satisfied in {} ticks", scenario.name(), sites, ticks);
        } else {
            warn!("{}: {}", scenario.name(), failure_reason.as_deref().unwrap_or("failed"));
        }

        Ok(ScenarioResult {
            scenario,
            seed: self.config.seed,
            passed,
            total_ticks: ticks,
            deliveries,
            sites,
            failure_reason,
            messages: bus.stats(),
            agents: members
                .iter()
                .map(|m| AgentSummary {
                    name: m.agent.id().to_string(),
                    variant: m.variant,
                    phase: m.agent.phase(),
                    ticks: m.agent.tick_count(),
                })
                .collect(),
            trust: trust_table(&members),
        })
    }
}

/// Every site is satisfied, nobody holds a block, and every agent that
/// re-sorts on completion has done so.
fn finished(oracle: &Oracle, members: &[Member]) -> bool {
    oracle.all_sites_satisfied()
        && oracle.agents().iter().all(|a| a.carrying.is_empty())
        && members.iter().all(|m| match m.agent.phase() {
            Phase::PlanCleanup | Phase::Cleanup => false,
            Phase::Done => true,
            _ => !m.agent.policy().reorders_on_completion(),
        })
}

fn frame(tick: u64, oracle: &Oracle, members: &[Member], messages: usize) -> SimFrame {
    let agents = members
        .iter()
        .filter_map(|m| {
            let body = oracle.agent(m.agent.id())?;
            Some(AgentFrame {
                name: body.id.to_string(),
                variant: m.variant.to_string(),
                location: body.location,
                phase: m.agent.phase().to_string(),
                carrying: body.carrying.len(),
            })
        })
        .collect();

    SimFrame {
        tick,
        satisfied_sites: oracle.satisfied_sites(),
        agents,
        messages,
    }
}

fn trust_table(members: &[Member]) -> Vec<TrustRow> {
    let mut rows = Vec::new();
    for member in members {
        let trust = member.agent.trust();
        for record in trust.records() {
            rows.push(TrustRow {
                observer: member.agent.id().to_string(),
                peer: record.peer.to_string(),
                direct: record.direct,
                indirect: record.indirect,
                reputation: record.reputation,
                composite: trust.composite(&record.peer).unwrap_or(record.direct),
            });
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_is_deterministic() {
        let runner = ScenarioRunner::new(SimConfig {
            seed: 3,
            max_ticks: 60,
            sense_radius: 1,
        });
        let a = runner.run(ScenarioId::Cooperative).unwrap();
        let b = runner.run(ScenarioId::Cooperative).unwrap();

        assert_eq!(a.total_ticks, b.total_ticks);
        assert_eq!(a.messages, b.messages);
        assert_eq!(a.trust, b.trust);
        assert_eq!(a.agents, b.agents);
    }

    #[test]
    fn test_empty_team_is_rejected() {
        let runner = ScenarioRunner::new(SimConfig::default()).with_team(Vec::new());
        assert!(matches!(runner.run(ScenarioId::Cooperative), Err(SimError::Layout(_))));
    }

    #[test]
    fn test_export_has_one_frame_per_tick() {
        let runner = ScenarioRunner::new(SimConfig::default()).with_ticks(25);
        let (result, export) = runner.run_with_export(ScenarioId::Resort).unwrap();

        assert_eq!(export.frames.len() as u64, result.total_ticks);
        assert_eq!(export.frames[0].agents.len(), 2);
        assert_eq!(export.trust.len(), 2);
        assert!(result.messages.sent > 0);
    }

    #[test]
    fn test_ledger_dir_persists_final_trust() {
        let dir = std::env::temp_dir().join(format!("dropzone-ledger-{}", std::process::id()));
        let runner = ScenarioRunner::new(SimConfig::default())
            .with_ticks(200)
            .with_ledger_dir(&dir);
        let result = runner.run(ScenarioId::Deception).unwrap();

        {
            let db = sled::open(&dir).unwrap();
            let store = SledLedgerStore::from_db(&db, &AgentId::from("alice")).unwrap();
            let rows = store.list().unwrap();
            assert_eq!(rows.len(), 2);
            for row in rows {
                let final_row = result
                    .trust
                    .iter()
                    .find(|t| t.observer == "alice" && t.peer == row.peer.as_str())
                    .unwrap();
                assert_eq!(row.direct, final_row.direct);
            }
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}
