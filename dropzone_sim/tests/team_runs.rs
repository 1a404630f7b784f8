//! End-to-end team runs through the grid world.

use dropzone_core::{Phase, PolicyKind};
use dropzone_sim::scenarios::{ScenarioId, TeamMember};
use dropzone_sim::{ScenarioRunner, SimConfig};

fn runner(seed: u64) -> ScenarioRunner {
    ScenarioRunner::new(SimConfig {
        seed,
        max_ticks: 2000,
        sense_radius: 1,
    })
}

#[test]
fn cooperative_team_fills_every_site() {
    let result = runner(42).run(ScenarioId::Cooperative).unwrap();

    assert!(result.passed, "{:?}", result.failure_reason);
    assert_eq!(result.deliveries, 2);
    assert!(result.total_ticks < 2000);
    assert!(result.messages.delivered >= result.messages.sent);
}

#[test]
fn honest_agents_trust_each_other_at_start() {
    let result = runner(5).with_ticks(1).run(ScenarioId::Cooperative).unwrap();

    assert_eq!(result.trust.len(), 6);
    for row in &result.trust {
        assert_ne!(row.observer, row.peer);
        assert_eq!(row.composite, 0.0);
    }
}

#[test]
fn liar_loses_trust() {
    let result = runner(42).run(ScenarioId::Deception).unwrap();

    assert!(result.passed, "{:?}", result.failure_reason);
    let views = [result.composite("alice", "liam"), result.composite("bob", "liam")];
    assert!(
        views.iter().flatten().any(|c| *c < 0.0),
        "liam still trusted: {:?}",
        views
    );
}

#[test]
fn mixed_team_completes() {
    let result = runner(42).run(ScenarioId::MixedTeam).unwrap();

    assert!(result.passed, "{:?}", result.failure_reason);
    assert_eq!(result.sites, 3);
}

#[test]
fn strong_agent_resorts_and_sites_stay_filled() {
    let result = runner(42).run(ScenarioId::Resort).unwrap();

    assert!(result.passed, "{:?}", result.failure_reason);
    let sam = result.agents.iter().find(|a| a.name == "sam").unwrap();
    assert_eq!(sam.variant, PolicyKind::Strong);
    assert!(!matches!(sam.phase, Phase::PlanCleanup | Phase::Cleanup));
}

#[test]
fn lone_agent_can_finish_alone() {
    let result = runner(7)
        .with_team(vec![TeamMember::new("solo", PolicyKind::Cooperative)])
        .run(ScenarioId::Cooperative)
        .unwrap();

    assert!(result.passed, "{:?}", result.failure_reason);
    assert!(result.trust.is_empty());
    assert_eq!(result.messages.delivered, 0);
}

#[test]
fn same_seed_same_run() {
    let a = runner(11).run(ScenarioId::Deception).unwrap();
    let b = runner(11).run(ScenarioId::Deception).unwrap();

    assert_eq!(a.total_ticks, b.total_ticks);
    assert_eq!(a.trust, b.trust);
    assert_eq!(a.messages, b.messages);
}
