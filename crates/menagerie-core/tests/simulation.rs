//! End-to-end runs of the simulation service on the in-memory backend.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use menagerie_core::{Command, ScriptedDecisionSource, Simulation, SimulationConfig, WeightedDecisionEngine};
use menagerie_db::{MemoryRepository, Repository};
use menagerie_types::{Action, ActionKind, AgentStatus, EventKind};
use serde_json::json;

fn rest(secs: u64) -> Action {
    Action {
        kind: ActionKind::Rest,
        priority: 20,
        reason: "wants to rest".to_owned(),
        duration_secs: secs,
    }
}

fn scripted(actions: Vec<Action>) -> (Simulation, Repository) {
    let repo = Repository::Memory(MemoryRepository::new());
    let mut config = SimulationConfig::default();
    config.seed = Some(3);
    let sim = Simulation::with_decisions(config, repo.clone(), Arc::new(ScriptedDecisionSource::new(actions)));
    (sim, repo)
}

/// A simulation whose agent and decay loops stay asleep for the test.
fn quiet() -> (Simulation, Repository) {
    let repo = Repository::Memory(MemoryRepository::new());
    let mut config = SimulationConfig::default();
    config.seed = Some(5);
    config.scheduler.decision_interval_secs = 3600;
    config.scheduler.decay_interval_secs = 3600;
    (Simulation::new(config, repo.clone()), repo)
}

#[tokio::test]
async fn fresh_agent_prefers_exploring_over_resting() {
    let (sim, _) = scripted(Vec::new());
    let agent = sim.create_agent("alice").await.unwrap();
    assert_eq!(agent.status, AgentStatus::Idle);
    assert_eq!(agent.health, 100);

    let explore = WeightedDecisionEngine::priority_for(ActionKind::Explore, &agent).unwrap();
    let rest = WeightedDecisionEngine::priority_for(ActionKind::Rest, &agent).unwrap_or(0);
    assert!(explore > rest, "explore {explore} vs rest {rest}");
}

#[tokio::test(start_paused = true)]
async fn decided_action_runs_to_completion() {
    let (sim, _) = scripted(vec![rest(5)]);
    sim.start().await.unwrap();
    let agent = sim.create_agent("alice").await.unwrap();

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(sim.get_agent(agent.id).await.unwrap().status, AgentStatus::Resting);
    assert_eq!(sim.stats().await.pending_completions, 1);

    tokio::time::sleep(Duration::from_secs(6)).await;
    let rested = sim.get_agent(agent.id).await.unwrap();
    assert_eq!(rested.status, AgentStatus::Idle);
    assert_eq!(sim.stats().await.pending_completions, 0);

    let events = sim.agent_events(agent.id, 10).await.unwrap();
    assert!(events.iter().any(|e| e.message.contains("wants to rest")));
    assert_eq!(events.last().unwrap().kind, EventKind::Born);

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn coin_changes_are_persisted_without_batching() {
    let (sim, repo) = scripted(Vec::new());
    sim.start().await.unwrap();
    let agent = sim.create_agent("bob").await.unwrap();

    sim.execute_command(agent.id, "addcoins", &json!({"amount": 250}))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let stored = repo.get_by_owner("bob").await.unwrap().unwrap();
    assert_eq!(stored.coins, 250);
    assert_eq!(sim.stats().await.tiers.critical.processed, 1);

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn shutdown_flushes_every_persisted_tier() {
    let (sim, repo) = scripted(Vec::new());
    sim.start().await.unwrap();
    let agent = sim.create_agent("carol").await.unwrap();
    sim.execute(agent.id, Command::Rest { duration_secs: 600 }).await.unwrap();

    sim.shutdown().await;

    let stored = repo.get_by_id(agent.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AgentStatus::Resting);
    let events = repo.recent_events(10).await.unwrap();
    assert!(events.iter().any(|e| e.kind == EventKind::Born));
    assert_eq!(sim.stats().await.active_loops, 0);
}

#[tokio::test(start_paused = true)]
async fn restart_resumes_agents_from_the_repository() {
    let (first, repo) = scripted(Vec::new());
    first.start().await.unwrap();
    let agent = first.create_agent("dave").await.unwrap();
    first.execute(agent.id, Command::Rest { duration_secs: 600 }).await.unwrap();
    first.shutdown().await;

    let second = Simulation::new(SimulationConfig::default(), repo);
    assert_eq!(second.start().await.unwrap(), 1);
    let resumed = second.agent_by_owner("dave").await.unwrap();
    assert_eq!(resumed.id, agent.id);
    assert_eq!(resumed.status, AgentStatus::Idle);
    assert!(!second.recent_events(5).await.unwrap().is_empty());

    second.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn exploration_completes_with_an_outcome_event() {
    let explore = Action {
        kind: ActionKind::Explore,
        priority: 90,
        reason: "wants to explore".to_owned(),
        duration_secs: 30,
    };
    let (sim, _) = scripted(vec![explore]);
    sim.start().await.unwrap();
    let agent = sim.create_agent("alice").await.unwrap();

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert_eq!(sim.get_agent(agent.id).await.unwrap().status, AgentStatus::Exploring);
    let before = sim.agent_events(agent.id, 20).await.unwrap().len();

    tokio::time::sleep(Duration::from_secs(31)).await;
    let after = sim.get_agent(agent.id).await.unwrap();
    assert!(matches!(after.status, AgentStatus::Idle | AgentStatus::Dead));
    assert!(sim.agent_events(agent.id, 20).await.unwrap().len() > before);

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn late_important_flush_never_undoes_critical_coins() {
    let (sim, repo) = quiet();
    sim.start().await.unwrap();
    let agent = sim.create_agent("erin").await.unwrap();
    let ctx = sim.context();

    ctx.mutate(agent.id, |a| {
        a.energy = 50;
        Ok(((), Vec::new()))
    })
    .await
    .unwrap();
    ctx.mutate(agent.id, |a| {
        a.coins = 500;
        Ok(((), Vec::new()))
    })
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(repo.get_by_id(agent.id).await.unwrap().unwrap().coins, 500);

    tokio::time::sleep(Duration::from_secs(30)).await;
    let stats = sim.stats().await;
    assert_eq!(stats.tiers.important.queue_len, 0);
    assert!(stats.tiers.important.processed > 0);

    let stored = repo.get_by_id(agent.id).await.unwrap().unwrap();
    assert_eq!(stored.coins, 500);
    assert_eq!(stored.energy, 50);
    assert_eq!(stored.revision, 2);

    sim.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn starvation_death_is_persisted_within_the_critical_interval() {
    let (sim, repo) = quiet();
    sim.start().await.unwrap();
    let agent = sim.create_agent("frank").await.unwrap();
    sim.context()
        .mutate(agent.id, |a| {
            a.hunger = 0;
            a.health = 1;
            Ok(((), Vec::new()))
        })
        .await
        .unwrap();

    assert_eq!(sim.scheduler().decay_tick().await, 1);
    tokio::time::sleep(Duration::from_secs(2)).await;

    let stored = repo.get_by_id(agent.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AgentStatus::Dead);
    assert_eq!(stored.health, 0);
    let events = repo.recent_events(10).await.unwrap();
    assert!(events.iter().any(|e| e.kind == EventKind::Death));

    tokio::time::sleep(Duration::from_secs(30)).await;
    let stored = repo.get_by_id(agent.id).await.unwrap().unwrap();
    assert_eq!(stored.status, AgentStatus::Dead);

    sim.shutdown().await;
}
