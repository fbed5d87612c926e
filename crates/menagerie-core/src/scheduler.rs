//! Per-agent decision loops, deferred completions, and the global loops.
//!
//! Every living agent gets its own loop that wakes on the decision
//! interval, asks the [`DecisionSource`] for an action and starts it. An
//! action sets an in-progress status immediately and schedules a deferred
//! completion that applies the outcome once the action's duration has
//! passed.
//!
//! # Completion guard
//!
//! A completion only applies if the agent is still in the status the
//! action put it in. Anything that moved the agent elsewhere (death, an
//! interrupt, a forced status change) turns the completion into a no-op.
//! On top of that every loop and every completion owns a child
//! [`CancellationToken`], so death, [`ActionScheduler::interrupt`] and
//! shutdown stop pending work without waiting for the timer.
//!
//! All agent mutation goes through [`ServiceContext::mutate`], or for
//! decay through [`ServiceContext::stage`] while the shard is locked. No
//! lock is held across an `.await`, and the socialize partner is updated
//! only after the acting agent's shard lock has been released.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use menagerie_agents::{VitalsConfig, apply_decay, roll_exploration, vitals};
use menagerie_types::{Action, ActionKind, Agent, AgentId, AgentStatus, Event, EventKind, EventPayload};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, trace, warn};

use crate::context::ServiceContext;
use crate::decision::DecisionSource;
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Pure action logic
// ---------------------------------------------------------------------------

/// A started action waiting for its duration to elapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pending {
    /// Status the agent must still have for the completion to apply.
    pub expected: AgentStatus,
    /// How long until completion.
    pub duration: Duration,
    /// Coins already paid at start (eating only).
    pub cost: u64,
}

impl Pending {
    const fn new(expected: AgentStatus, duration_secs: u64) -> Self {
        Self {
            expected,
            duration: Duration::from_secs(duration_secs),
            cost: 0,
        }
    }
}

/// Whether `kind` may start for `agent` right now.
pub const fn admissible(kind: ActionKind, agent: &Agent) -> bool {
    match kind {
        ActionKind::Explore => agent.can_explore(),
        ActionKind::Rest | ActionKind::Eat => agent.can_rest(),
        ActionKind::Socialize => agent.can_socialize(),
        ActionKind::Idle => agent.is_alive(),
    }
}

fn begin_status(agent: &mut Agent, status: AgentStatus) {
    agent.status = status;
    agent.last_activity = Utc::now();
}

/// Apply the start of `action` to `agent`.
///
/// Returns the pending completion (none for idle) and the start events.
/// `partner` is the agent to socialize with, if any; only this agent's
/// side of the friendship is recorded here.
pub fn start_action<R: Rng + ?Sized>(
    agent: &mut Agent,
    action: &Action,
    partner: Option<&Agent>,
    rng: &mut R,
) -> (Option<Pending>, Vec<Event>) {
    match action.kind {
        ActionKind::Idle => (None, Vec::new()),
        ActionKind::Explore => {
            begin_status(agent, AgentStatus::Exploring);
            let event = Event::new(agent, EventKind::Explore, format!("[{}] {}", agent.name, action.reason))
                .with_payload(EventPayload {
                    location: Some(agent.location.clone()),
                    ..EventPayload::default()
                });
            (Some(Pending::new(AgentStatus::Exploring, action.duration_secs)), vec![event])
        }
        ActionKind::Rest => {
            begin_status(agent, AgentStatus::Resting);
            let event = Event::new(agent, EventKind::Reward, format!("[{}] {}", agent.name, action.reason));
            (Some(Pending::new(AgentStatus::Resting, action.duration_secs)), vec![event])
        }
        ActionKind::Socialize => {
            begin_status(agent, AgentStatus::Socializing);
            let event = match partner {
                Some(partner) => {
                    vitals::add_friend(agent, &partner.owner);
                    let message = format!("[{}] chats happily with {}", agent.name, partner.name);
                    Event::new(agent, EventKind::Social, message).with_payload(EventPayload {
                        friend: Some(partner.owner.clone()),
                        ..EventPayload::default()
                    })
                }
                None => Event::new(agent, EventKind::Social, format!("[{}] {}", agent.name, action.reason)),
            };
            (Some(Pending::new(AgentStatus::Socializing, action.duration_secs)), vec![event])
        }
        ActionKind::Eat => {
            let cost = rng.random_range(10..=19_u64);
            if vitals::debit_coins(agent, cost) {
                begin_status(agent, AgentStatus::Eating);
                let event = Event::new(agent, EventKind::Reward, format!("[{}] is buying food...", agent.name));
                let pending = Pending {
                    cost,
                    ..Pending::new(AgentStatus::Eating, action.duration_secs)
                };
                (Some(pending), vec![event])
            } else {
                begin_status(agent, AgentStatus::Foraging);
                let message = format!("[{}] goes looking for free food...", agent.name);
                let event = Event::new(agent, EventKind::Reward, message);
                (Some(Pending::new(AgentStatus::Foraging, action.duration_secs)), vec![event])
            }
        }
    }
}

/// Apply the outcome of a pending action.
///
/// Returns `None` without touching the agent if it is no longer in the
/// expected status. Otherwise the agent ends in `Idle` (or `Dead`) and
/// the completion events are returned.
pub fn finish_action<R: Rng + ?Sized>(
    agent: &mut Agent,
    pending: &Pending,
    config: &VitalsConfig,
    rng: &mut R,
) -> Option<Vec<Event>> {
    if agent.status != pending.expected {
        return None;
    }

    let name = agent.name.clone();
    let events = match pending.expected {
        AgentStatus::Exploring => roll_exploration(agent, config, rng),
        AgentStatus::Resting => {
            let gain = rng.random_range(20..=39);
            vitals::restore_energy(agent, gain);
            vitals::heal(agent, 10);
            vec![Event::new(agent, EventKind::Reward, format!("[{name}] finished resting, +{gain} energy"))]
        }
        AgentStatus::Socializing => {
            let gain = rng.random_range(15..=34);
            vitals::increase_social(agent, gain);
            vec![Event::new(agent, EventKind::Social, format!("[{name}] had a good time together, social +{gain}"))]
        }
        AgentStatus::Foraging => {
            let amount = rng.random_range(10..=24);
            vitals::feed(agent, amount);
            vec![Event::new(agent, EventKind::Reward, format!("[{name}] found some free food, satiety +{amount}"))]
        }
        AgentStatus::Eating => {
            let amount = rng.random_range(25..=44);
            vitals::feed(agent, amount);
            let message = format!("[{name}] spent {} coins on a tasty meal, satiety +{amount}", pending.cost);
            vec![Event::new(agent, EventKind::Reward, message).with_coins(0_i64.saturating_sub_unsigned(pending.cost))]
        }
        AgentStatus::Idle | AgentStatus::Dead => return None,
    };

    if agent.is_alive() {
        agent.status = AgentStatus::Idle;
    }
    agent.last_activity = Utc::now();
    Some(events)
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// What one decision tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The agent is gone or dead; its loop should end.
    Stopped,
    /// The agent is busy with an action.
    Busy,
    /// Nothing was worth doing.
    Idle,
    /// An action was started.
    Started(ActionKind),
}

#[derive(Debug)]
struct InFlight {
    generation: u64,
    token: CancellationToken,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Runs agent loops, completions, decay and maintenance.
#[derive(Debug)]
pub struct ActionScheduler {
    ctx: Arc<ServiceContext>,
    decisions: Arc<dyn DecisionSource>,
    rng: Mutex<StdRng>,
    tracker: TaskTracker,
    loops: Mutex<HashMap<AgentId, CancellationToken>>,
    completions: Mutex<HashMap<AgentId, InFlight>>,
    generation: AtomicU64,
}

impl ActionScheduler {
    /// Create a scheduler. Tasks are spawned on `tracker` under children of
    /// the context's token. A configured seed makes every draw repeatable.
    pub fn new(ctx: Arc<ServiceContext>, decisions: Arc<dyn DecisionSource>, tracker: TaskTracker) -> Self {
        let rng = ctx
            .config
            .seed
            .map_or_else(StdRng::from_os_rng, StdRng::seed_from_u64);
        Self {
            ctx,
            decisions,
            rng: Mutex::new(rng),
            tracker,
            loops: Mutex::new(HashMap::new()),
            completions: Mutex::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// The shared context.
    pub fn context(&self) -> &ServiceContext {
        &self.ctx
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        lock(&self.rng)
    }

    /// Number of running agent loops.
    pub fn active_loops(&self) -> usize {
        lock(&self.loops).len()
    }

    /// Number of completions waiting on their timer.
    pub fn pending_completions(&self) -> usize {
        lock(&self.completions).len()
    }

    /// Start the decision loop for `id`. Returns `false` if it already runs.
    pub fn spawn_agent_loop(self: &Arc<Self>, id: AgentId) -> bool {
        let token = match lock(&self.loops).entry(id) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => slot.insert(self.ctx.token.child_token()).clone(),
        };
        let scheduler = Arc::clone(self);
        self.tracker.spawn(async move { scheduler.run_agent(id, token).await });
        true
    }

    async fn run_agent(self: Arc<Self>, id: AgentId, token: CancellationToken) {
        let mut ticker = time::interval(self.ctx.config.scheduler.decision_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        debug!(agent_id = %id, "Agent loop started");

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {}
            }
            if self.tick_agent(id).await == TickOutcome::Stopped {
                break;
            }
        }

        lock(&self.loops).remove(&id);
        debug!(agent_id = %id, "Agent loop stopped");
    }

    /// Run one decision for `id`: skip busy agents, decide, and start the
    /// chosen action.
    pub async fn tick_agent(self: &Arc<Self>, id: AgentId) -> TickOutcome {
        let Some(agent) = self.ctx.store.get(id).await else {
            return TickOutcome::Stopped;
        };
        if !agent.is_alive() {
            return TickOutcome::Stopped;
        }
        if agent.status != AgentStatus::Idle {
            return TickOutcome::Busy;
        }

        let action = self.decisions.decide(&agent, &mut self.rng());
        if action.kind == ActionKind::Idle {
            trace!(agent_id = %id, reason = %action.reason, "Agent idles");
            return TickOutcome::Idle;
        }

        let kind = action.kind;
        match self.begin(id, action).await {
            Ok(_) => TickOutcome::Started(kind),
            Err(CoreError::AgentNotFound(_) | CoreError::AgentNotAlive(_)) => TickOutcome::Stopped,
            Err(err) => {
                debug!(agent_id = %id, %err, "Decided action no longer applies");
                TickOutcome::Busy
            }
        }
    }

    /// Start `action` for `id` and schedule its completion.
    ///
    /// The action's precondition is checked under the agent's lock, so two
    /// concurrent starts can never both succeed.
    pub async fn begin(self: &Arc<Self>, id: AgentId, action: Action) -> Result<Agent, CoreError> {
        let partner = if action.kind == ActionKind::Socialize {
            self.ctx.store.first_other_alive(id).await
        } else {
            None
        };

        let (pending, after) = self
            .ctx
            .mutate(id, |agent| {
                if !agent.is_alive() {
                    return Err(CoreError::AgentNotAlive(id));
                }
                if !admissible(action.kind, agent) {
                    return Err(CoreError::InvalidState {
                        agent_id: id,
                        status: agent.status,
                        action: action.kind.as_str(),
                    });
                }
                Ok(start_action(agent, &action, partner.as_ref(), &mut *self.rng()))
            })
            .await?;

        if let Some(partner) = partner {
            let owner = after.owner.clone();
            let befriended = self
                .ctx
                .mutate(partner.id, |other| {
                    vitals::add_friend(other, &owner);
                    Ok(((), Vec::new()))
                })
                .await;
            if let Err(err) = befriended {
                debug!(agent_id = %id, partner = %partner.id, %err, "Partner left before befriending");
            }
        }

        if let Some(pending) = pending {
            debug!(agent_id = %id, action = action.kind.as_str(), secs = action.duration_secs, "Action started");
            self.schedule_completion(id, pending);
        }
        Ok(after)
    }

    fn schedule_completion(self: &Arc<Self>, id: AgentId, pending: Pending) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = self.ctx.token.child_token();
        let previous = lock(&self.completions).insert(
            id,
            InFlight {
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        let scheduler = Arc::clone(self);
        self.tracker.spawn(async move {
            tokio::select! {
                biased;
                () = token.cancelled() => {
                    trace!(agent_id = %id, "Completion cancelled");
                }
                () = time::sleep(pending.duration) => {
                    scheduler.complete(id, &pending).await;
                }
            }
            scheduler.release_completion(id, generation);
        });
    }

    fn release_completion(&self, id: AgentId, generation: u64) {
        let mut completions = lock(&self.completions);
        if completions.get(&id).is_some_and(|f| f.generation == generation) {
            completions.remove(&id);
        }
    }

    /// Apply a pending completion now. A no-op if the guard fails.
    pub async fn complete(&self, id: AgentId, pending: &Pending) -> bool {
        let config = &self.ctx.config.vitals;
        let result = self
            .ctx
            .mutate(id, |agent| {
                Ok(match finish_action(agent, pending, config, &mut *self.rng()) {
                    Some(events) => (true, events),
                    None => (false, Vec::new()),
                })
            })
            .await;

        match result {
            Ok((applied, after)) => {
                if !applied {
                    debug!(agent_id = %id, expected = %pending.expected, actual = %after.status, "Completion skipped");
                }
                if !after.is_alive() {
                    info!(agent_id = %id, name = %after.name, "Agent died");
                    self.retire(id);
                }
                applied
            }
            Err(err) => {
                debug!(agent_id = %id, %err, "Completion target missing");
                false
            }
        }
    }

    /// Cancel the in-flight completion for `id` and return it to idle.
    pub async fn interrupt(&self, id: AgentId) -> Result<Agent, CoreError> {
        let inflight = lock(&self.completions).remove(&id);
        if let Some(inflight) = inflight {
            inflight.token.cancel();
        }

        let ((), after) = self
            .ctx
            .mutate(id, |agent| {
                if !agent.is_alive() {
                    return Err(CoreError::AgentNotAlive(id));
                }
                if agent.status == AgentStatus::Idle {
                    return Ok(((), Vec::new()));
                }
                let message = format!("[{}] was interrupted while {}", agent.name, agent.status);
                begin_status(agent, AgentStatus::Idle);
                Ok(((), vec![Event::new(agent, EventKind::Debug, message)]))
            })
            .await?;
        Ok(after)
    }

    /// Stop all scheduled work for an agent.
    pub fn retire(&self, id: AgentId) {
        let loop_token = lock(&self.loops).remove(&id);
        if let Some(token) = loop_token {
            token.cancel();
        }
        let inflight = lock(&self.completions).remove(&id);
        if let Some(inflight) = inflight {
            inflight.token.cancel();
        }
    }

    /// Start the decay and maintenance loops.
    pub fn spawn_global_loops(self: &Arc<Self>) {
        let scheduler = Arc::clone(self);
        let token = self.ctx.token.child_token();
        self.tracker.spawn(async move { scheduler.run_decay(token).await });

        let scheduler = Arc::clone(self);
        let token = self.ctx.token.child_token();
        self.tracker.spawn(async move { scheduler.run_maintenance(token).await });
    }

    async fn run_decay(&self, token: CancellationToken) {
        let mut ticker = time::interval(self.ctx.config.scheduler.decay_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => {
                    self.decay_tick().await;
                }
            }
        }
        debug!("Decay loop stopped");
    }

    async fn run_maintenance(&self, token: CancellationToken) {
        let mut ticker = time::interval(self.ctx.config.scheduler.maintenance_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => break,
                _ = ticker.tick() => self.maintenance_tick().await,
            }
        }
        debug!("Maintenance loop stopped");
    }

    /// One decay pass over every living agent. Returns how many decayed.
    pub async fn decay_tick(&self) -> usize {
        let config = &self.ctx.config.vitals;
        let reports = self
            .ctx
            .store
            .for_each_mut(|agent| {
                if !agent.is_alive() {
                    return None;
                }
                let before = agent.clone();
                let outcome = apply_decay(agent, config);
                let mut events = Vec::new();
                if let Some(damage) = outcome.starvation_damage {
                    let message = format!("[{}] lost {damage} health to hunger", agent.name);
                    events.push(Event::new(agent, EventKind::Starvation, message));
                }
                if outcome.died {
                    let message = format!("[{}] starved and did not recover", agent.name);
                    events.push(Event::new(agent, EventKind::Death, message));
                    info!(agent_id = %agent.id, name = %agent.name, "Agent starved");
                }
                let staged = self.ctx.stage(&before, agent, events);
                Some((agent.id, outcome.died, staged))
            })
            .await;

        let decayed = reports.len();
        for (id, died, staged) in reports {
            if died {
                self.retire(id);
            }
            self.ctx.settle(staged).await;
        }
        trace!(decayed, "Decay pass");
        decayed
    }

    /// Purge stale dedup fingerprints and prune old persisted events.
    pub async fn maintenance_tick(&self) {
        let purged = self.ctx.store.purge_fingerprints().await;

        let days = i64::from(self.ctx.config.storage.event_retention_days);
        let cutoff = TimeDelta::try_days(days).and_then(|age| Utc::now().checked_sub_signed(age));
        let pruned = match cutoff {
            Some(cutoff) => match self.ctx.repository.delete_events_older_than(cutoff).await {
                Ok(pruned) => pruned,
                Err(err) => {
                    warn!(%err, "Event retention pass failed");
                    0
                }
            },
            None => 0,
        };
        debug!(purged, pruned, "Maintenance pass");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use menagerie_agents::spawn_agent;
    use menagerie_db::cache::agent_key;
    use menagerie_db::{MemoryRepository, Repository};

    use super::*;
    use crate::config::SimulationConfig;
    use crate::decision::ScriptedDecisionSource;

    fn action(kind: ActionKind, duration_secs: u64) -> Action {
        Action {
            kind,
            priority: 100,
            reason: format!("wants to {}", kind.as_str()),
            duration_secs,
        }
    }

    fn agent(owner: &str) -> Agent {
        spawn_agent(owner, &VitalsConfig::default()).unwrap()
    }

    async fn scheduler_with(script: Vec<Action>, owners: &[&str]) -> (Arc<ActionScheduler>, Vec<AgentId>) {
        let config = SimulationConfig {
            seed: Some(7),
            ..SimulationConfig::default()
        };
        let ctx = Arc::new(ServiceContext::new(
            config,
            Repository::Memory(MemoryRepository::new()),
            None,
        ));
        let mut ids = Vec::new();
        for owner in owners {
            let agent = agent(owner);
            ids.push(agent.id);
            ctx.store.insert_new(agent).await.unwrap();
        }
        let decisions = Arc::new(ScriptedDecisionSource::new(script));
        let scheduler = Arc::new(ActionScheduler::new(ctx, decisions, TaskTracker::new()));
        (scheduler, ids)
    }

    #[test]
    fn rest_cycle_returns_to_idle() {
        let mut rng = StdRng::seed_from_u64(1);
        let mut a = agent("alice");
        a.energy = 40;

        let (pending, events) = start_action(&mut a, &action(ActionKind::Rest, 25), None, &mut rng);
        let pending = pending.unwrap();
        assert_eq!(a.status, AgentStatus::Resting);
        assert_eq!(pending.duration, Duration::from_secs(25));
        assert_eq!(events.len(), 1);

        let events = finish_action(&mut a, &pending, &VitalsConfig::default(), &mut rng).unwrap();
        assert_eq!(a.status, AgentStatus::Idle);
        assert!((60..=79).contains(&a.energy));
        assert!(events[0].message.contains("finished resting"));
    }

    #[test]
    fn forced_status_change_makes_completion_a_noop() {
        let mut rng = StdRng::seed_from_u64(2);
        let mut a = agent("alice");
        let (pending, _) = start_action(&mut a, &action(ActionKind::Explore, 30), None, &mut rng);

        a.status = AgentStatus::Resting;
        let before = a.clone();
        assert!(finish_action(&mut a, &pending.unwrap(), &VitalsConfig::default(), &mut rng).is_none());
        assert_eq!(a, before);
    }

    #[test]
    fn explore_completion_always_reports_something() {
        let config = VitalsConfig::default();
        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let mut a = agent("alice");
            let (pending, _) = start_action(&mut a, &action(ActionKind::Explore, 30), None, &mut rng);
            let events = finish_action(&mut a, &pending.unwrap(), &config, &mut rng).unwrap();
            assert!(!events.is_empty());
            assert!(matches!(a.status, AgentStatus::Idle | AgentStatus::Dead));
        }
    }

    #[test]
    fn broke_agent_forages_and_rich_agent_pays() {
        let mut rng = StdRng::seed_from_u64(3);
        let config = VitalsConfig::default();

        let mut broke = agent("alice");
        broke.hunger = 30;
        let (pending, _) = start_action(&mut broke, &action(ActionKind::Eat, 10), None, &mut rng);
        let pending = pending.unwrap();
        assert_eq!(broke.status, AgentStatus::Foraging);
        assert_eq!(pending.cost, 0);
        finish_action(&mut broke, &pending, &config, &mut rng).unwrap();
        assert!((40..=54).contains(&broke.hunger));

        let mut rich = agent("alice");
        rich.coins = 100;
        rich.hunger = 30;
        let (pending, _) = start_action(&mut rich, &action(ActionKind::Eat, 10), None, &mut rng);
        let pending = pending.unwrap();
        assert_eq!(rich.status, AgentStatus::Eating);
        assert!((10..=19).contains(&pending.cost));
        assert_eq!(rich.coins, 100 - pending.cost);

        let events = finish_action(&mut rich, &pending, &config, &mut rng).unwrap();
        assert!((55..=74).contains(&rich.hunger));
        assert_eq!(events[0].payload.coins, -i64::try_from(pending.cost).unwrap());
    }

    #[test]
    fn socializing_befriends_the_partner() {
        let mut rng = StdRng::seed_from_u64(4);
        let mut a = agent("alice");
        let partner = agent("bob");
        let (_, events) = start_action(&mut a, &action(ActionKind::Socialize, 40), Some(&partner), &mut rng);
        assert_eq!(a.friends, vec!["bob".to_owned()]);
        assert_eq!(events[0].payload.friend.as_deref(), Some("bob"));
        assert!(events[0].message.contains(&partner.name));
    }

    #[tokio::test(start_paused = true)]
    async fn decided_explore_completes_after_its_duration() {
        let (scheduler, ids) = scheduler_with(vec![action(ActionKind::Explore, 45)], &["alice"]).await;
        let id = ids[0];

        assert_eq!(scheduler.tick_agent(id).await, TickOutcome::Started(ActionKind::Explore));
        let ctx = scheduler.context();
        assert_eq!(ctx.store.get(id).await.unwrap().status, AgentStatus::Exploring);
        assert_eq!(scheduler.tick_agent(id).await, TickOutcome::Busy);
        let started = ctx.store.recent_events(100).await.len();

        time::sleep(Duration::from_secs(46)).await;

        let agent = ctx.store.get(id).await.unwrap();
        assert!(matches!(agent.status, AgentStatus::Idle | AgentStatus::Dead));
        assert!(ctx.store.recent_events(100).await.len() > started);
        assert_eq!(scheduler.pending_completions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_cancels_the_completion() {
        let (scheduler, ids) = scheduler_with(vec![action(ActionKind::Rest, 30)], &["alice"]).await;
        let id = ids[0];
        scheduler.tick_agent(id).await;
        assert_eq!(scheduler.pending_completions(), 1);

        let agent = scheduler.interrupt(id).await.unwrap();
        assert_eq!(agent.status, AgentStatus::Idle);

        time::sleep(Duration::from_secs(31)).await;
        let events = scheduler.context().store.events_for(id, 10).await;
        assert!(events.iter().all(|e| !e.message.contains("finished resting")));
        assert!(events.iter().any(|e| e.message.contains("interrupted")));
        assert_eq!(scheduler.pending_completions(), 0);
    }

    #[tokio::test]
    async fn second_start_on_a_busy_agent_is_rejected() {
        let (scheduler, ids) = scheduler_with(Vec::new(), &["alice"]).await;
        let id = ids[0];
        scheduler.begin(id, action(ActionKind::Rest, 600)).await.unwrap();

        let second = scheduler.begin(id, action(ActionKind::Explore, 30)).await;
        assert!(matches!(
            second,
            Err(CoreError::InvalidState { status: AgentStatus::Resting, .. })
        ));
        scheduler.context().token.cancel();
    }

    #[tokio::test]
    async fn socialize_updates_both_agents() {
        let (scheduler, ids) = scheduler_with(Vec::new(), &["alice", "bob"]).await;
        let after = scheduler.begin(ids[0], action(ActionKind::Socialize, 600)).await.unwrap();
        assert_eq!(after.friends, vec!["bob".to_owned()]);

        let partner = scheduler.context().store.get(ids[1]).await.unwrap();
        assert_eq!(partner.friends, vec!["alice".to_owned()]);
        assert_eq!(partner.status, AgentStatus::Idle);
        scheduler.context().token.cancel();
    }

    #[tokio::test]
    async fn dead_agents_stop_their_loop() {
        let (scheduler, ids) = scheduler_with(Vec::new(), &["alice"]).await;
        let id = ids[0];
        scheduler
            .context()
            .mutate(id, |a| {
                vitals::lose_health(a, 1_000);
                Ok(((), Vec::new()))
            })
            .await
            .unwrap();

        assert_eq!(scheduler.tick_agent(id).await, TickOutcome::Stopped);
        assert_eq!(scheduler.tick_agent(AgentId::new()).await, TickOutcome::Stopped);
    }

    #[tokio::test]
    async fn decay_starves_and_kills() {
        let (scheduler, ids) = scheduler_with(Vec::new(), &["alice"]).await;
        let id = ids[0];
        let ctx = scheduler.context();
        ctx.mutate(id, |a| {
            a.hunger = 5;
            a.health = 8;
            Ok(((), Vec::new()))
        })
        .await
        .unwrap();

        assert_eq!(scheduler.decay_tick().await, 1);
        let agent = ctx.store.get(id).await.unwrap();
        assert_eq!(agent.health, 3);
        assert_eq!(agent.hunger, 2);

        scheduler.decay_tick().await;
        let agent = ctx.store.get(id).await.unwrap();
        assert_eq!(agent.status, AgentStatus::Dead);
        let kinds: Vec<EventKind> = ctx.store.events_for(id, 10).await.iter().map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::Starvation));
        assert!(kinds.contains(&EventKind::Death));

        assert_eq!(scheduler.decay_tick().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_leave_the_cache_matching_the_store() {
        let (scheduler, ids) = scheduler_with(Vec::new(), &["alice"]).await;
        let id = ids[0];
        let mut handles = Vec::new();
        for round in 0..20u64 {
            let ctx = Arc::clone(&scheduler.ctx);
            handles.push(tokio::spawn(async move {
                ctx.mutate(id, |a| {
                    a.coins = round + 1;
                    Ok(((), Vec::new()))
                })
                .await
                .unwrap();
            }));
            let decay = Arc::clone(&scheduler);
            handles.push(tokio::spawn(async move {
                decay.decay_tick().await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let ctx = scheduler.context();
        let stored = ctx.store.get(id).await.unwrap();
        let cached = ctx.cache.agents.get(&agent_key(id)).unwrap();
        assert_eq!(cached, stored);
        assert_eq!(stored.revision, 40);
        assert_eq!(stored.energy, 60);
    }

    #[tokio::test(start_paused = true)]
    async fn agent_loop_runs_on_its_interval_and_stops_on_cancel() {
        let (scheduler, ids) = scheduler_with(vec![action(ActionKind::Rest, 5)], &["alice"]).await;
        let id = ids[0];
        assert!(scheduler.spawn_agent_loop(id));
        assert!(!scheduler.spawn_agent_loop(id));
        assert_eq!(scheduler.active_loops(), 1);

        time::sleep(Duration::from_secs(16)).await;
        let events = scheduler.context().store.events_for(id, 10).await;
        assert!(events.iter().any(|e| e.message.contains("wants to rest")));

        scheduler.context().token.cancel();
        scheduler.tracker.close();
        scheduler.tracker.wait().await;
        assert_eq!(scheduler.active_loops(), 0);
    }
}
