//! Decision source trait and the weighted decision engine.
//!
//! Each agent loop asks a [`DecisionSource`] what its agent should do next.
//! [`WeightedDecisionEngine`] scores every eligible action with an additive
//! model over personality, vitals ratios, and mood, then picks one with
//! probability proportional to its score. [`ScriptedDecisionSource`] plays
//! back a fixed list of actions and is used by tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use menagerie_agents::vitals::{ratio_above, ratio_below};
use menagerie_types::{Action, ActionKind, Agent, AgentStatus, Mood, Personality};
use rand::Rng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;

/// A source of agent decisions.
pub trait DecisionSource: Send + Sync + std::fmt::Debug {
    /// Choose the next action for `agent`.
    fn decide(&self, agent: &Agent, rng: &mut StdRng) -> Action;
}

/// Production decision source: eligibility predicates plus weighted choice.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedDecisionEngine;

impl WeightedDecisionEngine {
    /// Create a new engine.
    pub const fn new() -> Self {
        Self
    }

    /// Priority of `kind` for `agent`, or `None` if it is not eligible.
    pub fn priority_for(kind: ActionKind, agent: &Agent) -> Option<u32> {
        if !agent.is_alive() || agent.status != AgentStatus::Idle {
            return None;
        }
        let score = match kind {
            ActionKind::Explore if agent.can_explore() => explore_priority(agent),
            ActionKind::Rest if agent.can_rest() => rest_priority(agent),
            ActionKind::Socialize if agent.can_socialize() => socialize_priority(agent),
            ActionKind::Eat if agent.hunger < 90 => eat_priority(agent),
            _ => return None,
        };
        (score > 0).then_some(score)
    }

    /// Every eligible action with its priority, in a fixed order.
    pub fn candidates(agent: &Agent) -> Vec<(ActionKind, u32)> {
        ActionKind::CANDIDATES
            .into_iter()
            .filter_map(|kind| Self::priority_for(kind, agent).map(|p| (kind, p)))
            .collect()
    }

    /// Pick one candidate with probability proportional to its priority.
    ///
    /// Draws in `[0, total)` and returns the first candidate whose running
    /// total exceeds the draw. A zero total falls back to a uniform pick.
    pub fn select_weighted(candidates: &[(ActionKind, u32)], rng: &mut StdRng) -> Option<(ActionKind, u32)> {
        if let [only] = candidates {
            return Some(*only);
        }
        let total = candidates
            .iter()
            .fold(0_u64, |sum, (_, p)| sum.saturating_add(u64::from(*p)));
        if total == 0 {
            return candidates.choose(rng).copied();
        }

        let draw = rng.random_range(0..total);
        let mut running = 0_u64;
        for candidate in candidates {
            running = running.saturating_add(u64::from(candidate.1));
            if draw < running {
                return Some(*candidate);
            }
        }
        candidates.last().copied()
    }

    /// Build the action for a chosen kind with its duration and reason.
    pub fn action_for(kind: ActionKind, priority: u32, agent: &Agent, rng: &mut StdRng) -> Action {
        let duration_secs = match kind {
            ActionKind::Explore => rng.random_range(30..=89),
            ActionKind::Rest => rng.random_range(20..=49),
            ActionKind::Socialize => rng.random_range(25..=64),
            ActionKind::Eat => rng.random_range(10..=29),
            ActionKind::Idle => return Action::idle(),
        };
        Action {
            kind,
            priority,
            reason: reason_for(kind, agent, rng),
            duration_secs,
        }
    }
}

impl DecisionSource for WeightedDecisionEngine {
    fn decide(&self, agent: &Agent, rng: &mut StdRng) -> Action {
        let candidates = Self::candidates(agent);
        match Self::select_weighted(&candidates, rng) {
            Some((kind, priority)) => Self::action_for(kind, priority, agent, rng),
            None => Action::idle(),
        }
    }
}

fn explore_priority(agent: &Agent) -> u32 {
    let mut score: i64 = 50;
    score = score.saturating_add(match agent.personality {
        Personality::Curious => 30,
        Personality::Brave => 20,
        Personality::Greedy => 15,
        Personality::Cautious => -10,
        Personality::Friendly => 0,
    });
    if ratio_below(agent.energy, agent.max_energy, 3) {
        score = score.saturating_sub(40);
    } else if ratio_above(agent.energy, agent.max_energy, 8) {
        score = score.saturating_add(20);
    }
    score = score.saturating_add(i64::from(agent.mood.influence_tenths()));
    if agent.hunger < 40 {
        score = score.saturating_sub(30);
    }
    u32::try_from(score.max(0)).unwrap_or(0)
}

fn rest_priority(agent: &Agent) -> u32 {
    let mut score: u32 = 20;
    if ratio_below(agent.energy, agent.max_energy, 3) {
        score = score.saturating_add(80);
    } else if ratio_below(agent.energy, agent.max_energy, 5) {
        score = score.saturating_add(40);
    }
    if ratio_below(agent.health, agent.max_health, 5) {
        score = score.saturating_add(60);
    }
    if agent.mood == Mood::Tired {
        score = score.saturating_add(50);
    }
    if agent.personality == Personality::Cautious {
        score = score.saturating_add(20);
    }
    score
}

fn socialize_priority(agent: &Agent) -> u32 {
    let mut score: i64 = 30;
    if agent.social < 30 {
        score = score.saturating_add(60);
    } else if agent.social < 50 {
        score = score.saturating_add(30);
    }
    score = score.saturating_add(match agent.personality {
        Personality::Friendly => 40,
        Personality::Curious => 20,
        Personality::Cautious => -10,
        Personality::Brave | Personality::Greedy => 0,
    });
    if agent.mood == Mood::Sad {
        score = score.saturating_add(30);
    }
    u32::try_from(score.max(0)).unwrap_or(0)
}

fn eat_priority(agent: &Agent) -> u32 {
    let mut score: u32 = match agent.hunger {
        0..20 => 100,
        20..40 => 70,
        40..60 => 30,
        60..80 => 10,
        _ => 0,
    };
    if agent.personality == Personality::Greedy && agent.hunger < 85 {
        score = score.saturating_add(15);
    }
    score
}

fn reason_for(kind: ActionKind, agent: &Agent, rng: &mut StdRng) -> String {
    let name = &agent.name;
    match kind {
        ActionKind::Explore => {
            let mut reasons = vec![
                format!("{name} wants a new adventure"),
                format!("{name} is curious about the unknown"),
                format!("{name} hopes to find treasure"),
            ];
            match agent.personality {
                Personality::Curious => reasons.push(format!("{name} follows their curiosity")),
                Personality::Brave => reasons.push(format!("{name} bravely sets off")),
                Personality::Greedy => reasons.push(format!("{name} goes looking for riches")),
                Personality::Friendly | Personality::Cautious => {}
            }
            reasons
                .choose(rng)
                .cloned()
                .unwrap_or_else(|| format!("{name} sets off exploring"))
        }
        ActionKind::Rest if agent.energy < 30 => format!("{name} is exhausted and needs a rest"),
        ActionKind::Rest if agent.health < 50 => format!("{name} needs to recover"),
        ActionKind::Rest => format!("{name} wants to relax"),
        ActionKind::Socialize if agent.social < 30 => format!("{name} feels lonely and wants company"),
        ActionKind::Socialize => format!("{name} wants to play with other pets"),
        ActionKind::Eat if agent.hunger < 30 => format!("{name} is starving"),
        ActionKind::Eat => format!("{name} could use a snack"),
        ActionKind::Idle => format!("{name} is idling"),
    }
}

/// Plays back a fixed list of actions, then idles.
#[derive(Debug, Default)]
pub struct ScriptedDecisionSource {
    script: Mutex<VecDeque<Action>>,
}

impl ScriptedDecisionSource {
    /// Create a source that returns `actions` in order.
    pub fn new(actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            script: Mutex::new(actions.into_iter().collect()),
        }
    }

    /// Actions not yet handed out.
    pub fn remaining(&self) -> usize {
        self.script.lock().map_or(0, |script| script.len())
    }
}

impl DecisionSource for ScriptedDecisionSource {
    fn decide(&self, _agent: &Agent, _rng: &mut StdRng) -> Action {
        self.script
            .lock()
            .ok()
            .and_then(|mut script| script.pop_front())
            .unwrap_or_else(Action::idle)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing, clippy::arithmetic_side_effects)]
mod tests {
    use menagerie_agents::{VitalsConfig, spawn_agent};
    use rand::SeedableRng;

    use super::*;

    fn agent(owner: &str) -> Agent {
        spawn_agent(owner, &VitalsConfig::default()).unwrap()
    }

    #[test]
    fn fresh_brave_agent_prefers_exploring() {
        // alice: brave, energy 100, hunger 80, happy mood.
        let a = agent("alice");
        assert_eq!(a.personality, Personality::Brave);
        let explore = WeightedDecisionEngine::priority_for(ActionKind::Explore, &a).unwrap();
        let rest = WeightedDecisionEngine::priority_for(ActionKind::Rest, &a).unwrap();
        assert_eq!(explore, 50 + 20 + 20 + a.mood.influence_tenths());
        assert_eq!(rest, 20);
        assert!(explore > rest);
    }

    #[test]
    fn busy_or_dead_agents_have_no_candidates() {
        let mut a = agent("alice");
        a.status = AgentStatus::Resting;
        assert!(WeightedDecisionEngine::candidates(&a).is_empty());
        a.status = AgentStatus::Dead;
        assert!(WeightedDecisionEngine::candidates(&a).is_empty());

        let mut rng = StdRng::seed_from_u64(1);
        let action = WeightedDecisionEngine.decide(&a, &mut rng);
        assert_eq!(action, Action::idle());
    }

    #[test]
    fn tired_agent_rests_first() {
        let mut a = agent("bob");
        a.energy = 10;
        a.mood = Mood::Tired;
        let explore = WeightedDecisionEngine::priority_for(ActionKind::Explore, &a);
        let rest = WeightedDecisionEngine::priority_for(ActionKind::Rest, &a).unwrap();
        // energy 10 is below the explore threshold.
        assert_eq!(explore, None);
        // 20 + 80 (low energy) + 50 (tired) + 20 (cautious)
        assert_eq!(rest, 170);
    }

    #[test]
    fn eat_thresholds() {
        let mut a = agent("alice");
        for (hunger, expected) in [(10, Some(100)), (30, Some(70)), (50, Some(30)), (70, Some(10)), (85, None), (95, None)] {
            a.hunger = hunger;
            assert_eq!(WeightedDecisionEngine::priority_for(ActionKind::Eat, &a), expected, "hunger {hunger}");
        }
    }

    #[test]
    fn greedy_snacks_earlier() {
        let mut a = agent("bobby1");
        assert_eq!(a.personality, Personality::Greedy);
        a.hunger = 82;
        assert_eq!(WeightedDecisionEngine::priority_for(ActionKind::Eat, &a), Some(15));
    }

    #[test]
    fn socialize_ineligible_when_satisfied() {
        let mut a = agent("alice");
        a.social = 95;
        assert_eq!(WeightedDecisionEngine::priority_for(ActionKind::Socialize, &a), None);
        a.social = 20;
        assert!(WeightedDecisionEngine::priority_for(ActionKind::Socialize, &a).unwrap() >= 90);
    }

    #[test]
    fn single_candidate_needs_no_randomness() {
        let mut rng = StdRng::seed_from_u64(0);
        let only = [(ActionKind::Rest, 5)];
        for _ in 0..10 {
            assert_eq!(WeightedDecisionEngine::select_weighted(&only, &mut rng), Some((ActionKind::Rest, 5)));
        }
        assert_eq!(WeightedDecisionEngine::select_weighted(&[], &mut rng), None);
    }

    #[test]
    fn selection_frequency_tracks_weights() {
        let mut rng = StdRng::seed_from_u64(42);
        let candidates = [(ActionKind::Explore, 60), (ActionKind::Rest, 30), (ActionKind::Eat, 10)];
        let mut counts = [0_u32; 3];
        let trials = 20_000;
        for _ in 0..trials {
            let (kind, _) = WeightedDecisionEngine::select_weighted(&candidates, &mut rng).unwrap();
            let slot = candidates.iter().position(|(k, _)| *k == kind).unwrap();
            counts[slot] += 1;
        }
        // Expect 12000 / 6000 / 2000; allow 5% of trials either way.
        for (count, expected) in counts.iter().zip([12_000_u32, 6_000, 2_000]) {
            assert!(count.abs_diff(expected) < 1_000, "{count} vs {expected}");
        }
    }

    #[test]
    fn zero_weights_fall_back_to_uniform() {
        let mut rng = StdRng::seed_from_u64(3);
        let candidates = [(ActionKind::Explore, 0), (ActionKind::Rest, 0)];
        let picked = WeightedDecisionEngine::select_weighted(&candidates, &mut rng);
        assert!(picked.is_some());
    }

    #[test]
    fn durations_stay_in_range() {
        let a = agent("alice");
        let mut rng = StdRng::seed_from_u64(9);
        let bounds = [
            (ActionKind::Explore, 30, 89),
            (ActionKind::Rest, 20, 49),
            (ActionKind::Socialize, 25, 64),
            (ActionKind::Eat, 10, 29),
        ];
        for (kind, low, high) in bounds {
            let drawn: Vec<u64> = (0..2_000)
                .map(|_| WeightedDecisionEngine::action_for(kind, 1, &a, &mut rng).duration_secs)
                .collect();
            assert!(drawn.iter().all(|d| (low..=high).contains(d)), "{kind:?} out of range");
            assert_eq!(drawn.iter().min(), Some(&low), "{kind:?} never hit its minimum");
            assert_eq!(drawn.iter().max(), Some(&high), "{kind:?} never hit its maximum");
        }
    }

    #[test]
    fn scripted_source_plays_back_then_idles() {
        let source = ScriptedDecisionSource::new([Action {
            kind: ActionKind::Rest,
            priority: 100,
            reason: "scripted".to_owned(),
            duration_secs: 5,
        }]);
        let a = agent("alice");
        let mut rng = StdRng::seed_from_u64(0);
        assert_eq!(source.decide(&a, &mut rng).kind, ActionKind::Rest);
        assert_eq!(source.remaining(), 0);
        assert_eq!(source.decide(&a, &mut rng), Action::idle());
    }
}
