//! Clamped vital mutations and mood scoring.
//!
//! Every function here keeps the agent invariants intact:
//!
//! - `health <= max_health`, `energy <= max_energy`
//! - `hunger` and `social` stay within `0..=100`
//! - reaching zero health moves the agent to [`AgentStatus::Dead`]
//! - mood is recomputed after every vital change
//!
//! All arithmetic is saturating or checked. No panics, no silent overflow.

use menagerie_types::{Agent, AgentStatus, MEMORY_CAPACITY, Mood, NEED_MAX};

use crate::config::VitalsConfig;
use crate::error::AgentError;

// ---------------------------------------------------------------------------
// Ratio helpers
// ---------------------------------------------------------------------------

/// `value / max > tenths / 10`, computed without division.
pub fn ratio_above(value: u32, max: u32, tenths: u64) -> bool {
    u64::from(value).saturating_mul(10) > u64::from(max).saturating_mul(tenths)
}

/// `value / max < tenths / 10`, computed without division.
///
/// A zero `max` counts as an empty ratio.
pub fn ratio_below(value: u32, max: u32, tenths: u64) -> bool {
    if max == 0 {
        return true;
    }
    u64::from(value).saturating_mul(10) < u64::from(max).saturating_mul(tenths)
}

// ---------------------------------------------------------------------------
// Mood
// ---------------------------------------------------------------------------

/// Score the agent's vitals and map the score to a [`Mood`].
pub fn compute_mood(agent: &Agent) -> Mood {
    let mut score: i32 = 0;

    if ratio_above(agent.health, agent.max_health, 8) {
        score = score.saturating_add(2);
    } else if ratio_below(agent.health, agent.max_health, 3) {
        score = score.saturating_sub(3);
    }

    if ratio_above(agent.energy, agent.max_energy, 8) {
        score = score.saturating_add(1);
    } else if ratio_below(agent.energy, agent.max_energy, 2) {
        score = score.saturating_sub(2);
    }

    if agent.hunger > 80 {
        score = score.saturating_add(1);
    } else if agent.hunger < 30 {
        score = score.saturating_sub(2);
    }

    if agent.social > 70 {
        score = score.saturating_add(1);
    } else if agent.social < 30 {
        score = score.saturating_sub(1);
    }

    match score {
        s if s >= 3 => Mood::Excited,
        s if s >= 1 => Mood::Happy,
        s if s >= -1 => Mood::Neutral,
        s if s >= -3 => Mood::Sad,
        _ => Mood::Tired,
    }
}

/// Recompute and store the agent's mood.
pub fn refresh_mood(agent: &mut Agent) {
    agent.mood = compute_mood(agent);
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

/// Apply incoming damage reduced by the agent's defense.
///
/// At least one point is always applied. Returns the damage dealt.
pub fn take_damage(agent: &mut Agent, damage: u32) -> u32 {
    let dealt = damage.saturating_sub(agent.defense).max(1);
    lose_health(agent, dealt)
}

/// Remove health directly, ignoring defense. Returns the amount removed.
pub fn lose_health(agent: &mut Agent, amount: u32) -> u32 {
    let removed = amount.min(agent.health);
    agent.health = agent.health.saturating_sub(amount);
    if agent.health == 0 {
        agent.status = AgentStatus::Dead;
    }
    refresh_mood(agent);
    removed
}

/// Restore health up to `max_health`. Dead agents are not revived.
pub fn heal(agent: &mut Agent, amount: u32) {
    if !agent.is_alive() {
        return;
    }
    agent.health = agent.health.saturating_add(amount).min(agent.max_health);
    refresh_mood(agent);
}

// ---------------------------------------------------------------------------
// Energy, hunger, social
// ---------------------------------------------------------------------------

/// Remove energy, flooring at zero.
pub fn consume_energy(agent: &mut Agent, amount: u32) {
    agent.energy = agent.energy.saturating_sub(amount);
    refresh_mood(agent);
}

/// Add energy, capped at `max_energy`.
pub fn restore_energy(agent: &mut Agent, amount: u32) {
    agent.energy = agent.energy.saturating_add(amount).min(agent.max_energy);
    refresh_mood(agent);
}

/// Lower satiety, flooring at zero.
pub fn consume_hunger(agent: &mut Agent, amount: u32) {
    agent.hunger = agent.hunger.saturating_sub(amount);
    refresh_mood(agent);
}

/// Raise satiety, capped at 100.
pub fn feed(agent: &mut Agent, amount: u32) {
    agent.hunger = agent.hunger.saturating_add(amount).min(NEED_MAX);
    refresh_mood(agent);
}

/// Raise the social need, capped at 100.
pub fn increase_social(agent: &mut Agent, amount: u32) {
    agent.social = agent.social.saturating_add(amount).min(NEED_MAX);
    refresh_mood(agent);
}

/// Lower the social need, flooring at zero.
pub fn decrease_social(agent: &mut Agent, amount: u32) {
    agent.social = agent.social.saturating_sub(amount);
    refresh_mood(agent);
}

// ---------------------------------------------------------------------------
// Coins
// ---------------------------------------------------------------------------

/// Add coins. Returns the new balance.
///
/// # Errors
///
/// Returns [`AgentError::ArithmeticOverflow`] if the balance would overflow.
pub fn credit_coins(agent: &mut Agent, amount: u64) -> Result<u64, AgentError> {
    agent.coins = agent
        .coins
        .checked_add(amount)
        .ok_or_else(|| AgentError::ArithmeticOverflow {
            context: format!("crediting {amount} coins to {}", agent.id),
        })?;
    Ok(agent.coins)
}

/// Remove coins if the balance covers `amount`. Returns whether it did.
pub fn debit_coins(agent: &mut Agent, amount: u64) -> bool {
    match agent.coins.checked_sub(amount) {
        Some(rest) => {
            agent.coins = rest;
            true
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Memory and friends
// ---------------------------------------------------------------------------

/// Remember something, keeping only the most recent entries.
pub fn add_memory(agent: &mut Agent, entry: impl Into<String>) {
    agent.memory.push(entry.into());
    let excess = agent.memory.len().saturating_sub(MEMORY_CAPACITY);
    if excess > 0 {
        agent.memory.drain(..excess);
    }
}

/// Add a friend unless already present. Returns whether it was new.
pub fn add_friend(agent: &mut Agent, friend: &str) -> bool {
    if agent.friends.iter().any(|f| f == friend) {
        return false;
    }
    agent.friends.push(friend.to_owned());
    true
}

// ---------------------------------------------------------------------------
// Experience
// ---------------------------------------------------------------------------

/// Add experience and level up once the threshold is reached.
///
/// Returns `true` if the agent levelled up.
pub fn gain_experience(agent: &mut Agent, exp: u32, config: &VitalsConfig) -> bool {
    agent.experience = agent.experience.saturating_add(exp);
    if agent.experience >= config.exp_threshold(agent.level) {
        level_up(agent, config);
        return true;
    }
    false
}

/// Advance one level: larger health pool, full heal, better stats.
pub fn level_up(agent: &mut Agent, config: &VitalsConfig) {
    agent.level = agent.level.saturating_add(1);
    agent.max_health = agent.max_health.saturating_add(config.level_up_health);
    agent.health = agent.max_health;
    agent.attack = agent.attack.saturating_add(config.level_up_attack);
    agent.defense = agent.defense.saturating_add(config.level_up_defense);
    agent.experience = 0;
    refresh_mood(agent);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::agent::spawn_agent;

    fn fresh() -> Agent {
        spawn_agent("alice", &VitalsConfig::default()).unwrap()
    }

    fn assert_in_bounds(agent: &Agent) {
        assert!(agent.health <= agent.max_health);
        assert!(agent.energy <= agent.max_energy);
        assert!(agent.hunger <= NEED_MAX);
        assert!(agent.social <= NEED_MAX);
        assert!(agent.memory.len() <= MEMORY_CAPACITY);
    }

    #[test]
    fn damage_respects_defense_and_floor() {
        let mut agent = fresh();
        agent.defense = 5;
        assert_eq!(take_damage(&mut agent, 12), 7);
        assert_eq!(take_damage(&mut agent, 3), 1);
        assert_eq!(agent.health, 92);
    }

    #[test]
    fn zero_health_is_death() {
        let mut agent = fresh();
        lose_health(&mut agent, 10_000);
        assert_eq!(agent.health, 0);
        assert_eq!(agent.status, AgentStatus::Dead);
        heal(&mut agent, 50);
        assert_eq!(agent.health, 0);
    }

    #[test]
    fn random_mutations_stay_in_bounds() {
        let config = VitalsConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        let mut agent = fresh();

        for step in 0..5_000_u32 {
            let amount = rng.random_range(0..150);
            match rng.random_range(0..10) {
                0 => {
                    take_damage(&mut agent, amount);
                }
                1 => heal(&mut agent, amount),
                2 => consume_energy(&mut agent, amount),
                3 => restore_energy(&mut agent, amount),
                4 => consume_hunger(&mut agent, amount),
                5 => feed(&mut agent, amount),
                6 => increase_social(&mut agent, amount),
                7 => decrease_social(&mut agent, amount),
                8 => {
                    gain_experience(&mut agent, amount, &config);
                }
                _ => add_memory(&mut agent, format!("step {step}")),
            }
            assert_in_bounds(&agent);
            if agent.status == AgentStatus::Dead {
                agent = fresh();
            }
        }
    }

    #[test]
    fn memory_keeps_most_recent_entries() {
        let mut agent = fresh();
        for i in 0..15 {
            add_memory(&mut agent, format!("m{i}"));
        }
        assert_eq!(agent.memory.len(), MEMORY_CAPACITY);
        assert_eq!(agent.memory.first().map(String::as_str), Some("m5"));
        assert_eq!(agent.memory.last().map(String::as_str), Some("m14"));
    }

    #[test]
    fn friends_are_deduplicated() {
        let mut agent = fresh();
        assert!(add_friend(&mut agent, "bob"));
        assert!(!add_friend(&mut agent, "bob"));
        assert_eq!(agent.friends, vec!["bob".to_owned()]);
    }

    #[test]
    fn levelling_resets_experience_and_heals() {
        let config = VitalsConfig::default();
        let mut agent = fresh();
        agent.health = 40;
        let attack = agent.attack;

        assert!(!gain_experience(&mut agent, 60, &config));
        assert!(gain_experience(&mut agent, 60, &config));
        assert_eq!(agent.level, 2);
        assert_eq!(agent.experience, 0);
        assert_eq!(agent.health, agent.max_health);
        assert_eq!(agent.attack, attack + 5);
    }

    #[test]
    fn coins_never_go_negative() {
        let mut agent = fresh();
        agent.coins = 5;
        assert!(!debit_coins(&mut agent, 6));
        assert_eq!(agent.coins, 5);
        assert!(debit_coins(&mut agent, 5));
        agent.coins = u64::MAX;
        assert!(credit_coins(&mut agent, 1).is_err());
    }

    #[test]
    fn mood_tracks_vitals() {
        let mut agent = fresh();
        agent.health = 100;
        agent.energy = 100;
        agent.hunger = 90;
        agent.social = 80;
        assert_eq!(compute_mood(&agent), Mood::Excited);

        agent.health = 20;
        agent.energy = 10;
        agent.hunger = 10;
        agent.social = 10;
        assert_eq!(compute_mood(&agent), Mood::Tired);
    }
}
