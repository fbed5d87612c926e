//! Agent creation.
//!
//! A new agent is fully determined by its owner string and the
//! [`VitalsConfig`]: the name and personality are picked from fixed tables
//! by the length of the owner, then the personality bonus is applied once.

use chrono::Utc;
use menagerie_types::{Agent, AgentId, AgentStatus, Mood, Personality};

use crate::config::VitalsConfig;
use crate::error::AgentError;
use crate::vitals;

/// Names handed out to new agents.
pub const NAMES: [&str; 10] = [
    "Lucky", "Brave", "Shadow", "Spark", "Whisper", "Thunder", "Frost", "Blaze", "Swift", "Mystic",
];

/// Pick the table entry for an owner (by character count).
fn pick<T: Copy>(table: &[T], owner: &str, fallback: T) -> T {
    owner
        .chars()
        .count()
        .checked_rem(table.len())
        .and_then(|i| table.get(i).copied())
        .unwrap_or(fallback)
}

/// Create a new agent for `owner` with starting vitals from `config`.
///
/// # Errors
///
/// Returns [`AgentError::EmptyOwner`] if `owner` is empty or whitespace.
pub fn spawn_agent(owner: &str, config: &VitalsConfig) -> Result<Agent, AgentError> {
    let owner = owner.trim();
    if owner.is_empty() {
        return Err(AgentError::EmptyOwner);
    }

    let now = Utc::now();
    let mut agent = Agent {
        id: AgentId::new(),
        owner: owner.to_owned(),
        name: pick(&NAMES, owner, "Lucky").to_owned(),
        personality: pick(&Personality::ALL, owner, Personality::Brave),
        level: 1,
        experience: 0,
        health: config.starting_health,
        max_health: config.starting_health,
        energy: config.starting_energy,
        max_energy: config.starting_energy,
        hunger: config.starting_hunger,
        social: config.starting_social,
        attack: config.starting_attack,
        defense: config.starting_defense,
        coins: 0,
        location: config.starting_location.clone(),
        status: AgentStatus::Idle,
        mood: Mood::Neutral,
        memory: Vec::new(),
        friends: Vec::new(),
        created_at: now,
        last_activity: now,
        revision: 0,
    };

    apply_personality_bonus(&mut agent, config)?;
    vitals::refresh_mood(&mut agent);
    Ok(agent)
}

/// One-off stat adjustments for the agent's personality.
fn apply_personality_bonus(agent: &mut Agent, config: &VitalsConfig) -> Result<(), AgentError> {
    match agent.personality {
        Personality::Brave => {
            agent.attack = agent.attack.saturating_add(3);
            vitals::restore_energy(agent, 10);
        }
        Personality::Greedy => {
            vitals::credit_coins(agent, 50)?;
        }
        Personality::Friendly => vitals::increase_social(agent, 20),
        Personality::Cautious => {
            agent.defense = agent.defense.saturating_add(3);
            agent.max_health = agent.max_health.saturating_add(20);
            agent.health = agent.health.saturating_add(20);
        }
        Personality::Curious => {
            vitals::gain_experience(agent, 20, config);
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn alice_gets_a_healthy_idle_agent() {
        let agent = spawn_agent("alice", &VitalsConfig::default()).unwrap();
        assert_eq!(agent.owner, "alice");
        assert_eq!(agent.status, AgentStatus::Idle);
        assert_eq!(agent.health, 100);
        assert_eq!(agent.level, 1);
        assert_eq!(agent.hunger, 80);
        // five characters -> index 5 / index 0
        assert_eq!(agent.name, "Thunder");
        assert_eq!(agent.personality, Personality::Brave);
        assert_eq!(agent.attack, 13);
    }

    #[test]
    fn personality_bonuses_apply_once() {
        let config = VitalsConfig::default();

        let greedy = spawn_agent("bobby1", &config).unwrap();
        assert_eq!(greedy.personality, Personality::Greedy);
        assert_eq!(greedy.coins, 50);

        let cautious = spawn_agent("bob", &config).unwrap();
        assert_eq!(cautious.personality, Personality::Cautious);
        assert_eq!(cautious.max_health, 120);
        assert_eq!(cautious.health, 120);
        assert_eq!(cautious.defense, 8);

        let curious = spawn_agent("curiosity", &config).unwrap();
        assert_eq!(curious.personality, Personality::Curious);
        assert_eq!(curious.experience, 20);
    }

    #[test]
    fn blank_owner_is_rejected() {
        assert!(matches!(
            spawn_agent("   ", &VitalsConfig::default()),
            Err(AgentError::EmptyOwner)
        ));
    }
}
