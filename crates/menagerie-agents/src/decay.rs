//! Natural decay applied by the global decay loop.
//!
//! Every decay tick, each living agent loses a little energy, satiety, and
//! social need. Exploring costs more. Agents whose satiety has dropped
//! below the starvation threshold lose health, which can kill them.

use menagerie_types::{Agent, AgentStatus};

use crate::config::VitalsConfig;
use crate::vitals;

/// What a decay tick did to one agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecayOutcome {
    /// Health lost to starvation, if the agent was starving.
    pub starvation_damage: Option<u32>,
    /// Whether the agent died this tick.
    pub died: bool,
}

/// Apply one tick of decay. Dead agents are left untouched.
pub fn apply_decay(agent: &mut Agent, config: &VitalsConfig) -> DecayOutcome {
    if !agent.is_alive() {
        return DecayOutcome::default();
    }

    let exploring = agent.status == AgentStatus::Exploring;
    let (energy, hunger) = if exploring {
        (config.energy_decay_exploring, config.hunger_decay_exploring)
    } else {
        (config.energy_decay, config.hunger_decay)
    };

    vitals::consume_energy(agent, energy);
    vitals::consume_hunger(agent, hunger);
    if agent.status != AgentStatus::Socializing {
        vitals::decrease_social(agent, config.social_decay);
    }

    let mut outcome = DecayOutcome::default();
    if agent.hunger < config.starvation_threshold {
        outcome.starvation_damage = Some(vitals::lose_health(agent, config.starvation_damage));
        outcome.died = agent.status == AgentStatus::Dead;
    }
    outcome
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::agent::spawn_agent;

    #[test]
    fn idle_agent_decays_at_base_rate() {
        let config = VitalsConfig::default();
        let mut agent = spawn_agent("alice", &config).unwrap();
        let outcome = apply_decay(&mut agent, &config);

        assert_eq!(agent.energy, 98);
        assert_eq!(agent.hunger, 77);
        assert_eq!(agent.social, 49);
        assert_eq!(outcome, DecayOutcome::default());
    }

    #[test]
    fn exploring_costs_more_and_socializing_keeps_social() {
        let config = VitalsConfig::default();
        let mut explorer = spawn_agent("alice", &config).unwrap();
        explorer.status = AgentStatus::Exploring;
        apply_decay(&mut explorer, &config);
        assert_eq!(explorer.energy, 95);
        assert_eq!(explorer.hunger, 75);

        let mut chatty = spawn_agent("alice", &config).unwrap();
        chatty.status = AgentStatus::Socializing;
        apply_decay(&mut chatty, &config);
        assert_eq!(chatty.social, 50);
    }

    #[test]
    fn starvation_damages_and_can_kill() {
        let config = VitalsConfig::default();
        let mut agent = spawn_agent("alice", &config).unwrap();
        agent.hunger = 10;
        agent.health = 7;

        let first = apply_decay(&mut agent, &config);
        assert_eq!(first.starvation_damage, Some(5));
        assert!(!first.died);

        let second = apply_decay(&mut agent, &config);
        assert_eq!(second.starvation_damage, Some(2));
        assert!(second.died);
        assert_eq!(agent.status, AgentStatus::Dead);

        assert_eq!(apply_decay(&mut agent, &config), DecayOutcome::default());
    }
}
