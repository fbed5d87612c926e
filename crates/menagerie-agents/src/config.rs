//! Configuration constants and defaults for agent vital mechanics.
//!
//! The [`VitalsConfig`] struct bundles every tunable that the factory, the
//! decay loop, and levelling read, so callers (scheduler, tests) can
//! override defaults. It deserializes from the `vitals` section of
//! `menagerie.yaml`; missing keys keep their defaults.

use serde::Deserialize;

/// Configuration for agent creation, decay, and levelling.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VitalsConfig {
    /// Starting and maximum health for new agents (default: 100).
    pub starting_health: u32,

    /// Starting and maximum energy for new agents (default: 100).
    pub starting_energy: u32,

    /// Starting satiety (default: 80).
    pub starting_hunger: u32,

    /// Starting social need (default: 50).
    pub starting_social: u32,

    /// Starting attack (default: 10).
    pub starting_attack: u32,

    /// Starting defense (default: 5).
    pub starting_defense: u32,

    /// Where new agents appear.
    pub starting_location: String,

    /// Energy lost per decay tick (default: 2).
    pub energy_decay: u32,

    /// Energy lost per decay tick while exploring (default: 5).
    pub energy_decay_exploring: u32,

    /// Satiety lost per decay tick (default: 3).
    pub hunger_decay: u32,

    /// Satiety lost per decay tick while exploring (default: 5).
    pub hunger_decay_exploring: u32,

    /// Social need lost per decay tick unless socializing (default: 1).
    pub social_decay: u32,

    /// Satiety below which starvation damage applies (default: 20).
    pub starvation_threshold: u32,

    /// Health lost per decay tick while starving (default: 5).
    pub starvation_damage: u32,

    /// Experience needed per level; the threshold is `level * exp_per_level`
    /// (default: 100).
    pub exp_per_level: u32,

    /// Max health gained on level up (default: 20).
    pub level_up_health: u32,

    /// Attack gained on level up (default: 5).
    pub level_up_attack: u32,

    /// Defense gained on level up (default: 3).
    pub level_up_defense: u32,
}

impl Default for VitalsConfig {
    fn default() -> Self {
        Self {
            starting_health: 100,
            starting_energy: 100,
            starting_hunger: 80,
            starting_social: 50,
            starting_attack: 10,
            starting_defense: 5,
            starting_location: String::from("Home"),
            energy_decay: 2,
            energy_decay_exploring: 5,
            hunger_decay: 3,
            hunger_decay_exploring: 5,
            social_decay: 1,
            starvation_threshold: 20,
            starvation_damage: 5,
            exp_per_level: 100,
            level_up_health: 20,
            level_up_attack: 5,
            level_up_defense: 3,
        }
    }
}

impl VitalsConfig {
    /// Experience required to advance from `level`.
    ///
    /// Saturates instead of overflowing for absurd levels.
    pub const fn exp_threshold(&self, level: u32) -> u32 {
        level.saturating_mul(self.exp_per_level)
    }
}
