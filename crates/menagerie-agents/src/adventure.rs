//! Outcomes of a finished exploration.
//!
//! When an exploration completes, one of five outcomes is rolled with equal
//! probability: reaching a new location, a battle, a discovery, meeting
//! someone, or a coin reward (with a small chance of a rare find). The
//! roll mutates the agent and returns the events describing what happened.

use menagerie_types::{Agent, Event, EventKind, EventPayload, Personality};
use rand::Rng;
use rand::seq::IndexedRandom;

use crate::config::VitalsConfig;
use crate::vitals;

// ---------------------------------------------------------------------------
// Static content
// ---------------------------------------------------------------------------

/// An opponent met while exploring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Monster {
    /// Display name.
    pub name: &'static str,
    /// Attack stat.
    pub attack: u32,
    /// Defense stat.
    pub defense: u32,
    /// Experience awarded on victory.
    pub exp_reward: u32,
    /// Coins awarded on victory.
    pub coin_reward: u32,
}

/// Opponents, weakest first.
pub static MONSTERS: [Monster; 5] = [
    Monster { name: "Wild Boar", attack: 8, defense: 2, exp_reward: 15, coin_reward: 5 },
    Monster { name: "Forest Wolf", attack: 12, defense: 3, exp_reward: 20, coin_reward: 8 },
    Monster { name: "Bandit", attack: 15, defense: 5, exp_reward: 30, coin_reward: 15 },
    Monster { name: "Giant Spider", attack: 18, defense: 4, exp_reward: 35, coin_reward: 12 },
    Monster { name: "Cave Bear", attack: 20, defense: 8, exp_reward: 50, coin_reward: 25 },
];

/// Places an explorer can end up.
pub static LOCATIONS: [&str; 10] = [
    "Northern Forest",
    "Eastern Mountains",
    "Southern Swamp",
    "Western Plains",
    "Mystic Cave",
    "Ancient Ruins",
    "Crystal Mine",
    "Enchanted Grove",
    "Shadow Canyon",
    "Sky City Remains",
];

static DISCOVERIES: [&str; 8] = [
    "a treasure chest",
    "a strange crystal",
    "an old scroll",
    "a glittering gem",
    "a magic potion",
    "an ancient rune",
    "a rare ore",
    "a lost relic",
];

static STRANGERS: [&str; 5] = ["Ming", "Hong", "Qiang", "Lili", "Hu"];

/// Chance of a rare find on a reward roll, in percent.
const RARE_FIND_PERCENT: u32 = 5;

// ---------------------------------------------------------------------------
// Battle
// ---------------------------------------------------------------------------

/// Result of one battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BattleReport {
    /// Whether the agent won.
    pub victory: bool,
    /// Health lost on defeat.
    pub damage: u32,
    /// Whether the victory pushed the agent to a new level.
    pub levelled_up: bool,
}

const fn personality_battle_bonus(personality: Personality) -> u32 {
    match personality {
        Personality::Brave => 5,
        Personality::Cautious => 3,
        Personality::Greedy => 2,
        Personality::Friendly | Personality::Curious => 0,
    }
}

/// Fight `monster`. Winning grants experience and coins, losing costs
/// health (reduced by defense).
pub fn resolve_battle<R: Rng + ?Sized>(
    agent: &mut Agent,
    monster: &Monster,
    config: &VitalsConfig,
    rng: &mut R,
) -> BattleReport {
    let agent_power = agent
        .attack
        .saturating_add(agent.defense)
        .saturating_add(agent.level.saturating_mul(2))
        .saturating_add(personality_battle_bonus(agent.personality))
        .saturating_add(rng.random_range(0..20));
    let monster_power = monster
        .attack
        .saturating_add(monster.defense)
        .saturating_add(rng.random_range(0..15));

    if agent_power > monster_power {
        let levelled_up = vitals::gain_experience(agent, monster.exp_reward, config);
        agent.coins = agent.coins.saturating_add(u64::from(monster.coin_reward));
        BattleReport { victory: true, damage: 0, levelled_up }
    } else {
        let damage = vitals::take_damage(agent, monster.attack);
        BattleReport { victory: false, damage, levelled_up: false }
    }
}

// ---------------------------------------------------------------------------
// Exploration roll
// ---------------------------------------------------------------------------

fn coin_delta(coins: u32) -> i64 {
    i64::from(coins)
}

/// Roll the outcome of a finished exploration and apply it to `agent`.
///
/// Returns the events to append, main outcome first. A level up or a fatal
/// defeat adds a follow-up event.
pub fn roll_exploration<R: Rng + ?Sized>(
    agent: &mut Agent,
    config: &VitalsConfig,
    rng: &mut R,
) -> Vec<Event> {
    let mut events = Vec::with_capacity(2);

    match rng.random_range(0..5_u8) {
        0 => {
            let location = LOCATIONS.choose(rng).copied().unwrap_or("Home");
            location.clone_into(&mut agent.location);
            let message = format!("[{}] arrived at {location} and starts looking around", agent.name);
            vitals::add_memory(agent, format!("visited {location}"));
            events.push(Event::new(agent, EventKind::Explore, message).with_payload(EventPayload {
                location: Some(location.to_owned()),
                ..EventPayload::default()
            }));
        }
        1 => {
            let Some(monster) = MONSTERS.choose(rng) else {
                return events;
            };
            let report = resolve_battle(agent, monster, config, rng);
            let message = if report.victory {
                format!(
                    "[{}] defeated the {}! +{} exp, +{} coins",
                    agent.name, monster.name, monster.exp_reward, monster.coin_reward
                )
            } else {
                format!("[{}] lost to the {} and took {} damage", agent.name, monster.name, report.damage)
            };
            vitals::add_memory(agent, format!("fought a {}", monster.name));
            events.push(Event::new(agent, EventKind::Battle, message).with_payload(EventPayload {
                enemy: Some(monster.name.to_owned()),
                victory: Some(report.victory),
                experience: Some(monster.exp_reward),
                coins: if report.victory { coin_delta(monster.coin_reward) } else { 0 },
                ..EventPayload::default()
            }));
            if report.levelled_up {
                let message = format!("[{}] reached level {}!", agent.name, agent.level);
                events.push(Event::new(agent, EventKind::LevelUp, message));
            }
            if !agent.is_alive() {
                let message = format!("[{}] was defeated by the {} and did not recover", agent.name, monster.name);
                events.push(Event::new(agent, EventKind::Death, message));
            }
        }
        2 => {
            let coins = rng.random_range(5..25_u32);
            let item = DISCOVERIES.choose(rng).copied().unwrap_or("something shiny");
            agent.coins = agent.coins.saturating_add(u64::from(coins));
            let message = format!("[{}] found {item} worth {coins} coins!", agent.name);
            events.push(Event::new(agent, EventKind::Discovery, message).with_coins(coin_delta(coins)));
        }
        3 => {
            let stranger = STRANGERS.choose(rng).copied().unwrap_or("a stranger");
            let message = format!("[{}] met {stranger}'s pet and made a friend!", agent.name);
            vitals::add_memory(agent, format!("met {stranger}'s pet"));
            events.push(Event::new(agent, EventKind::Social, message).with_payload(EventPayload {
                friend: Some(stranger.to_owned()),
                ..EventPayload::default()
            }));
        }
        _ => {
            if rng.random_range(0..100_u32) < RARE_FIND_PERCENT {
                let coins = rng.random_range(500..1500_u32);
                agent.coins = agent.coins.saturating_add(u64::from(coins));
                let message = format!("[{}] struck a hidden vein! Jackpot of {coins} coins!", agent.name);
                events.push(Event::new(agent, EventKind::RareFind, message).with_coins(coin_delta(coins)));
            } else {
                let coins = rng.random_range(10..60_u32);
                agent.coins = agent.coins.saturating_add(u64::from(coins));
                let message = format!("[{}] picked up some loose coins: +{coins}", agent.name);
                events.push(Event::new(agent, EventKind::Reward, message).with_coins(coin_delta(coins)));
            }
        }
    }

    events
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use menagerie_types::AgentStatus;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::agent::spawn_agent;

    #[test]
    fn strong_agent_always_beats_the_boar() {
        let config = VitalsConfig::default();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let mut agent = spawn_agent("alice", &config).unwrap();
            agent.attack = 50;
            let coins = agent.coins;
            let report = resolve_battle(&mut agent, &MONSTERS[0], &config, &mut rng);
            assert!(report.victory);
            assert_eq!(agent.coins, coins + 5);
        }
    }

    #[test]
    fn weak_agent_loses_to_the_bear_and_takes_damage() {
        let config = VitalsConfig::default();
        let mut rng = StdRng::seed_from_u64(2);
        let mut agent = spawn_agent("alice", &config).unwrap();
        agent.attack = 0;
        agent.defense = 0;
        agent.level = 0;
        // Brave bonus 5 + at most 19 never beats 28 + roll.
        let report = resolve_battle(&mut agent, &MONSTERS[4], &config, &mut rng);
        assert!(!report.victory);
        assert_eq!(report.damage, 20);
        assert_eq!(agent.health, 80);
    }

    #[test]
    fn every_roll_produces_a_main_event() {
        let config = VitalsConfig::default();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..500 {
            let mut agent = spawn_agent("alice", &config).unwrap();
            let events = roll_exploration(&mut agent, &config, &mut rng);
            assert!(!events.is_empty());
            assert!(events.iter().all(|e| e.agent_id == agent.id));
            assert_ne!(agent.status, AgentStatus::Dead);
        }
    }

    #[test]
    fn coin_outcomes_carry_the_delta() {
        let config = VitalsConfig::default();
        let mut rng = StdRng::seed_from_u64(4);
        for _ in 0..500 {
            let mut agent = spawn_agent("alice", &config).unwrap();
            let before = agent.coins;
            let events = roll_exploration(&mut agent, &config, &mut rng);
            let main = &events[0];
            if matches!(main.kind, EventKind::Discovery | EventKind::Reward | EventKind::RareFind) {
                let gained = i64::try_from(agent.coins - before).unwrap();
                assert_eq!(main.payload.coins, gained);
            }
        }
    }
}
