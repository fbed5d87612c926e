//! Named commands sent by a transport collaborator.
//!
//! A command arrives as a name plus a JSON parameter object. Missing or
//! non-integer parameters fall back to their defaults; integers outside
//! the accepted range are rejected before anything is touched.

use std::sync::Arc;

use menagerie_agents::vitals;
use menagerie_types::{Action, ActionKind, Agent, AgentId, Event, EventKind};
use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;
use crate::scheduler::ActionScheduler;

/// Longest rest a command may ask for, in seconds.
const MAX_REST_SECS: i64 = 3_600;
/// Largest single feeding.
const MAX_FEED: i64 = 100;
/// Largest debug coin grant.
const MAX_COIN_GRANT: i64 = 10_000;

/// A parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Rest for `duration_secs`.
    Rest {
        /// Rest duration.
        duration_secs: u64,
    },
    /// Feed immediately, paying half the amount in coins.
    Feed {
        /// Satiety to add.
        amount: u32,
    },
    /// Socialize with the first other living agent.
    Socialize,
    /// Explore towards a named direction.
    Explore {
        /// Free-form direction used in the start message.
        direction: String,
    },
    /// Grant coins (debugging aid).
    AddCoins {
        /// Coins to add.
        amount: u64,
    },
}

fn int_param(params: &Value, key: &str, default: i64, min: i64, max: i64) -> Result<i64, CoreError> {
    let amount = params.get(key).and_then(Value::as_i64).unwrap_or(default);
    if (min..=max).contains(&amount) {
        Ok(amount)
    } else {
        Err(CoreError::InvalidAmount { amount, min, max })
    }
}

impl Command {
    /// Parse a command name and its parameters.
    pub fn parse(name: &str, params: &Value) -> Result<Self, CoreError> {
        match name {
            "rest" => {
                let secs = int_param(params, "duration", 30, 1, MAX_REST_SECS)?;
                Ok(Self::Rest {
                    duration_secs: secs.unsigned_abs(),
                })
            }
            "feed" => {
                let amount = int_param(params, "amount", 20, 1, MAX_FEED)?;
                Ok(Self::Feed {
                    amount: u32::try_from(amount).unwrap_or(u32::MAX),
                })
            }
            "socialize" => Ok(Self::Socialize),
            "explore" => {
                let direction = params
                    .get("direction")
                    .and_then(Value::as_str)
                    .filter(|d| !d.trim().is_empty())
                    .unwrap_or("unknown direction");
                Ok(Self::Explore {
                    direction: direction.to_owned(),
                })
            }
            "addcoins" => {
                let amount = int_param(params, "amount", 100, 1, MAX_COIN_GRANT)?;
                Ok(Self::AddCoins {
                    amount: amount.unsigned_abs(),
                })
            }
            other => Err(CoreError::UnknownCommand(other.to_owned())),
        }
    }

    /// The command's name.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Rest { .. } => "rest",
            Self::Feed { .. } => "feed",
            Self::Socialize => "socialize",
            Self::Explore { .. } => "explore",
            Self::AddCoins { .. } => "addcoins",
        }
    }
}

/// Command-specific results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum CommandDetail {
    /// Rest started.
    Rest {
        /// Rest duration.
        duration_secs: u64,
    },
    /// Agent was fed.
    Feed {
        /// Satiety added (before capping).
        amount: u32,
        /// Coins paid.
        cost: u64,
    },
    /// Socializing started.
    Socialize,
    /// Exploring started.
    Explore {
        /// Requested direction.
        direction: String,
    },
    /// Coins were granted.
    #[serde(rename = "addcoins")]
    AddCoins {
        /// Coins added.
        amount: u64,
        /// Balance before.
        old_coins: u64,
        /// Balance after.
        new_coins: u64,
    },
}

/// What a command did, plus the agent afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    /// Human-readable summary.
    pub message: String,
    /// Command-specific values.
    pub detail: CommandDetail,
    /// Snapshot of the agent after the command.
    pub agent: Agent,
}

impl ActionScheduler {
    /// Run `command` against agent `id`.
    ///
    /// Failed preconditions return an error and leave the agent unchanged.
    pub async fn execute(self: &Arc<Self>, id: AgentId, command: Command) -> Result<CommandOutcome, CoreError> {
        tracing::debug!(agent_id = %id, command = command.name(), "Executing command");
        match command {
            Command::Rest { duration_secs } => {
                let agent = self
                    .begin(id, commanded(ActionKind::Rest, "rests on command", duration_secs))
                    .await?;
                Ok(CommandOutcome {
                    message: format!("{} starts resting for {duration_secs} seconds", agent.name),
                    detail: CommandDetail::Rest { duration_secs },
                    agent,
                })
            }
            Command::Socialize => {
                let agent = self
                    .begin(id, commanded(ActionKind::Socialize, "socializes on command", 40))
                    .await?;
                Ok(CommandOutcome {
                    message: format!("{} starts socializing", agent.name),
                    detail: CommandDetail::Socialize,
                    agent,
                })
            }
            Command::Explore { direction } => {
                let reason = format!("explores towards {direction} on command");
                let agent = self.begin(id, commanded(ActionKind::Explore, &reason, 60)).await?;
                Ok(CommandOutcome {
                    message: format!("{} sets off towards {direction}", agent.name),
                    detail: CommandDetail::Explore { direction },
                    agent,
                })
            }
            Command::Feed { amount } => self.feed(id, amount).await,
            Command::AddCoins { amount } => self.add_coins(id, amount).await,
        }
    }

    async fn feed(&self, id: AgentId, amount: u32) -> Result<CommandOutcome, CoreError> {
        let cost = u64::from(amount / 2);
        let ((), agent) = self
            .context()
            .mutate(id, |agent| {
                if !agent.is_alive() {
                    return Err(CoreError::AgentNotAlive(id));
                }
                if !vitals::debit_coins(agent, cost) {
                    return Err(CoreError::InsufficientCoins {
                        needed: cost,
                        available: agent.coins,
                    });
                }
                vitals::feed(agent, amount);
                let message = format!("[{}] was fed {amount} for {cost} coins", agent.name);
                let event = Event::new(agent, EventKind::Reward, message).with_coins(0_i64.saturating_sub_unsigned(cost));
                Ok(((), vec![event]))
            })
            .await?;

        Ok(CommandOutcome {
            message: format!("{} ate {amount}", agent.name),
            detail: CommandDetail::Feed { amount, cost },
            agent,
        })
    }

    async fn add_coins(&self, id: AgentId, amount: u64) -> Result<CommandOutcome, CoreError> {
        let (old_coins, agent) = self
            .context()
            .mutate(id, |agent| {
                if !agent.is_alive() {
                    return Err(CoreError::AgentNotAlive(id));
                }
                let old_coins = agent.coins;
                let total = vitals::credit_coins(agent, amount)?;
                let message = format!("[{}] debug: +{amount} coins (total {total})", agent.name);
                let delta = i64::try_from(amount).unwrap_or(i64::MAX);
                Ok((old_coins, vec![Event::new(agent, EventKind::Debug, message).with_coins(delta)]))
            })
            .await?;

        Ok(CommandOutcome {
            message: format!("{} received {amount} coins, now {}", agent.name, agent.coins),
            detail: CommandDetail::AddCoins {
                amount,
                old_coins,
                new_coins: agent.coins,
            },
            agent,
        })
    }
}

fn commanded(kind: ActionKind, reason: &str, duration_secs: u64) -> Action {
    Action {
        kind,
        priority: 100,
        reason: reason.to_owned(),
        duration_secs,
    }
}
