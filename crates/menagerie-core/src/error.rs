//! Errors returned by the simulation service.
//!
//! Caller errors (unknown agent, wrong state, bad amount) are detected
//! before any state is touched, so a returned error never leaves a
//! half-applied mutation behind.

use menagerie_agents::AgentError;
use menagerie_db::DbError;
use menagerie_types::{AgentId, AgentStatus};

use crate::config::ConfigError;

/// Errors from simulation operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// No agent with this id.
    #[error("agent {0} not found")]
    AgentNotFound(AgentId),

    /// No agent belongs to this owner.
    #[error("no agent for owner {0}")]
    OwnerNotFound(String),

    /// The agent is dead.
    #[error("agent {0} is not alive")]
    AgentNotAlive(AgentId),

    /// The agent's current state does not allow the request.
    #[error("agent {agent_id} cannot {action} while {status}")]
    InvalidState {
        /// The agent.
        agent_id: AgentId,
        /// Its current status.
        status: AgentStatus,
        /// What was requested.
        action: &'static str,
    },

    /// The owner already has an agent.
    #[error("owner {0} already has an agent")]
    DuplicateOwner(String),

    /// The owner name was empty.
    #[error("owner must not be empty")]
    EmptyOwner,

    /// The command name is not recognised.
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// An amount parameter was out of range.
    #[error("amount {amount} out of range {min}..={max}")]
    InvalidAmount {
        /// The rejected amount.
        amount: i64,
        /// Smallest accepted value.
        min: i64,
        /// Largest accepted value.
        max: i64,
    },

    /// The agent cannot afford the request.
    #[error("not enough coins: need {needed}, have {available}")]
    InsufficientCoins {
        /// Coins required.
        needed: u64,
        /// Coins held.
        available: u64,
    },

    /// A persistence call failed.
    #[error("persistence error: {0}")]
    Persistence(#[from] DbError),

    /// Agent logic rejected the operation.
    #[error("agent error: {0}")]
    Agent(#[from] AgentError),

    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}
