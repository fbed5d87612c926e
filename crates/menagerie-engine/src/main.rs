//! Simulation binary for Menagerie.
//!
//! Wires configuration, storage and the simulation service together and
//! runs until interrupted.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `menagerie.yaml` (or `MENAGERIE_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Connect to `PostgreSQL` and run migrations, or fall back to the
//!    in-memory repository when no URL is configured
//! 4. Start the simulation: load agents, warm the cache, spawn loops
//! 5. Adopt an agent for every owner named on the command line
//! 6. Log the event stream until ctrl-c, then shut down gracefully

mod error;

use std::path::PathBuf;

use anyhow::Context as _;
use menagerie_core::{CoreError, Simulation, SimulationConfig};
use menagerie_db::{MemoryRepository, PgRepository, PostgresConfig, PostgresPool, Repository};
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;

/// Config file used when `MENAGERIE_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "menagerie.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os("MENAGERIE_CONFIG")
        .map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = SimulationConfig::load_or_default(&config_path)
        .map_err(EngineError::from)
        .with_context(|| format!("loading {}", config_path.display()))?;

    init_logging(&config)?;
    info!(
        path = %config_path.display(),
        decision_interval_secs = config.scheduler.decision_interval_secs,
        decay_interval_secs = config.scheduler.decay_interval_secs,
        seed = ?config.seed,
        "menagerie-engine starting"
    );

    let (repository, pool) = connect_repository(&config).await.context("connecting storage")?;
    let simulation = Simulation::new(config, repository);
    let events = simulation.take_event_stream();

    let resumed = simulation.start().await.map_err(EngineError::from)?;
    info!(resumed, "Agent loops running");

    for owner in std::env::args().skip(1) {
        adopt(&simulation, &owner).await?;
    }

    let logger = events.map(|rx| tokio::spawn(log_events(rx)));

    tokio::signal::ctrl_c().await.map_err(EngineError::from)?;
    info!("Shutdown signal received");

    simulation.shutdown().await;
    if let Some(logger) = logger {
        logger.abort();
    }
    if let Some(pool) = pool {
        pool.close().await;
    }

    let stats = simulation.stats().await;
    info!(
        agents = stats.agents,
        alive = stats.alive,
        events = stats.events,
        dropped_events = stats.dropped_events,
        "menagerie-engine shutdown complete"
    );
    Ok(())
}

/// Install the subscriber. `RUST_LOG` wins over the configured level.
fn init_logging(config: &SimulationConfig) -> Result<(), EngineError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.logging.level).map_err(|e| EngineError::LogFilter {
            filter: config.logging.level.clone(),
            message: e.to_string(),
        })?,
    };

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if config.logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

/// Build the repository named by the configuration.
///
/// Returns the pool too so it can be closed after the final flush.
async fn connect_repository(config: &SimulationConfig) -> Result<(Repository, Option<PostgresPool>), EngineError> {
    let Some(url) = config.infrastructure.postgres_url.as_deref() else {
        warn!("No PostgreSQL URL configured, state will not survive a restart");
        return Ok((Repository::Memory(MemoryRepository::new()), None));
    };

    let pg_config = PostgresConfig::new(url).with_max_connections(config.infrastructure.max_connections);
    let pool = PostgresPool::connect(&pg_config).await?;
    pool.run_migrations().await?;
    Ok((Repository::Postgres(PgRepository::new(pool.clone())), Some(pool)))
}

/// Create an agent for `owner` unless one already exists.
async fn adopt(simulation: &Simulation, owner: &str) -> Result<(), EngineError> {
    match simulation.create_agent(owner).await {
        Ok(agent) => {
            info!(agent_id = %agent.id, owner, name = %agent.name, "Adopted new agent");
            Ok(())
        }
        Err(CoreError::DuplicateOwner(_)) => {
            info!(owner, "Owner already has an agent");
            Ok(())
        }
        Err(CoreError::EmptyOwner) => {
            warn!("Skipping empty owner name");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

async fn log_events(mut rx: mpsc::Receiver<menagerie_types::Event>) {
    while let Some(event) = rx.recv().await {
        info!(
            target: "menagerie::events",
            agent_id = %event.agent_id,
            kind = event.kind.as_str(),
            coins = event.payload.coins,
            "{}",
            event.message
        );
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_url_falls_back_to_memory() {
        let config = SimulationConfig::default();
        let (repository, pool) = connect_repository(&config).await.unwrap();
        assert_eq!(repository.name(), "memory");
        assert!(pool.is_none());
    }

    #[tokio::test]
    async fn adopting_an_existing_owner_is_not_an_error() {
        let simulation = Simulation::new(
            SimulationConfig::default(),
            Repository::Memory(MemoryRepository::new()),
        );
        adopt(&simulation, "alice").await.unwrap();
        adopt(&simulation, "alice").await.unwrap();
        adopt(&simulation, "  ").await.unwrap();
        assert_eq!(simulation.list_agents().await.len(), 1);
    }
}
