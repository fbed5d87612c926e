//! Error types for the engine binary.

use menagerie_core::{ConfigError, CoreError};
use menagerie_db::DbError;

/// Startup and shutdown failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// Connecting to or migrating the database failed.
    #[error("database error: {source}")]
    Database {
        /// The underlying database error.
        #[from]
        source: DbError,
    },

    /// The simulation service failed.
    #[error("simulation error: {source}")]
    Simulation {
        /// The underlying service error.
        #[from]
        source: CoreError,
    },

    /// The logging filter could not be built.
    #[error("invalid log filter {filter:?}: {message}")]
    LogFilter {
        /// The rejected directive.
        filter: String,
        /// Parser message.
        message: String,
    },

    /// Waiting for the shutdown signal failed.
    #[error("signal error: {0}")]
    Signal(#[from] std::io::Error),
}
