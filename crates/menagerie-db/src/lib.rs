//! Persistence, caching, and write batching for the Menagerie simulation.
//!
//! Mutations flow from the simulation core through three layers:
//!
//! ```text
//! StateChange / Event
//!     |
//!     +-- StorageClassifier --> DataPriority (Critical / Important / Transient)
//!     |
//!     +-- TieredCache ---------> in-process TTL maps (always, immediately)
//!     |
//!     +-- WritePipeline -------> WriteBatcher per tier
//!                                   |
//!                                   +-- Repository::apply_batch (one transaction)
//!                                         |-- PgRepository     (PostgreSQL)
//!                                         +-- MemoryRepository (in-process)
//! ```
//!
//! # Modules
//!
//! - [`classifier`] -- mutation and event kinds to durability tiers
//! - [`batcher`] -- bounded per-tier queues and flush loops
//! - [`cache`] -- `DashMap`-backed TTL cache categories
//! - [`repository`] -- enum-dispatched persistence backends
//! - [`postgres`] -- `PostgreSQL` connection pool and configuration
//! - [`agent_store`] -- the `agents` table
//! - [`event_store`] -- the `events` table
//! - [`error`] -- Shared error types

pub mod agent_store;
pub mod batcher;
pub mod cache;
pub mod classifier;
pub mod error;
pub mod event_store;
pub mod postgres;
pub mod repository;

pub use agent_store::{AgentRow, AgentStore};
pub use batcher::{AddOutcome, PipelineStats, TierStats, WriteBatcher, WritePipeline};
pub use cache::{CacheConfig, CacheStats, CategoryCache, CategoryConfig, TieredCache, TieredCacheStats};
pub use classifier::{StorageClassifier, TierOverrides, TierPolicy};
pub use error::DbError;
pub use event_store::{EventRow, EventStore};
pub use postgres::{PostgresConfig, PostgresPool};
pub use repository::{MemoryRepository, PgRepository, Repository};
