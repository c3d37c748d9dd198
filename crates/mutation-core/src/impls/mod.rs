//! Impls - port implementations that need no network.
//!
//! - **InMemoryDocumentStore**: transactional store with failure injection
//! - **InMemoryTaskQueue**: records enqueued tasks
//! - **StaticScheduleProvider / StaticStartingPlayers**: canned sports data
//! - **ScriptedOptimizer**: LineupOptimizer fake
//! - **StoreTeamRepository**: TeamRepository over any DocumentStore
//!
//! Network adapters (Cloud Tasks, sports-data HTTP, remote optimizer) live in
//! the `mutation-api` crate.

pub mod memory_queue;
pub mod memory_store;
pub mod scripted_optimizer;
pub mod static_providers;
pub mod store_team_repository;

pub use self::memory_queue::InMemoryTaskQueue;
pub use self::memory_store::InMemoryDocumentStore;
pub use self::scripted_optimizer::ScriptedOptimizer;
pub use self::static_providers::{StaticScheduleProvider, StaticStartingPlayers};
pub use self::store_team_repository::StoreTeamRepository;
