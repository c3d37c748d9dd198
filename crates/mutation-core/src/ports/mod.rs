//! Ports - one trait per external collaborator.
//!
//! Services receive these through their constructors, so tests wire in the
//! in-memory implementations from [`crate::impls`] and production wires in
//! the network adapters from the API crate.

pub mod clock;
pub mod document_store;
pub mod id_generator;
pub mod lineup_optimizer;
pub mod rate_limiter;
pub mod schedule_provider;
pub mod schedule_source;
pub mod task_queue;
pub mod team_repository;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::document_store::{
    DocPath, DocumentStore, StoreError, TxUpdate, decode_doc, encode_doc, get_doc,
};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::lineup_optimizer::{
    LineupOptimizer, LineupReport, LineupRequest, TransactionReport, TransactionRequest,
};
pub use self::rate_limiter::RateLimiter;
pub use self::schedule_provider::{GameScheduleProvider, StartingPlayersProvider};
pub use self::schedule_source::ScheduleSource;
pub use self::task_queue::{QueueError, TaskQueue};
pub use self::team_repository::TeamRepository;
