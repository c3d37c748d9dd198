//! App - services composed from ports.
//!
//! # Components
//! - **CachedScheduleSource**: today's game times, cached per reference date
//! - **StoreRateLimiter**: per-user token bucket, global breaker and pause
//! - **SchedulingService**: eligibility rules and the dispatch prefetches
//! - **Dispatcher**: one dispatch pass, fan-out to the task queue
//! - **ExecutionService**: gates, handler, failure policy for one task
//! - **ExecutorBuilder**: fail-fast handler wiring

pub mod builder;
pub mod dispatcher;
pub mod executor;
pub mod handlers;
pub mod rate_limiter;
pub mod schedule_source;
pub mod scheduling;

pub use self::builder::{BuildError, ExecutorBuilder};
pub use self::dispatcher::{DispatchRequest, Dispatcher};
pub use self::executor::ExecutionService;
pub use self::handlers::{PositionalScarcityHandler, SetLineupHandler, WeeklyTransactionsHandler};
pub use self::rate_limiter::StoreRateLimiter;
pub use self::schedule_source::{CachedScheduleSource, ProviderPair};
pub use self::scheduling::{EligibleTeams, SchedulingService};
