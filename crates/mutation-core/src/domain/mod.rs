//! Domain model (ids, tasks, teams, schedule, rate-limit documents, errors, ...).

pub mod calendar;
pub mod decision;
pub mod envelope;
pub mod errors;
pub mod ids;
pub mod limits;
pub mod outcome;
pub mod payload;
pub mod schedule;
pub mod state;
pub mod task;
pub mod team;

pub use calendar::{HOUR_MS, ReferenceCalendar};
pub use decision::{DEFAULT_MAINTENANCE_PAUSE_MS, Decider, Decision, FailurePolicy};
pub use envelope::{EXECUTE_PATH, EnvelopeError, ExecuteMutationRequest, QueueTarget, QueueTask};
pub use errors::{
    DispatchError, DomainError, INVALID_PAYLOAD, MutationError, REVOKED_REFRESH_TOKEN,
    RateLimitError, RateLimitSource, ServiceUnavailableError, SystemError, UpstreamError,
};
pub use ids::TaskId;
pub use limits::{CircuitBreakerState, GlobalPauseState, RateLimitState, ceil_secs};
pub use outcome::{DispatchResponse, ExecuteMutationResponse};
pub use payload::{PositionalScarcityPayload, SetLineupPayload, WeeklyTransactionsPayload};
pub use schedule::{
    GameTimesDocument, League, LeagueSchedule, PostponedTeamsDocument, ScheduleInfo,
    StartingPlayersDocument, UnknownLeague,
};
pub use state::TaskStatus;
pub use task::{MutationTask, MutationType};
pub use team::{NOT_PAUSED, TeamDocument, TeamPayload, WeeklyDeadline};
