//! mutation-api
//!
//! HTTP surface over `mutation-core`: dispatch triggers, the queue's execute
//! endpoint, health. Network adapters for the core ports live in [`adapters`].

pub mod adapters;
pub mod config;
pub mod error;
pub mod routes;
pub mod validate;

use axum::Router;
use axum::routing::{get, post};
use mutation_core::app::{
    BuildError, CachedScheduleSource, Dispatcher, ExecutionService, ExecutorBuilder,
    PositionalScarcityHandler, ProviderPair, SchedulingService, SetLineupHandler,
    StoreRateLimiter, WeeklyTransactionsHandler,
};
use mutation_core::config::{DispatchConfig, QueueConfig, RateLimitConfig};
use mutation_core::domain::{
    PositionalScarcityPayload, ReferenceCalendar, SetLineupPayload, WeeklyTransactionsPayload,
};
use mutation_core::impls::StoreTeamRepository;
use mutation_core::ports::{
    Clock, DocumentStore, GameScheduleProvider, LineupOptimizer, ScheduleSource,
    StartingPlayersProvider, TaskQueue, TeamRepository, UlidGenerator,
};
use mutation_core::typed::RegistryError;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Everything the services talk to, supplied by `main` or by tests.
pub struct Collaborators {
    pub store: Arc<dyn DocumentStore>,
    pub queue: Arc<dyn TaskQueue>,
    pub primary_schedule: Arc<dyn GameScheduleProvider>,
    pub fallback_schedule: Arc<dyn GameScheduleProvider>,
    pub starting_players: Arc<dyn StartingPlayersProvider>,
    pub optimizer: Arc<dyn LineupOptimizer>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone, Default)]
pub struct ServiceSettings {
    pub dispatch: DispatchConfig,
    pub queue: QueueConfig,
    pub rate_limit: RateLimitConfig,
}

impl From<&config::Settings> for ServiceSettings {
    fn from(settings: &config::Settings) -> Self {
        Self {
            dispatch: settings.dispatch.clone(),
            queue: settings.queue.clone(),
            rate_limit: settings.rate_limit.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WiringError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Build(#[from] BuildError),
}

#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<Dispatcher>,
    pub executor: Arc<ExecutionService>,
}

impl AppState {
    pub fn wire(c: Collaborators, settings: &ServiceSettings) -> Result<Self, WiringError> {
        let calendar = ReferenceCalendar::new(settings.dispatch.reference_tz);
        let providers = ProviderPair::new(c.primary_schedule, c.fallback_schedule);
        let teams: Arc<dyn TeamRepository> = Arc::new(StoreTeamRepository::new(c.store.clone()));

        let schedule: Arc<dyn ScheduleSource> = Arc::new(CachedScheduleSource::new(
            c.store.clone(),
            providers.clone(),
            c.clock.clone(),
            calendar,
        ));
        let scheduling = Arc::new(SchedulingService::new(
            c.store.clone(),
            providers,
            c.starting_players,
            c.clock.clone(),
            calendar,
        ));
        let dispatcher = Dispatcher::new(
            schedule.clone(),
            scheduling,
            teams.clone(),
            c.queue,
            Arc::new(UlidGenerator::new(c.clock.clone())),
            c.clock.clone(),
            settings.dispatch.clone(),
            settings.queue.clone(),
        );

        let limiter = Arc::new(StoreRateLimiter::new(
            c.store.clone(),
            c.clock.clone(),
            settings.rate_limit.clone(),
        ));
        let executor = ExecutorBuilder::new()
            .register::<SetLineupPayload, _>(SetLineupHandler::new(
                c.optimizer.clone(),
                teams,
                schedule,
                c.store.clone(),
                c.clock.clone(),
                calendar,
            ))?
            .register::<WeeklyTransactionsPayload, _>(WeeklyTransactionsHandler::new(
                c.optimizer.clone(),
            ))?
            .register::<PositionalScarcityPayload, _>(PositionalScarcityHandler::new(c.optimizer))?
            .build(limiter, c.store, c.clock)?;

        Ok(Self {
            dispatcher: Arc::new(dispatcher),
            executor: Arc::new(executor),
        })
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/mutations/", get(routes::health))
        .route("/mutations/set-lineup", post(routes::set_lineup))
        .route(
            "/mutations/weekly-transactions",
            post(routes::weekly_transactions),
        )
        .route(
            "/mutations/calc-positional-scarcity",
            post(routes::calc_positional_scarcity),
        )
        .route(
            "/mutations/execute/mutation",
            post(routes::execute_mutation),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
