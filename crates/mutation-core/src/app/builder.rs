//! ExecutorBuilder - wires handlers into an [`ExecutionService`].
//!
//! `build()` refuses to produce a service unless every expected
//! [`MutationType`] has a handler, so a missing registration fails at
//! startup instead of on the first task of that type.

use std::sync::Arc;

use super::executor::ExecutionService;
use crate::domain::{FailurePolicy, MutationType};
use crate::ports::{Clock, DocumentStore, RateLimiter};
use crate::typed::{Handler, MutationPayload, RegistryError, TypedRegistry};

/// # Usage
/// ```ignore
/// let service = ExecutorBuilder::new()
///     .register::<SetLineupPayload, _>(set_lineup)?
///     .register::<WeeklyTransactionsPayload, _>(transactions)?
///     .register::<PositionalScarcityPayload, _>(scarcity)?
///     .build(limiter, store, clock)?;
/// ```
pub struct ExecutorBuilder {
    registry: TypedRegistry,
    expected: Vec<MutationType>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("no handler registered for mutation types: {0:?}")]
    MissingMutationTypes(Vec<MutationType>),
}

impl ExecutorBuilder {
    /// Expects a handler for every [`MutationType`].
    pub fn new() -> Self {
        Self {
            registry: TypedRegistry::new(),
            expected: MutationType::ALL.to_vec(),
        }
    }

    pub fn register<T: MutationPayload, H: Handler<T> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<T, H>(handler)?;
        Ok(self)
    }

    /// Narrow the set of types that must be registered.
    pub fn expect_types(mut self, types: &[MutationType]) -> Self {
        self.expected = types.to_vec();
        self
    }

    pub fn build(
        self,
        limiter: Arc<dyn RateLimiter>,
        store: Arc<dyn DocumentStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<ExecutionService, BuildError> {
        let registered = self.registry.registered_types();
        let missing: Vec<MutationType> = self
            .expected
            .iter()
            .filter(|t| !registered.contains(t))
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(BuildError::MissingMutationTypes(missing));
        }
        Ok(ExecutionService::new(
            self.registry,
            limiter,
            store,
            clock,
            Arc::new(FailurePolicy),
        ))
    }
}

impl Default for ExecutorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
