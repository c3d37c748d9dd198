//! Handler traits.
//!
//! - `Handler<T>`: typed, what mutation handlers implement
//! - `DynHandler`: object-safe, what the registry stores
//! - `TypedHandler<T, H>`: erases `T` by decoding the raw payload first

use async_trait::async_trait;
use std::marker::PhantomData;

use super::task::MutationPayload;
use crate::domain::{MutationError, MutationTask, MutationType};

/// Executes one decoded payload.
///
/// `task` carries the envelope (id, user, status) for logging and
/// bookkeeping; `payload` is the decoded body.
#[async_trait]
pub trait Handler<T: MutationPayload>: Send + Sync {
    async fn handle(&self, task: &MutationTask, payload: T) -> Result<(), MutationError>;
}

#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, task: &MutationTask) -> Result<(), MutationError>;
    fn mutation_type(&self) -> MutationType;
}

pub struct TypedHandler<T: MutationPayload, H: Handler<T>> {
    handler: H,
    _marker: PhantomData<T>,
}

impl<T: MutationPayload, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: MutationPayload, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    async fn handle_dyn(&self, task: &MutationTask) -> Result<(), MutationError> {
        let payload: T = serde_json::from_value(task.payload.clone()).map_err(|e| {
            MutationError::invalid_payload(format!("invalid {} payload: {e}", T::TYPE.label()))
        })?;
        self.handler.handle(task, payload).await
    }

    fn mutation_type(&self) -> MutationType {
        T::TYPE
    }
}
