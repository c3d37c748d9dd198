//! TypedRegistry - one handler per [`MutationType`].

use std::collections::HashMap;
use std::sync::Arc;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::task::MutationPayload;
use crate::domain::MutationType;

/// Registered handlers, type-erased behind `Arc<dyn DynHandler>`.
///
/// # Usage
/// ```ignore
/// let mut registry = TypedRegistry::new();
/// registry.register::<SetLineupPayload, _>(SetLineupHandler::new(..))?;
/// let handler = registry.get(MutationType::SetLineup);
/// ```
#[derive(Default)]
pub struct TypedRegistry {
    handlers: HashMap<MutationType, Arc<dyn DynHandler>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for mutation type '{0}' is already registered")]
    AlreadyRegistered(MutationType),
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: MutationPayload, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        if self.handlers.contains_key(&T::TYPE) {
            return Err(RegistryError::AlreadyRegistered(T::TYPE));
        }
        self.handlers
            .insert(T::TYPE, Arc::new(TypedHandler::<T, H>::new(handler)));
        Ok(())
    }

    pub fn get(&self, mutation_type: MutationType) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(&mutation_type).cloned()
    }

    pub fn registered_types(&self) -> Vec<MutationType> {
        let mut types: Vec<MutationType> = self.handlers.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}
