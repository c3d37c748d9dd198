//! Typed - payload types bound to mutation types.
//!
//! # Two layers
//! - **Typed**: `MutationPayload`, `Handler<T>`; a handler can only receive its own payload
//! - **Dyn**: `DynHandler`; object-safe, decodes the raw JSON payload

pub mod handler;
pub mod registry;
pub mod task;

pub use self::handler::{DynHandler, Handler, TypedHandler};
pub use self::registry::{RegistryError, TypedRegistry};
pub use self::task::MutationPayload;
