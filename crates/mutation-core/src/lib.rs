//! mutation-core
//!
//! Dispatch and execution of deferred fantasy-lineup mutations.
//!
//! # Modules
//! - **domain**: tasks, teams, schedule, rate-limit documents, error taxonomy, failure policy
//! - **ports**: one trait per collaborator (store, queue, providers, optimizer, clock)
//! - **app**: schedule source, rate limiter, scheduling, dispatcher, execution service
//! - **typed**: typed payloads and the handler registry
//! - **impls**: in-memory port implementations for development and tests
//! - **config**: typed settings with defaults

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod typed;
