//! Backend registry and health scheduler (spec §4.1): keeps each backend's
//! liveness and model inventory fresh and surfaces the set of active
//! backends to the dispatcher.

pub mod client;
pub mod health;
pub mod registry;
pub mod scheduler;

pub use client::OllamaClient;
pub use registry::BackendRegistry;
pub use scheduler::HealthScheduler;
