//! Per-backend bounded queues, least-loaded selection, model-name matching,
//! and fair admission (spec §4.2).

pub mod admission;
pub mod dispatcher;
pub mod queue;
pub mod selection;

pub use admission::resolve_requested_model;
pub use dispatcher::Dispatcher;
pub use queue::QueueHandler;
pub use selection::select_least_loaded;
