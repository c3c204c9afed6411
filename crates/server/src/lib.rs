//! Gateway HTTP server: routing, auth extractors, error mapping, metrics.

pub mod account;
pub mod admin;
pub mod auth;
pub mod continue_dev;
pub mod error;
pub mod http;
pub mod inference;
pub mod metrics;
pub mod refact;
pub mod state;

pub use auth::{AdminUser, AuthenticatedUser, CurrentUser, ProjectBearer};
pub use error::{ApiError, ApiResult};
pub use http::create_router;
pub use metrics::{init_metrics, metrics_handler};
pub use state::AppState;
