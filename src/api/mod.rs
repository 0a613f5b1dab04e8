//! HTTP API module: liveness probe, root redirect, telemetry, and the
//! chain endpoints.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;

pub use error::{ApiError, ErrorBody};
pub use handlers::AppState;
pub use routes::create_router;
