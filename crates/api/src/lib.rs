//! HTTP surface for the usage tracking pipeline: authentication,
//! rate limiting, event ingestion, and the read-side query API.

pub mod auth;
pub mod error;
pub mod rate_limit;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiResult};
pub use routes::build_router;
pub use state::AppState;
