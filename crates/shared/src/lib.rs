//! Shared types and utilities for the usage tracking pipeline.
//!
//! This crate contains entities, error types, database/Redis bootstrap, and
//! configuration loading shared by the ingest API and the background
//! worker binaries.

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod rate_limit;
pub mod redis_conn;
pub mod types;

pub use config::{Config, ConfigError};
pub use db::*;
pub use error::*;
pub use rate_limit::{rate_limit_key, RateLimitDecision, RateLimitError, RateLimiter};
pub use types::*;
