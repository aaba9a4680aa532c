// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod ai;
pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod evaluation;
pub mod issue;
pub mod metrics;
pub mod record;
pub mod scores;
pub mod store;

// Convenience re-exports for bins and tests.
pub use crate::api::{create_router, AppState};
pub use crate::error::ServiceError;
pub use crate::scores::ScoreService;
