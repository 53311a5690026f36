//! HTTP surface of the mediator: an axum app exposing the sync, callback,
//! registration, and ingestion endpoints over the pipeline crates.

pub mod config;
pub mod error;
pub mod handlers;
pub mod observability;
pub mod server;
pub mod state;

pub use config::AppConfig;
pub use error::{ApiError, ApiResult};
pub use server::{build_router, run};
pub use state::AppState;
