//! HTTP control API
//!
//! Thin axum surface over the session map: start and stop conversations,
//! read status and transcripts. Session defaults come from the service
//! configuration; requests may override the persona and capture source.

pub mod handlers;
pub mod routes;
pub mod state;

pub use routes::create_router;
pub use state::AppState;
