//! HTTP status API for the dashboard
//!
//! - GET /session/status - Latest session state transition
//! - POST /session/stop - Stop the running session
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
