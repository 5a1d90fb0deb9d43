//! HTTP API for local control of the agent
//!
//! - POST /commands - Run a text command (`screenshot`, `click X Y`, ...)
//! - GET /targets - List named click targets
//! - GET /screenshot/click - Marked capture from the latest click
//! - POST /session/start - Start a recording session
//! - POST /session/stop - Stop the active recording session
//! - GET /session/status - Query recording state and last report
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use handlers::{CommandRequest, StartSessionResponse, StopSessionResponse};
pub use routes::create_router;
pub use state::AppState;
