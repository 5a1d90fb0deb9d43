//! Activity-gated recording sessions
//!
//! This module provides:
//! - The pure Idle / Listening / Recording transition function
//! - `RecordingSession`, the locked per-buffer state machine and audio buffer
//! - `RecordingController`, the single owner of the active session that
//!   drives the capture pump and hands finished audio to the sink

mod config;
mod controller;
mod session;
pub mod state;
mod stats;

pub use config::SessionConfig;
pub use controller::{ControllerStatus, RecordingController};
pub use session::{BufferVerdict, FinishedSession, RecordingSession};
pub use state::{Action, Disposition, SessionState, Step};
pub use stats::{SessionOutcome, SessionReport, SessionStats};
