//! Recording session state machine.
//!
//! Transitions are a pure function of the current state, the buffer's RMS
//! score and the time since the last activity. The session applies the
//! returned action under its lock.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::config::SessionConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No capture device attached
    Idle,
    /// Capturing, no activity seen yet
    Listening,
    /// Activity seen at least once; audio accumulating
    Recording,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::Idle => "idle",
            SessionState::Listening => "listening",
            SessionState::Recording => "recording",
        };
        f.write_str(label)
    }
}

/// What happens to the session's audio when it terminates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Save,
    Discard,
}

/// Side effect requested by a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Leave the buffer out of the recording
    Skip,
    /// Append the buffer to the recording
    Append,
    /// Stop capture and finalize
    Finish(Disposition),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub next: SessionState,
    pub action: Action,
    /// The buffer counted as activity (refresh the activity timestamp)
    pub activity: bool,
}

impl Step {
    fn stay(state: SessionState) -> Self {
        Self {
            next: state,
            action: Action::Skip,
            activity: false,
        }
    }
}

/// Evaluate one buffer (or one silent poll tick, with `rms = 0`)
pub fn step(state: SessionState, rms: f32, since_activity: Duration, cfg: &SessionConfig) -> Step {
    let active = cfg.detector().is_active(rms);

    match state {
        SessionState::Idle => Step::stay(SessionState::Idle),

        SessionState::Listening if active => Step {
            next: SessionState::Recording,
            action: Action::Append,
            activity: true,
        },
        SessionState::Listening if since_activity > cfg.initial_listen_timeout => Step {
            next: SessionState::Idle,
            action: Action::Finish(Disposition::Discard),
            activity: false,
        },
        SessionState::Listening => Step::stay(SessionState::Listening),

        SessionState::Recording if active => Step {
            next: SessionState::Recording,
            action: Action::Append,
            activity: true,
        },
        SessionState::Recording if since_activity > cfg.silence_timeout => Step {
            next: SessionState::Idle,
            action: Action::Finish(Disposition::Save),
            activity: false,
        },
        SessionState::Recording if cfg.retain_trailing_silence => Step {
            next: SessionState::Recording,
            action: Action::Append,
            activity: false,
        },
        SessionState::Recording => Step::stay(SessionState::Recording),
    }
}

/// Disposition for an explicit stop request; `None` when there is nothing to stop
pub fn stop_disposition(state: SessionState) -> Option<Disposition> {
    match state {
        SessionState::Idle => None,
        SessionState::Listening => Some(Disposition::Discard),
        SessionState::Recording => Some(Disposition::Save),
    }
}
