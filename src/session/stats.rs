use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::state::{Disposition, SessionState};

/// Statistics about a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Session identifier
    pub session_id: String,

    /// Current state
    pub state: SessionState,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Buffers delivered by the capture source
    pub buffers_seen: usize,

    /// Buffers appended to the recording
    pub buffers_recorded: usize,

    /// Bytes of audio accumulated so far
    pub bytes_recorded: usize,
}

/// Result of finalizing a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Audio written to `path`
    Saved { path: PathBuf, bytes: usize },
    /// Nothing was ever heard
    Discarded,
    /// Save requested but no audio was accumulated; nothing written
    Empty,
    /// The sink failed; the audio was dropped
    Failed { error: String },
}

impl SessionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SessionOutcome::Saved { .. } => "saved",
            SessionOutcome::Discarded => "discarded",
            SessionOutcome::Empty => "empty",
            SessionOutcome::Failed { .. } => "failed",
        }
    }

    pub fn saved_path(&self) -> Option<&PathBuf> {
        match self {
            SessionOutcome::Saved { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Final report for one session, published to subscribers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub disposition: Disposition,
    pub outcome: SessionOutcome,
}
