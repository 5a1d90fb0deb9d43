use serde::{Deserialize, Serialize};

use crate::session::{SessionOutcome, SessionReport};

/// Announcement published after every (re)connect
#[derive(Debug, Serialize, Deserialize)]
pub struct HelloMessage {
    pub agent_id: String,
    pub surface_title: String,
    pub timestamp: String, // RFC3339 timestamp
}

/// Finalized recording session, published to `agent.audio.<agent_id>`
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionMessage {
    pub agent_id: String,
    pub session_id: String,
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub bytes: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub duration_secs: f64,
    pub timestamp: String, // RFC3339 timestamp
}

impl SessionMessage {
    pub fn from_report(agent_id: &str, report: &SessionReport) -> Self {
        let (path, bytes, error) = match &report.outcome {
            SessionOutcome::Saved { path, bytes } => (Some(path.display().to_string()), *bytes, None),
            SessionOutcome::Failed { error } => (None, 0, Some(error.clone())),
            SessionOutcome::Discarded | SessionOutcome::Empty => (None, 0, None),
        };

        Self {
            agent_id: agent_id.to_string(),
            session_id: report.session_id.clone(),
            outcome: report.outcome.label().to_string(),
            path,
            bytes,
            error,
            duration_secs: report.duration_secs,
            timestamp: report.finished_at.to_rfc3339(),
        }
    }
}
