use crate::audio::ActivityDetector;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Activity gating policy for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// RMS cutoff on the [0, 1] float scale; strictly above counts as activity
    /// Default: 0.1
    pub activity_threshold: f32,

    /// Give-up window before any activity has been seen
    /// Default: 1 second
    pub initial_listen_timeout: Duration,

    /// End-of-utterance window once activity has been seen
    /// Default: 3 seconds
    pub silence_timeout: Duration,

    /// Append quiet buffers that arrive while recording (before the timeout fires)
    pub retain_trailing_silence: bool,

    /// How often timeouts are checked when the device delivers nothing
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            activity_threshold: 0.1,
            initial_listen_timeout: Duration::from_millis(1000),
            silence_timeout: Duration::from_millis(3000),
            retain_trailing_silence: false,
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl SessionConfig {
    pub fn detector(&self) -> ActivityDetector {
        ActivityDetector::new(self.activity_threshold)
    }
}
