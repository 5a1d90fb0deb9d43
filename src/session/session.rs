use super::config::SessionConfig;
use super::state::{self, Action, Disposition, SessionState};
use super::stats::SessionStats;
use crate::audio::{ActivityDetector, CaptureFormat, SampleBuffer};
use chrono::{DateTime, Utc};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tracing::{debug, info};

/// Returned to the buffer producer after every buffer or poll tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferVerdict {
    /// Keep delivering
    Continue,
    /// The timeout policy fired: stop the capture device
    Stop(Disposition),
}

/// Audio handed over at the end of a session
#[derive(Debug)]
pub struct FinishedSession {
    pub session_id: String,
    pub disposition: Disposition,
    /// Little-endian f32 bytes; always empty for `Disposition::Discard`
    pub audio: Vec<u8>,
    pub format: CaptureFormat,
}

/// A single activity-gated recording session
///
/// All state transitions and appends happen under one lock per buffer, so
/// buffers delivered from several threads never interleave inside the
/// recording. RMS is computed before the lock is taken.
pub struct RecordingSession {
    id: String,
    config: SessionConfig,
    detector: ActivityDetector,
    format: CaptureFormat,
    started_at: DateTime<Utc>,
    inner: Mutex<SessionInner>,
}

struct SessionInner {
    state: SessionState,
    /// Append-only; grows only while Recording
    audio: Vec<u8>,
    last_activity: Instant,
    /// Set once the session decided (or was told) to terminate
    pending: Option<Disposition>,
    buffers_seen: usize,
    buffers_recorded: usize,
}

impl RecordingSession {
    /// Start listening now (Idle -> Listening)
    pub fn start(id: String, config: SessionConfig, format: CaptureFormat) -> Self {
        Self::start_at(id, config, format, Instant::now())
    }

    pub fn start_at(id: String, config: SessionConfig, format: CaptureFormat, now: Instant) -> Self {
        let detector = config.detector();
        info!(
            "Listening for audio: {} (threshold {}, {}Hz, {} channels)",
            id,
            detector.threshold(),
            format.sample_rate,
            format.channels
        );

        Self {
            id,
            config,
            detector,
            format,
            started_at: Utc::now(),
            inner: Mutex::new(SessionInner {
                state: SessionState::Listening,
                audio: Vec::new(),
                last_activity: now,
                pending: None,
                buffers_seen: 0,
                buffers_recorded: 0,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// The session has decided (or been told) to terminate
    pub fn is_stopping(&self) -> bool {
        self.lock().pending.is_some()
    }

    /// Feed one buffer from the capture source
    ///
    /// The arrival time is read under the lock, so concurrent producers
    /// observe non-decreasing timestamps.
    pub fn on_buffer(&self, buffer: &SampleBuffer) -> BufferVerdict {
        let score = self.detector.score(buffer);
        let mut inner = self.lock();
        inner.buffers_seen += 1;
        self.apply(&mut inner, score, Some(buffer), Instant::now())
    }

    pub fn on_buffer_at(&self, buffer: &SampleBuffer, now: Instant) -> BufferVerdict {
        let score = self.detector.score(buffer);
        let mut inner = self.lock();
        inner.buffers_seen += 1;
        self.apply(&mut inner, score, Some(buffer), now)
    }

    /// Check the timeout policy without a buffer (device delivered nothing)
    pub fn poll(&self) -> BufferVerdict {
        let mut inner = self.lock();
        self.apply(&mut inner, 0.0, None, Instant::now())
    }

    pub fn poll_at(&self, now: Instant) -> BufferVerdict {
        let mut inner = self.lock();
        self.apply(&mut inner, 0.0, None, now)
    }

    /// Explicit external stop. Returns the disposition, or `None` if the
    /// session is already stopping or idle.
    pub fn request_stop(&self) -> Option<Disposition> {
        let mut inner = self.lock();
        if inner.pending.is_some() {
            return None;
        }
        let disposition = state::stop_disposition(inner.state)?;
        info!(
            "Stop requested for {} while {} -> {:?}",
            self.id, inner.state, disposition
        );
        inner.pending = Some(disposition);
        inner.state = SessionState::Idle;
        Some(disposition)
    }

    /// Tear the session down and take its audio. Called once the capture
    /// source has signalled the end of its stream.
    pub fn finish(&self) -> FinishedSession {
        let mut inner = self.lock();
        let disposition = match inner.pending {
            Some(disposition) => disposition,
            // Stream ended without a stop decision; apply the stop rule
            None => state::stop_disposition(inner.state).unwrap_or(Disposition::Discard),
        };
        inner.pending = Some(disposition);
        inner.state = SessionState::Idle;

        let audio = std::mem::take(&mut inner.audio);
        let audio = match disposition {
            Disposition::Save => audio,
            Disposition::Discard => Vec::new(),
        };

        FinishedSession {
            session_id: self.id.clone(),
            disposition,
            audio,
            format: self.format,
        }
    }

    pub fn stats(&self) -> SessionStats {
        let inner = self.lock();
        SessionStats {
            session_id: self.id.clone(),
            state: inner.state,
            started_at: self.started_at,
            buffers_seen: inner.buffers_seen,
            buffers_recorded: inner.buffers_recorded,
            bytes_recorded: inner.audio.len(),
        }
    }

    fn apply(
        &self,
        inner: &mut SessionInner,
        score: f32,
        buffer: Option<&SampleBuffer>,
        now: Instant,
    ) -> BufferVerdict {
        let since_activity = now.saturating_duration_since(inner.last_activity);
        let step = state::step(inner.state, score, since_activity, &self.config);
        let timestamp_ms = buffer.map_or(0, |b| b.timestamp_ms);

        if step.next != inner.state {
            debug!("Session {}: {} -> {}", self.id, inner.state, step.next);
        }
        if step.next == SessionState::Recording && inner.state == SessionState::Listening {
            info!(
                "Audio detected at {}ms (rms {:.3}), recording {}",
                timestamp_ms, score, self.id
            );
        }

        inner.state = step.next;
        if step.activity {
            // A late producer never moves activity backwards
            inner.last_activity = inner.last_activity.max(now);
        }

        match step.action {
            Action::Skip => BufferVerdict::Continue,
            Action::Append => {
                if let Some(buffer) = buffer.filter(|b| !b.is_empty()) {
                    buffer.write_le_bytes(&mut inner.audio);
                    inner.buffers_recorded += 1;
                }
                BufferVerdict::Continue
            }
            Action::Finish(disposition) => {
                info!(
                    "Silence timeout for {} after {}ms -> {:?}",
                    self.id,
                    since_activity.as_millis(),
                    disposition
                );
                inner.pending = Some(disposition);
                BufferVerdict::Stop(disposition)
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
