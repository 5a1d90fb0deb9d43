use super::config::SessionConfig;
use super::session::{BufferVerdict, FinishedSession, RecordingSession};
use super::state::{Disposition, SessionState};
use super::stats::{SessionOutcome, SessionReport, SessionStats};
use crate::audio::{CaptureOpener, CaptureSource, PersistenceSink, SampleBuffer};
use anyhow::{Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// Owns the single active recording session
///
/// Starting a session stops and finalizes the previous one first; the new
/// capture device is only opened once the old session's report exists.
pub struct RecordingController {
    config: SessionConfig,
    opener: Arc<dyn CaptureOpener>,
    sink: Arc<dyn PersistenceSink>,

    /// The active session, if any. Held across start/stop so they serialize.
    active: Mutex<Option<ActiveSession>>,

    /// Session visible to status queries; cleared once it is finalized
    current: Arc<watch::Sender<Option<Arc<RecordingSession>>>>,

    /// Report of the most recently finalized session
    last_report: Arc<StdMutex<Option<SessionReport>>>,

    /// Finalized session reports
    reports: broadcast::Sender<SessionReport>,
}

struct ActiveSession {
    session: Arc<RecordingSession>,
    stop: Arc<Notify>,
    task: JoinHandle<SessionReport>,
}

/// Snapshot of the controller for status queries
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub state: SessionState,
    pub session: Option<SessionStats>,
    pub last_report: Option<SessionReport>,
}

impl RecordingController {
    pub fn new(
        config: SessionConfig,
        opener: Arc<dyn CaptureOpener>,
        sink: Arc<dyn PersistenceSink>,
    ) -> Self {
        let (reports, _) = broadcast::channel(16);
        let (current, _) = watch::channel(None);

        Self {
            config,
            opener,
            sink,
            active: Mutex::new(None),
            current: Arc::new(current),
            last_report: Arc::new(StdMutex::new(None)),
            reports,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Start a new session, finalizing any prior one first
    ///
    /// Fails if the capture device cannot be opened; no session exists then.
    pub async fn start_session(&self) -> Result<String> {
        let mut active = self.active.lock().await;

        if let Some(previous) = active.take() {
            info!("Superseding session {}", previous.session.id());
            Self::finish(previous).await;
        }

        let mut source = self.opener.open().context("Failed to open capture device")?;
        let (format, audio_rx) = source
            .start()
            .await
            .with_context(|| format!("Failed to start {} capture", source.name()))?;

        let session_id = format!("session-{}", uuid::Uuid::new_v4());
        let session = Arc::new(RecordingSession::start(
            session_id.clone(),
            self.config.clone(),
            format,
        ));
        let stop = Arc::new(Notify::new());
        self.current.send_replace(Some(Arc::clone(&session)));

        let task = tokio::spawn(run_session(
            Arc::clone(&session),
            source,
            audio_rx,
            Arc::clone(&stop),
            SessionHooks {
                sink: Arc::clone(&self.sink),
                current: Arc::clone(&self.current),
                reports: self.reports.clone(),
                last_report: Arc::clone(&self.last_report),
                poll_interval: self.config.poll_interval,
            },
        ));

        *active = Some(ActiveSession {
            session,
            stop,
            task,
        });

        Ok(session_id)
    }

    /// Stop the active session. A no-op returning `None` when idle.
    pub async fn stop_session(&self) -> Option<SessionReport> {
        let mut active = self.active.lock().await;

        let Some(current) = active.take() else {
            debug!("Stop requested with no active session");
            return None;
        };

        if current.task.is_finished() || current.session.is_stopping() {
            // Already terminated by its own timeout; let it finish
            if let Err(e) = current.task.await {
                error!("Session task panicked: {}", e);
            }
            return None;
        }

        Self::finish(current).await
    }

    /// Current state plus the last finalized report
    ///
    /// Never waits on a start or stop in progress.
    pub async fn status(&self) -> ControllerStatus {
        let session = self.current.borrow().as_ref().map(|s| s.stats());

        ControllerStatus {
            state: session
                .as_ref()
                .map(|s| s.state)
                .unwrap_or(SessionState::Idle),
            session,
            last_report: self.last_report(),
        }
    }

    pub fn last_report(&self) -> Option<SessionReport> {
        self.last_report
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Receive a report for every finalized session
    pub fn subscribe(&self) -> broadcast::Receiver<SessionReport> {
        self.reports.subscribe()
    }

    async fn finish(previous: ActiveSession) -> Option<SessionReport> {
        previous.stop.notify_one();

        match previous.task.await {
            Ok(report) => Some(report),
            Err(e) => {
                error!("Session task panicked: {}", e);
                None
            }
        }
    }
}

struct SessionHooks {
    sink: Arc<dyn PersistenceSink>,
    current: Arc<watch::Sender<Option<Arc<RecordingSession>>>>,
    reports: broadcast::Sender<SessionReport>,
    last_report: Arc<StdMutex<Option<SessionReport>>>,
    poll_interval: Duration,
}

/// Drive one session until the capture stream ends, then finalize it
async fn run_session(
    session: Arc<RecordingSession>,
    mut source: Box<dyn CaptureSource>,
    mut audio_rx: mpsc::Receiver<SampleBuffer>,
    stop: Arc<Notify>,
    hooks: SessionHooks,
) -> SessionReport {
    let mut ticker = tokio::time::interval(hooks.poll_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut stopping = false;

    loop {
        tokio::select! {
            // Buffers already delivered are processed before a stop request
            biased;

            buffer = audio_rx.recv() => match buffer {
                Some(buffer) => {
                    if let BufferVerdict::Stop(_) = session.on_buffer(&buffer) {
                        stop_source(source.as_mut()).await;
                        stopping = true;
                    }
                }
                // Terminal notification: the source will deliver nothing more
                None => break,
            },
            _ = stop.notified(), if !stopping => {
                // Drain what arrived before the request, in order
                while let Ok(buffer) = audio_rx.try_recv() {
                    if let BufferVerdict::Stop(_) = session.on_buffer(&buffer) {
                        break;
                    }
                }
                session.request_stop();
                stop_source(source.as_mut()).await;
                stopping = true;
            }
            _ = ticker.tick(), if !stopping => {
                if let BufferVerdict::Stop(_) = session.poll() {
                    stop_source(source.as_mut()).await;
                    stopping = true;
                }
            }
        }
    }

    if source.is_capturing() {
        stop_source(source.as_mut()).await;
    }

    let finished = session.finish();
    let disposition = finished.disposition;
    let outcome = persist(finished, Arc::clone(&hooks.sink)).await;

    let finished_at = Utc::now();
    let report = SessionReport {
        session_id: session.id().to_string(),
        started_at: session.started_at(),
        finished_at,
        duration_secs: finished_at
            .signed_duration_since(session.started_at())
            .num_milliseconds() as f64
            / 1000.0,
        disposition,
        outcome,
    };

    info!(
        "Session {} finalized: {} ({:.1}s)",
        report.session_id,
        report.outcome.label(),
        report.duration_secs
    );

    *hooks
        .last_report
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
    hooks.current.send_if_modified(|current| {
        let finished = current
            .as_ref()
            .is_some_and(|active| active.id() == session.id());
        if finished {
            *current = None;
        }
        finished
    });
    // No subscribers is fine
    let _ = hooks.reports.send(report.clone());

    report
}

async fn stop_source(source: &mut dyn CaptureSource) {
    info!("Stopping {} capture", source.name());
    if let Err(e) = source.stop().await {
        warn!("Failed to stop {} capture: {}", source.name(), e);
    }
}

/// Hand the finished audio to the sink on a blocking worker
async fn persist(finished: FinishedSession, sink: Arc<dyn PersistenceSink>) -> SessionOutcome {
    match finished.disposition {
        Disposition::Discard => {
            info!("No audio detected in {}", finished.session_id);
            SessionOutcome::Discarded
        }
        Disposition::Save if finished.audio.is_empty() => {
            info!(
                "No audio captured in {}, so no file saved",
                finished.session_id
            );
            SessionOutcome::Empty
        }
        Disposition::Save => {
            let bytes = finished.audio.len();
            let format = finished.format;
            let audio = finished.audio;

            match tokio::task::spawn_blocking(move || sink.persist(&audio, &format)).await {
                Ok(Ok(path)) => SessionOutcome::Saved { path, bytes },
                Ok(Err(e)) => {
                    error!("Failed to persist {}: {:#}", finished.session_id, e);
                    SessionOutcome::Failed {
                        error: format!("{:#}", e),
                    }
                }
                Err(e) => {
                    error!("Persistence task panicked: {}", e);
                    SessionOutcome::Failed {
                        error: format!("persistence task panicked: {}", e),
                    }
                }
            }
        }
    }
}
