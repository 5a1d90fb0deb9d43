// Recording controller tests
//
// Sessions are driven by scripted capture sources; the sink records every
// persist call in memory.

use anyhow::{anyhow, Result};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use surface_agent::audio::{
    CaptureFormat, CaptureOpener, CaptureSource, PersistenceSink, SampleBuffer,
    ScriptedCaptureSource,
};
use surface_agent::session::{
    Disposition, RecordingController, SessionConfig, SessionOutcome, SessionReport, SessionState,
};
use tokio::sync::mpsc;

const SAMPLES_PER_BUFFER: usize = 64;

fn format() -> CaptureFormat {
    CaptureFormat::float32(16000, 1)
}

fn loud() -> SampleBuffer {
    SampleBuffer::new(vec![0.5; SAMPLES_PER_BUFFER], format(), 0)
}

fn quiet() -> SampleBuffer {
    SampleBuffer::new(vec![0.0; SAMPLES_PER_BUFFER], format(), 0)
}

/// Timeouts long enough that only explicit stops end a session
fn patient_config() -> SessionConfig {
    SessionConfig {
        initial_listen_timeout: Duration::from_secs(30),
        silence_timeout: Duration::from_secs(30),
        poll_interval: Duration::from_millis(10),
        ..SessionConfig::default()
    }
}

struct ScriptOpener {
    script: Vec<SampleBuffer>,
    hold_open: bool,
    opened: AtomicUsize,
}

impl ScriptOpener {
    fn new(script: Vec<SampleBuffer>, hold_open: bool) -> Arc<Self> {
        Arc::new(Self {
            script,
            hold_open,
            opened: AtomicUsize::new(0),
        })
    }
}

impl CaptureOpener for ScriptOpener {
    fn open(&self) -> Result<Box<dyn CaptureSource>> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(
            ScriptedCaptureSource::new(format(), self.script.clone()).hold_open(self.hold_open),
        ))
    }
}

/// Device whose buffers are already queued when `start` returns
struct PrefilledOpener {
    buffers: Vec<SampleBuffer>,
}

struct PrefilledSource {
    buffers: Vec<SampleBuffer>,
    tx: Option<mpsc::Sender<SampleBuffer>>,
}

#[async_trait::async_trait]
impl CaptureSource for PrefilledSource {
    async fn start(&mut self) -> Result<(CaptureFormat, mpsc::Receiver<SampleBuffer>)> {
        let (tx, rx) = mpsc::channel(self.buffers.len() + 1);
        for buffer in self.buffers.drain(..) {
            tx.try_send(buffer)?;
        }
        self.tx = Some(tx);
        Ok((format(), rx))
    }

    async fn stop(&mut self) -> Result<()> {
        self.tx = None;
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.tx.is_some()
    }

    fn name(&self) -> &str {
        "prefilled"
    }
}

impl CaptureOpener for PrefilledOpener {
    fn open(&self) -> Result<Box<dyn CaptureSource>> {
        Ok(Box::new(PrefilledSource {
            buffers: self.buffers.clone(),
            tx: None,
        }))
    }
}

struct BrokenDevice;

impl CaptureOpener for BrokenDevice {
    fn open(&self) -> Result<Box<dyn CaptureSource>> {
        Err(anyhow!("device unavailable"))
    }
}

#[derive(Default)]
struct MemorySink {
    writes: Mutex<Vec<Vec<u8>>>,
}

impl MemorySink {
    fn calls(&self) -> usize {
        self.writes.lock().unwrap().len()
    }
}

impl PersistenceSink for MemorySink {
    fn persist(&self, audio: &[u8], _format: &CaptureFormat) -> Result<PathBuf> {
        let mut writes = self.writes.lock().unwrap();
        writes.push(audio.to_vec());
        Ok(PathBuf::from(format!("memory-{}.wav", writes.len())))
    }
}

struct SlowSink(Duration);

impl PersistenceSink for SlowSink {
    fn persist(&self, _audio: &[u8], _format: &CaptureFormat) -> Result<PathBuf> {
        std::thread::sleep(self.0);
        Ok(PathBuf::from("slow.wav"))
    }
}

struct FullDisk;

impl PersistenceSink for FullDisk {
    fn persist(&self, _audio: &[u8], _format: &CaptureFormat) -> Result<PathBuf> {
        Err(anyhow!("No space left on device"))
    }
}

async fn wait_for_state(controller: &RecordingController, state: SessionState) -> Result<()> {
    for _ in 0..200 {
        if controller.status().await.state == state {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Err(anyhow!("controller never reached {:?}", state))
}

async fn next_report(
    reports: &mut tokio::sync::broadcast::Receiver<SessionReport>,
) -> Result<SessionReport> {
    Ok(tokio::time::timeout(Duration::from_secs(5), reports.recv()).await??)
}

#[tokio::test]
async fn test_stop_on_idle_controller_is_noop() -> Result<()> {
    let sink = Arc::new(MemorySink::default());
    let controller = RecordingController::new(
        patient_config(),
        ScriptOpener::new(vec![], true),
        sink.clone(),
    );

    assert!(controller.stop_session().await.is_none());
    assert!(controller.stop_session().await.is_none());

    let status = controller.status().await;
    assert_eq!(status.state, SessionState::Idle);
    assert!(status.last_report.is_none());
    assert_eq!(sink.calls(), 0);

    Ok(())
}

#[tokio::test]
async fn test_new_session_finalizes_recording_session_first() -> Result<()> {
    let sink = Arc::new(MemorySink::default());
    let opener = ScriptOpener::new(vec![quiet(), loud(), loud(), loud()], true);
    let controller = RecordingController::new(patient_config(), opener.clone(), sink.clone());

    let first = controller.start_session().await?;
    wait_for_state(&controller, SessionState::Recording).await?;
    assert_eq!(sink.calls(), 0);

    let second = controller.start_session().await?;
    assert_ne!(first, second);

    // Exactly one persistence call, made before the second session existed
    assert_eq!(sink.calls(), 1);
    assert_eq!(
        sink.writes.lock().unwrap()[0].len(),
        3 * SAMPLES_PER_BUFFER * 4
    );
    let report = controller.last_report().expect("first session report");
    assert_eq!(report.session_id, first);
    assert_eq!(report.disposition, Disposition::Save);
    assert!(matches!(report.outcome, SessionOutcome::Saved { bytes, .. } if bytes == 3 * SAMPLES_PER_BUFFER * 4));

    assert_eq!(opener.opened.load(Ordering::SeqCst), 2);
    let status = controller.status().await;
    assert_eq!(status.session.map(|s| s.session_id), Some(second.clone()));

    wait_for_state(&controller, SessionState::Recording).await?;
    let report = controller.stop_session().await.expect("second session report");
    assert_eq!(report.session_id, second);
    assert_eq!(report.disposition, Disposition::Save);
    assert_eq!(sink.calls(), 2);
    assert!(controller.stop_session().await.is_none());

    Ok(())
}

#[tokio::test]
async fn test_silent_session_is_discarded_after_initial_timeout() -> Result<()> {
    let sink = Arc::new(MemorySink::default());
    let config = SessionConfig {
        initial_listen_timeout: Duration::from_millis(50),
        ..patient_config()
    };
    let controller = RecordingController::new(
        config,
        ScriptOpener::new(vec![quiet(), quiet(), quiet()], true),
        sink.clone(),
    );
    let mut reports = controller.subscribe();

    controller.start_session().await?;
    let report = next_report(&mut reports).await?;

    assert_eq!(report.disposition, Disposition::Discard);
    assert_eq!(report.outcome, SessionOutcome::Discarded);
    assert_eq!(sink.calls(), 0);

    // Finalized on its own: nothing left to stop
    assert!(controller.stop_session().await.is_none());
    assert_eq!(controller.status().await.state, SessionState::Idle);

    Ok(())
}

#[tokio::test]
async fn test_silence_after_activity_saves_via_poll_tick() -> Result<()> {
    let sink = Arc::new(MemorySink::default());
    let config = SessionConfig {
        silence_timeout: Duration::from_millis(100),
        ..patient_config()
    };
    // The device goes quiet after two loud buffers and delivers nothing more
    let controller = RecordingController::new(
        config,
        ScriptOpener::new(vec![loud(), loud()], true),
        sink.clone(),
    );
    let mut reports = controller.subscribe();

    controller.start_session().await?;
    let report = next_report(&mut reports).await?;

    assert_eq!(report.disposition, Disposition::Save);
    assert_eq!(sink.calls(), 1);
    assert_eq!(sink.writes.lock().unwrap()[0].len(), 2 * SAMPLES_PER_BUFFER * 4);

    Ok(())
}

#[tokio::test]
async fn test_stream_end_while_recording_saves() -> Result<()> {
    let sink = Arc::new(MemorySink::default());
    let controller = RecordingController::new(
        patient_config(),
        ScriptOpener::new(vec![loud(), quiet(), loud()], false),
        sink.clone(),
    );
    let mut reports = controller.subscribe();

    controller.start_session().await?;
    let report = next_report(&mut reports).await?;

    assert_eq!(report.disposition, Disposition::Save);
    assert_eq!(sink.writes.lock().unwrap()[0].len(), 2 * SAMPLES_PER_BUFFER * 4);

    Ok(())
}

#[tokio::test]
async fn test_device_open_failure_creates_no_session() -> Result<()> {
    let sink = Arc::new(MemorySink::default());
    let controller = RecordingController::new(patient_config(), Arc::new(BrokenDevice), sink.clone());

    let err = controller.start_session().await.unwrap_err();
    assert!(format!("{:#}", err).contains("device unavailable"));

    let status = controller.status().await;
    assert_eq!(status.state, SessionState::Idle);
    assert!(status.session.is_none());
    assert!(controller.stop_session().await.is_none());

    Ok(())
}

#[tokio::test]
async fn test_persistence_failure_is_reported_and_controller_recovers() -> Result<()> {
    let controller = RecordingController::new(
        patient_config(),
        ScriptOpener::new(vec![loud()], true),
        Arc::new(FullDisk),
    );

    controller.start_session().await?;
    wait_for_state(&controller, SessionState::Recording).await?;

    let report = controller.stop_session().await.expect("report");
    match &report.outcome {
        SessionOutcome::Failed { error } => assert!(error.contains("No space left")),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(controller.status().await.state, SessionState::Idle);

    // A later trigger still works
    controller.start_session().await?;
    assert!(controller.stop_session().await.is_some());

    Ok(())
}

#[tokio::test]
async fn test_concurrent_starts_serialize() -> Result<()> {
    let sink = Arc::new(MemorySink::default());
    let opener = ScriptOpener::new(vec![loud()], true);
    let controller = Arc::new(RecordingController::new(
        patient_config(),
        opener.clone(),
        sink.clone(),
    ));

    let mut handles = Vec::new();
    for _ in 0..4 {
        let controller = Arc::clone(&controller);
        handles.push(tokio::spawn(async move { controller.start_session().await }));
    }
    for handle in handles {
        handle.await??;
    }

    // Three sessions were superseded, one is still active
    assert_eq!(opener.opened.load(Ordering::SeqCst), 4);
    let superseded = controller.last_report().is_some();
    assert!(superseded);
    let last = controller.stop_session().await.expect("active session");
    assert!(matches!(
        last.disposition,
        Disposition::Save | Disposition::Discard
    ));

    Ok(())
}

#[tokio::test]
async fn test_stop_keeps_buffers_delivered_before_the_request() -> Result<()> {
    for _ in 0..20 {
        let sink = Arc::new(MemorySink::default());
        let controller = RecordingController::new(
            patient_config(),
            Arc::new(PrefilledOpener {
                buffers: vec![loud(), loud(), loud()],
            }),
            sink.clone(),
        );

        controller.start_session().await?;
        let report = controller.stop_session().await.expect("report");

        assert_eq!(report.disposition, Disposition::Save);
        assert!(
            matches!(report.outcome, SessionOutcome::Saved { bytes, .. } if bytes == 3 * SAMPLES_PER_BUFFER * 4),
            "queued audio lost: {:?}",
            report.outcome
        );
        assert_eq!(sink.calls(), 1);
    }

    Ok(())
}

#[tokio::test]
async fn test_status_does_not_wait_for_finalization() -> Result<()> {
    let controller = Arc::new(RecordingController::new(
        patient_config(),
        Arc::new(PrefilledOpener {
            buffers: vec![loud()],
        }),
        Arc::new(SlowSink(Duration::from_millis(500))),
    ));

    let first = controller.start_session().await?;
    wait_for_state(&controller, SessionState::Recording).await?;

    // The second start holds the controller while the first session persists
    let starter = {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move { controller.start_session().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    let status = tokio::time::timeout(Duration::from_millis(200), controller.status()).await?;
    assert_eq!(status.session.map(|s| s.session_id), Some(first));

    let second = starter.await??;
    assert_eq!(
        controller.status().await.session.map(|s| s.session_id),
        Some(second)
    );
    controller.stop_session().await;

    Ok(())
}
