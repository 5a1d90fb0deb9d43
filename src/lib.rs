pub mod audio;
pub mod automation;
pub mod config;
pub mod http;
pub mod nats;
pub mod session;

pub use audio::{
    ActivityDetector, AudioFile, CaptureConfig, CaptureDevice, CaptureFormat, CaptureOpener,
    CaptureSource, CaptureSourceFactory, PersistenceSink, SampleBuffer, WavFileSink,
};
pub use automation::{Command, CommandResult, Dispatcher, HeadlessSurface, Surface};
pub use config::Config;
pub use http::{create_router, AppState};
pub use nats::{NatsClient, SessionMessage};
pub use session::{RecordingController, RecordingSession, SessionConfig, SessionReport, SessionState};
