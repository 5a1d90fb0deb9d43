pub mod backend;
pub mod blocks;
pub mod detector;
pub mod file;
#[cfg(feature = "live-capture")]
pub mod live;
pub mod scripted;
pub mod sink;

pub use backend::{
    CaptureConfig, CaptureDevice, CaptureFormat, CaptureOpener, CaptureSource,
    CaptureSourceFactory, SampleBuffer,
};
pub use blocks::BlockAccumulator;
pub use detector::{rms, ActivityDetector};
pub use file::{AudioFile, FileCaptureSource};
#[cfg(feature = "live-capture")]
pub use live::LiveCaptureSource;
pub use scripted::ScriptedCaptureSource;
pub use sink::{OutputNaming, PersistenceSink, SinkConfig, WavFileSink};
