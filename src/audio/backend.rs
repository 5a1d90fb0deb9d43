use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;

/// Fixed capture format, established when a device is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureFormat {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Bits per sample (32 = IEEE float)
    pub bits_per_sample: u16,
}

impl CaptureFormat {
    /// 32-bit float format, the native format of every capture source here
    pub fn float32(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 32,
        }
    }

    /// Number of interleaved samples that cover `duration_ms`
    pub fn samples_for_ms(&self, duration_ms: u64) -> usize {
        let frames = u64::from(self.sample_rate) * duration_ms / 1000;
        (frames * u64::from(self.channels)) as usize
    }
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self::float32(48000, 2)
    }
}

/// One block of captured audio (f32, interleaved)
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    /// Raw audio samples (f32, interleaved)
    pub samples: Vec<f32>,
    /// Format fixed at open time
    pub format: CaptureFormat,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl SampleBuffer {
    pub fn new(samples: Vec<f32>, format: CaptureFormat, timestamp_ms: u64) -> Self {
        Self {
            samples,
            format,
            timestamp_ms,
        }
    }

    /// Decode a little-endian f32 byte block. A trailing partial sample is ignored.
    pub fn from_le_bytes(bytes: &[u8], format: CaptureFormat, timestamp_ms: u64) -> Self {
        let samples = bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        Self::new(samples, format, timestamp_ms)
    }

    /// Number of bytes this buffer occupies in the capture format
    pub fn byte_count(&self) -> usize {
        self.samples.len() * 4
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Append the samples as little-endian bytes
    pub fn write_le_bytes(&self, out: &mut Vec<u8>) {
        out.reserve(self.byte_count());
        for sample in &self.samples {
            out.extend_from_slice(&sample.to_le_bytes());
        }
    }
}

/// Configuration shared by capture sources
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Duration of each delivered buffer in milliseconds
    pub buffer_duration_ms: u64,
    /// Pace delivery in real time (file sources)
    pub realtime: bool,
    /// Channel capacity between capture thread and session pump
    pub channel_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            buffer_duration_ms: 100, // 100ms buffers
            realtime: true,
            channel_capacity: 100,
        }
    }
}

/// Audio capture source
///
/// Implementations deliver buffers on their own thread or task. Once `stop`
/// has been called no further buffers are delivered and the receiver returned
/// by `start` ends exactly once.
#[async_trait::async_trait]
pub trait CaptureSource: Send + Sync {
    /// Open the device and start delivering buffers
    async fn start(&mut self) -> Result<(CaptureFormat, mpsc::Receiver<SampleBuffer>)>;

    /// Stop delivering buffers. Calling it again is a no-op.
    async fn stop(&mut self) -> Result<()>;

    /// Check if the source is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get source name for logging
    fn name(&self) -> &str;
}

/// Opens a fresh capture source for every recording session
pub trait CaptureOpener: Send + Sync {
    fn open(&self) -> Result<Box<dyn CaptureSource>>;
}

/// Capture device selection, fixed for the lifetime of the process
#[derive(Debug, Clone)]
pub enum CaptureDevice {
    /// Replay an audio file (WAV, FLAC, MP3, OGG)
    File(PathBuf),
    /// System audio device; `device` picks an input by name, `loopback`
    /// captures the default output instead
    Live {
        device: Option<String>,
        loopback: bool,
    },
    /// No device configured; every session fails to start
    None,
}

/// Capture source factory
pub struct CaptureSourceFactory {
    device: CaptureDevice,
    config: CaptureConfig,
}

impl CaptureSourceFactory {
    pub fn new(device: CaptureDevice, config: CaptureConfig) -> Self {
        Self { device, config }
    }

    pub fn device(&self) -> &CaptureDevice {
        &self.device
    }
}

impl CaptureOpener for CaptureSourceFactory {
    fn open(&self) -> Result<Box<dyn CaptureSource>> {
        match &self.device {
            CaptureDevice::File(path) => {
                use super::file::FileCaptureSource;
                Ok(Box::new(FileCaptureSource::new(
                    path.clone(),
                    self.config.clone(),
                )))
            }
            #[cfg(feature = "live-capture")]
            CaptureDevice::Live { device, loopback } => {
                use super::live::LiveCaptureSource;
                Ok(Box::new(LiveCaptureSource::new(
                    device.clone(),
                    *loopback,
                    self.config.clone(),
                )))
            }
            #[cfg(not(feature = "live-capture"))]
            CaptureDevice::Live { .. } => {
                anyhow::bail!("Live capture requested but surface-agent was built without live-capture support")
            }
            CaptureDevice::None => {
                anyhow::bail!("No capture device configured")
            }
        }
    }
}
