use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::backend::CaptureFormat;

/// Writes finalized session audio to durable storage
pub trait PersistenceSink: Send + Sync {
    /// Persist little-endian f32 bytes in `format`. Returns the written path.
    fn persist(&self, audio: &[u8], format: &CaptureFormat) -> Result<PathBuf>;
}

/// How output files are named
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OutputNaming {
    /// Every session overwrites the same file
    Fixed { file_name: String },
    /// One file per session: `<prefix>-<UTC timestamp>.wav`
    Timestamped { prefix: String },
}

impl Default for OutputNaming {
    fn default() -> Self {
        OutputNaming::Fixed {
            file_name: "recorded_audio.wav".to_string(),
        }
    }
}

/// Sink configuration
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Output directory for recordings
    pub output_dir: PathBuf,
    pub naming: OutputNaming,
}

impl SinkConfig {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            naming: OutputNaming::default(),
        }
    }
}

/// WAV file sink
///
/// Writes to a temporary file next to the destination and renames it into
/// place, so a reader of the destination path never sees a partial file.
pub struct WavFileSink {
    config: SinkConfig,
}

impl WavFileSink {
    pub fn new(config: SinkConfig) -> Result<Self> {
        // Create output directory if it doesn't exist
        fs::create_dir_all(&config.output_dir).context("Failed to create output directory")?;

        info!(
            "WAV sink initialized: {} ({:?})",
            config.output_dir.display(),
            config.naming
        );

        Ok(Self { config })
    }

    /// Destination path for the next recording
    pub fn next_path(&self) -> PathBuf {
        match &self.config.naming {
            OutputNaming::Fixed { file_name } => self.config.output_dir.join(file_name),
            OutputNaming::Timestamped { prefix } => self.config.output_dir.join(format!(
                "{}-{}.wav",
                prefix,
                Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
            )),
        }
    }
}

impl PersistenceSink for WavFileSink {
    fn persist(&self, audio: &[u8], format: &CaptureFormat) -> Result<PathBuf> {
        let path = self.next_path();
        let tmp_path = path.with_extension("wav.partial");

        if let Err(e) = write_wav(&tmp_path, audio, format) {
            if let Err(cleanup) = fs::remove_file(&tmp_path) {
                warn!("Failed to remove partial file {:?}: {}", tmp_path, cleanup);
            }
            return Err(e);
        }

        fs::rename(&tmp_path, &path)
            .with_context(|| format!("Failed to move recording into place: {:?}", path))?;

        info!(
            "Recording saved: {} ({} bytes of audio)",
            path.display(),
            audio.len()
        );

        Ok(path)
    }
}

/// Write f32 little-endian bytes as an IEEE float WAV file
fn write_wav(path: &Path, audio: &[u8], format: &CaptureFormat) -> Result<()> {
    if format.bits_per_sample != 32 {
        bail!(
            "Unsupported capture bit depth: {} (expected 32-bit float)",
            format.bits_per_sample
        );
    }

    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };

    let mut writer: hound::WavWriter<BufWriter<File>> = hound::WavWriter::create(path, spec)
        .with_context(|| format!("Failed to create WAV file: {:?}", path))?;

    for bytes in audio.chunks_exact(4) {
        let sample = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        writer
            .write_sample(sample)
            .context("Failed to write sample to WAV")?;
    }

    writer.finalize().context("Failed to finalize WAV file")?;

    Ok(())
}
