use anyhow::{bail, Context, Result};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer as DecodedBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backend::{CaptureConfig, CaptureFormat, CaptureSource, SampleBuffer};
use super::blocks::BlockAccumulator;

/// A fully decoded audio file (f32, interleaved)
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let file = File::open(path)
            .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
        let stream = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .context("Unsupported audio container")?;
        let mut reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .context("No decodable audio track")?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let mut decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .context("Unsupported audio codec")?;

        let mut sample_rate = params.sample_rate;
        let mut channels = params.channels.map(|c| c.count() as u16);
        let mut samples = Vec::new();

        loop {
            let packet = match reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(e).context("Failed to read audio packet"),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    sample_rate.get_or_insert(spec.rate);
                    channels.get_or_insert(spec.channels.count() as u16);

                    let mut buffer = DecodedBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buffer.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buffer.samples());
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                }
                Err(e) => return Err(e).context("Failed to decode audio packet"),
            }
        }

        let (Some(sample_rate), Some(channels)) = (sample_rate, channels) else {
            bail!("Audio file has no sample rate or channel layout");
        };
        if sample_rate == 0 || channels == 0 {
            bail!("Audio file reports an empty format ({}Hz, {}ch)", sample_rate, channels);
        }

        let duration_seconds =
            samples.len() as f64 / (sample_rate as f64 * channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            sample_rate,
            channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate,
            channels,
            samples,
        })
    }

    pub fn format(&self) -> CaptureFormat {
        CaptureFormat::float32(self.sample_rate, self.channels)
    }
}

/// Capture source that replays an audio file
///
/// Decodes the whole file on start, then delivers fixed-duration buffers from a
/// dedicated thread. End of file ends the stream.
pub struct FileCaptureSource {
    path: PathBuf,
    config: CaptureConfig,
    stop_flag: Arc<AtomicBool>,
    capturing: bool,
}

impl FileCaptureSource {
    pub fn new(path: PathBuf, config: CaptureConfig) -> Self {
        Self {
            path,
            config,
            stop_flag: Arc::new(AtomicBool::new(false)),
            capturing: false,
        }
    }
}

#[async_trait::async_trait]
impl CaptureSource for FileCaptureSource {
    async fn start(&mut self) -> Result<(CaptureFormat, mpsc::Receiver<SampleBuffer>)> {
        if self.capturing {
            bail!("Already capturing");
        }

        let path = self.path.clone();
        let audio = tokio::task::spawn_blocking(move || AudioFile::open(path))
            .await
            .context("Decoder task panicked")??;

        let format = audio.format();
        let buffer_ms = self.config.buffer_duration_ms.max(1);
        let mut blocks = BlockAccumulator::new(format, buffer_ms);
        let mut buffers = blocks.push(audio.samples);
        buffers.extend(blocks.flush());
        let realtime = self.config.realtime;

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let stop_flag = Arc::new(AtomicBool::new(false));
        self.stop_flag = Arc::clone(&stop_flag);

        std::thread::Builder::new()
            .name("file-capture".to_string())
            .spawn(move || {
                for buffer in buffers {
                    if stop_flag.load(Ordering::SeqCst) {
                        break;
                    }
                    if tx.blocking_send(buffer).is_err() {
                        break;
                    }
                    if realtime {
                        std::thread::sleep(Duration::from_millis(buffer_ms));
                    }
                }
                debug!("File capture thread finished");
            })
            .context("Failed to spawn capture thread")?;

        self.capturing = true;

        info!(
            "File capture started: {} ({}Hz, {} channels, {}ms buffers)",
            self.path.display(),
            format.sample_rate,
            format.channels,
            buffer_ms
        );

        Ok((format, rx))
    }

    async fn stop(&mut self) -> Result<()> {
        if !self.capturing {
            return Ok(());
        }

        info!("Stopping file capture");
        self.stop_flag.store(true, Ordering::SeqCst);
        self.capturing = false;

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "file"
    }
}
