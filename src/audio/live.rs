use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SizedSample, StreamConfig};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backend::{CaptureConfig, CaptureFormat, CaptureSource, SampleBuffer};
use super::blocks::BlockAccumulator;

/// Capture source backed by a system audio device
///
/// cpal streams are not `Send`, so each capture owns a dedicated thread
/// that builds the stream, plays it, and drops it once stop is requested.
/// Dropping the stream drops the sender and ends the buffer stream.
pub struct LiveCaptureSource {
    device: Option<String>,
    loopback: bool,
    config: CaptureConfig,
    stop_flag: Arc<AtomicBool>,
    capturing: bool,
}

impl LiveCaptureSource {
    /// `device` selects an input by name; `None` uses the host default.
    /// With `loopback` the default output device is captured instead.
    pub fn new(device: Option<String>, loopback: bool, config: CaptureConfig) -> Self {
        Self {
            device,
            loopback,
            config,
            stop_flag: Arc::new(AtomicBool::new(false)),
            capturing: false,
        }
    }
}

fn select_device(name: Option<&str>, loopback: bool) -> Result<cpal::Device> {
    let host = cpal::default_host();
    if loopback {
        return host
            .default_output_device()
            .context("no default output device available");
    }
    match name {
        Some(name) => {
            let mut devices = host.input_devices().context("no input devices available")?;
            devices
                .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                .ok_or_else(|| anyhow!("input device '{name}' not found"))
        }
        None => host
            .default_input_device()
            .context("no default input device available"),
    }
}

fn build_stream<T: SizedSample>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut accumulator: BlockAccumulator,
    tx: mpsc::Sender<SampleBuffer>,
    stop_flag: Arc<AtomicBool>,
    convert: fn(T) -> f32,
) -> Result<cpal::Stream> {
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _| {
            if stop_flag.load(Ordering::SeqCst) {
                return;
            }
            for buffer in accumulator.push(data.iter().copied().map(convert)) {
                if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(buffer) {
                    debug!("Capture channel full, dropping buffer");
                }
            }
        },
        |err| warn!("Audio stream error: {}", err),
        None,
    )?;
    Ok(stream)
}

fn open_stream(
    name: Option<&str>,
    loopback: bool,
    buffer_ms: u64,
    tx: mpsc::Sender<SampleBuffer>,
    stop_flag: Arc<AtomicBool>,
) -> Result<(cpal::Stream, CaptureFormat, String)> {
    let device = select_device(name, loopback)?;
    let device_name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
    let supported = if loopback {
        device.default_output_config()?
    } else {
        device.default_input_config()?
    };
    let sample_format = supported.sample_format();
    let config: StreamConfig = supported.config();
    let format = CaptureFormat::float32(config.sample_rate.0, config.channels);
    let accumulator = BlockAccumulator::new(format, buffer_ms);

    let stream = match sample_format {
        SampleFormat::F32 => {
            build_stream::<f32>(&device, &config, accumulator, tx, stop_flag, |s| s)?
        }
        SampleFormat::I16 => build_stream::<i16>(&device, &config, accumulator, tx, stop_flag, |s| {
            s as f32 / 32_768.0
        })?,
        SampleFormat::U16 => build_stream::<u16>(&device, &config, accumulator, tx, stop_flag, |s| {
            (s as f32 - 32_768.0) / 32_768.0
        })?,
        other => bail!("unsupported sample format: {other:?}"),
    };
    stream.play()?;

    Ok((stream, format, device_name))
}

#[async_trait::async_trait]
impl CaptureSource for LiveCaptureSource {
    async fn start(&mut self) -> Result<(CaptureFormat, mpsc::Receiver<SampleBuffer>)> {
        if self.capturing {
            bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (ready_tx, ready_rx) = std::sync::mpsc::channel();
        let stop_flag = Arc::new(AtomicBool::new(false));
        self.stop_flag = Arc::clone(&stop_flag);

        let device = self.device.clone();
        let loopback = self.loopback;
        let buffer_ms = self.config.buffer_duration_ms;

        std::thread::Builder::new()
            .name("live-capture".to_string())
            .spawn(move || {
                let opened =
                    open_stream(device.as_deref(), loopback, buffer_ms, tx, Arc::clone(&stop_flag));
                match opened {
                    Ok((stream, format, name)) => {
                        let _ = ready_tx.send(Ok((format, name)));
                        while !stop_flag.load(Ordering::SeqCst) {
                            std::thread::sleep(Duration::from_millis(20));
                        }
                        if let Err(e) = stream.pause() {
                            debug!("Failed to pause audio stream: {}", e);
                        }
                        drop(stream);
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                    }
                }
                debug!("Live capture thread finished");
            })
            .context("Failed to spawn capture thread")?;

        let (format, name) = tokio::task::spawn_blocking(move || ready_rx.recv())
            .await
            .context("Capture thread panicked")?
            .context("Capture thread exited before opening the device")??;

        self.capturing = true;

        info!(
            "Live capture started: {}{} ({}Hz, {} channels, {}ms buffers)",
            name,
            if self.loopback { " (loopback)" } else { "" },
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

        info!("Stopping live capture");
        self.stop_flag.store(true, Ordering::SeqCst);
        self.capturing = false;

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "live"
    }
}
