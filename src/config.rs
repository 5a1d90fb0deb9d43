use anyhow::Result;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{CaptureConfig, CaptureDevice, OutputNaming, SinkConfig};
use crate::nats::ChannelConfig;
use crate::session::SessionConfig;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub nats: NatsConfig,
    pub audio: AudioConfig,
    pub automation: AutomationConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct NatsConfig {
    pub enabled: bool,
    pub url: String,
    pub agent_id: String,
    pub reconnect_delay_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Audio file replayed as the capture device (empty = no device)
    pub capture_file: Option<String>,
    /// Capture from a system audio device when no file is configured
    #[serde(default)]
    pub live: bool,
    /// Input device name for live capture (empty = host default)
    #[serde(default)]
    pub live_device: String,
    /// Capture the default output device instead of an input
    #[serde(default)]
    pub loopback: bool,
    pub realtime: bool,
    pub buffer_duration_ms: u64,
    pub activity_threshold: f32,
    pub initial_listen_timeout_ms: u64,
    pub silence_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub retain_trailing_silence: bool,
    pub recordings_path: String,
    pub output: OutputNaming,
}

#[derive(Debug, Deserialize)]
pub struct AutomationConfig {
    pub targets_path: String,
    pub reload_interval_ms: u64,
    pub surface_title: String,
    pub surface_width: u32,
    pub surface_height: u32,
}

impl Config {
    /// Load `path` (any format the `config` crate recognises by extension),
    /// then apply `SURFACE_AGENT__SECTION__KEY` environment overrides.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix("SURFACE_AGENT").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}

impl AudioConfig {
    pub fn capture_device(&self) -> CaptureDevice {
        match self.capture_file.as_deref() {
            Some(path) if !path.is_empty() => CaptureDevice::File(PathBuf::from(path)),
            _ if self.live => CaptureDevice::Live {
                device: Some(self.live_device.clone()).filter(|name| !name.is_empty()),
                loopback: self.loopback,
            },
            _ => CaptureDevice::None,
        }
    }

    pub fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            buffer_duration_ms: self.buffer_duration_ms,
            realtime: self.realtime,
            ..CaptureConfig::default()
        }
    }

    pub fn sink_config(&self) -> SinkConfig {
        SinkConfig {
            output_dir: PathBuf::from(&self.recordings_path),
            naming: self.output.clone(),
        }
    }
}

impl From<&AudioConfig> for SessionConfig {
    fn from(cfg: &AudioConfig) -> Self {
        Self {
            activity_threshold: cfg.activity_threshold,
            initial_listen_timeout: Duration::from_millis(cfg.initial_listen_timeout_ms),
            silence_timeout: Duration::from_millis(cfg.silence_timeout_ms),
            retain_trailing_silence: cfg.retain_trailing_silence,
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
        }
    }
}

impl From<&NatsConfig> for ChannelConfig {
    fn from(cfg: &NatsConfig) -> Self {
        Self {
            url: cfg.url.clone(),
            agent_id: cfg.agent_id.clone(),
            reconnect_delay: Duration::from_secs(cfg.reconnect_delay_secs),
        }
    }
}
