use super::command::{Command, CommandError};
use super::surface::{Frame, Surface};
use super::targets::ClickTargets;
use crate::session::RecordingController;
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{info, warn};

/// Screenshot pixels as carried in command results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScreenshotPayload {
    pub width: u32,
    pub height: u32,
    /// Pixel layout of `data`
    pub encoding: String,
    /// Base64-encoded pixels
    pub data: String,
}

impl From<&Frame> for ScreenshotPayload {
    fn from(frame: &Frame) -> Self {
        Self {
            width: frame.width,
            height: frame.height,
            encoding: "rgba8".to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(&frame.rgba),
        }
    }
}

/// Result of executing one command
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResult {
    pub command: String,
    pub ok: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<ScreenshotPayload>,
    /// Pixel position that was clicked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clicked: Option<(i32, i32)>,
    /// Recording session started by the click
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub timestamp: String, // RFC3339 timestamp
}

impl CommandResult {
    fn ok(command: &str, message: String) -> Self {
        Self {
            command: command.to_string(),
            ok: true,
            message,
            screenshot: None,
            clicked: None,
            session_id: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    fn error(command: &str, error: &CommandError) -> Self {
        Self {
            ok: false,
            ..Self::ok(command, error.to_string())
        }
    }
}

/// Executes automation commands against the surface
///
/// Every click captures the surface with a marker at the click point, then
/// starts a new recording session.
pub struct Dispatcher {
    surface: Arc<dyn Surface>,
    targets: ClickTargets,
    controller: Arc<RecordingController>,
    /// Capture taken after the latest click, marker drawn in
    last_click: Mutex<Option<Frame>>,
}

impl Dispatcher {
    pub fn new(
        surface: Arc<dyn Surface>,
        targets: ClickTargets,
        controller: Arc<RecordingController>,
    ) -> Self {
        Self {
            surface,
            targets,
            controller,
            last_click: Mutex::new(None),
        }
    }

    pub fn surface(&self) -> &Arc<dyn Surface> {
        &self.surface
    }

    pub fn targets(&self) -> &ClickTargets {
        &self.targets
    }

    pub fn controller(&self) -> &Arc<RecordingController> {
        &self.controller
    }

    pub fn last_click_frame(&self) -> Option<Frame> {
        self.last_click
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Parse and execute one text command. Never fails; errors are reported in the result.
    pub async fn execute_line(&self, line: &str) -> CommandResult {
        let line = line.trim();
        info!("Received command: {}", line);

        let result = match line.parse::<Command>() {
            Ok(command) => self.execute(&command).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(result) => result,
            Err(e) => {
                warn!("Command {:?} failed: {}", line, e);
                CommandResult::error(line, &e)
            }
        }
    }

    pub async fn execute(&self, command: &Command) -> Result<CommandResult, CommandError> {
        let text = command.to_string();

        match command {
            Command::Screenshot => {
                let frame = self.surface.capture().map_err(CommandError::Surface)?;
                let mut result = CommandResult::ok(
                    &text,
                    format!("captured {}x{}", frame.width, frame.height),
                );
                result.screenshot = Some(ScreenshotPayload::from(&frame));
                Ok(result)
            }
            Command::Click { x, y } => self.click(&text, *x, *y).await,
            Command::ClickUv { u, v } => {
                let (x, y) = self.uv_to_pixels(*u, *v)?;
                self.click(&text, x, y).await
            }
            Command::ClickNamed(name) => {
                let target = self
                    .targets
                    .get(name)
                    .ok_or_else(|| CommandError::UnknownTarget(name.clone()))?;
                let (x, y) = self.uv_to_pixels(target.u, target.v)?;
                self.click(&text, x, y).await
            }
        }
    }

    /// Map UV in [0, 1] to client-area pixels
    pub fn uv_to_pixels(&self, u: f64, v: f64) -> Result<(i32, i32), CommandError> {
        if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
            return Err(CommandError::UvOutOfRange { u, v });
        }
        let (width, height) = self.surface.size().map_err(CommandError::Surface)?;
        Ok(((u * width as f64) as i32, (v * height as f64) as i32))
    }

    async fn click(&self, text: &str, x: i32, y: i32) -> Result<CommandResult, CommandError> {
        self.surface.click(x, y).map_err(CommandError::Surface)?;

        let mut result = CommandResult::ok(text, format!("clicked ({}, {})", x, y));
        result.clicked = Some((x, y));

        match self.surface.capture() {
            Ok(mut frame) => {
                frame.mark_click(x, y);
                *self.last_click.lock().unwrap_or_else(PoisonError::into_inner) = Some(frame);
            }
            Err(e) => warn!("Failed to capture click marker: {:#}", e),
        }

        // The click itself succeeded even if no recording could be started
        match self.controller.start_session().await {
            Ok(session_id) => result.session_id = Some(session_id),
            Err(e) => {
                warn!("Failed to start recording after click: {:#}", e);
                result.message = format!("{}; recording not started: {:#}", result.message, e);
            }
        }

        Ok(result)
    }
}
