// Target surface abstraction
//
// Capture and input synthesis are platform services; the agent only needs
// "capture a bitmap of the surface" and "click at surface-relative pixels".

use anyhow::{bail, Result};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// A captured RGBA bitmap
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    /// 8-bit RGBA, row-major
    pub rgba: Vec<u8>,
}

/// Ring drawn over a capture at the clicked point
const MARKER_RADIUS: f64 = 5.0;
const MARKER_HALF_WIDTH: f64 = 1.5;
pub const MARKER_COLOR: [u8; 4] = [255, 0, 0, 255];

impl Frame {
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.rgba.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Draw the click marker centred on (x, y), clipped to the frame
    pub fn mark_click(&mut self, x: i32, y: i32) {
        let reach = (MARKER_RADIUS + MARKER_HALF_WIDTH).ceil() as i32;

        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let distance = f64::from(dx * dx + dy * dy).sqrt();
                if (distance - MARKER_RADIUS).abs() > MARKER_HALF_WIDTH {
                    continue;
                }
                let (px, py) = (x + dx, y + dy);
                if px < 0 || py < 0 || px >= self.width as i32 || py >= self.height as i32 {
                    continue;
                }
                let offset = (py as usize * self.width as usize + px as usize) * 4;
                if let Some(slot) = self.rgba.get_mut(offset..offset + 4) {
                    slot.copy_from_slice(&MARKER_COLOR);
                }
            }
        }
    }
}

pub trait Surface: Send + Sync {
    /// Title used to announce the agent
    fn title(&self) -> &str;

    /// Client-area size in pixels
    fn size(&self) -> Result<(u32, u32)>;

    fn capture(&self) -> Result<Frame>;

    /// Left button down + up at surface-relative pixel coordinates
    fn click(&self, x: i32, y: i32) -> Result<()>;
}

/// In-memory surface: solid fill, records every click
pub struct HeadlessSurface {
    title: String,
    width: u32,
    height: u32,
    fill: [u8; 4],
    clicks: Mutex<Vec<(i32, i32)>>,
}

impl HeadlessSurface {
    pub fn new(title: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            title: title.into(),
            width,
            height,
            fill: [0, 0, 0, 255],
            clicks: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fill(mut self, fill: [u8; 4]) -> Self {
        self.fill = fill;
        self
    }

    pub fn clicks(&self) -> Vec<(i32, i32)> {
        self.clicks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Surface for HeadlessSurface {
    fn title(&self) -> &str {
        &self.title
    }

    fn size(&self) -> Result<(u32, u32)> {
        Ok((self.width, self.height))
    }

    fn capture(&self) -> Result<Frame> {
        if self.width == 0 || self.height == 0 {
            bail!("Surface {:?} has no client area", self.title);
        }
        let pixels = self.width as usize * self.height as usize;
        Ok(Frame {
            width: self.width,
            height: self.height,
            rgba: self.fill.repeat(pixels),
        })
    }

    fn click(&self, x: i32, y: i32) -> Result<()> {
        debug!("Headless click at ({}, {}) on {:?}", x, y, self.title);
        self.clicks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((x, y));
        Ok(())
    }
}
