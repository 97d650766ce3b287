//! # Panel driver interface
//!
//! The compositor talks to the e-paper controller through [`PanelDriver`]: a
//! mutable 8-bit pixel buffer of fixed size plus the two refresh calls. The
//! refresh mode is passed through untouched, so the driver decides what a
//! waveform means on its hardware.
//!
//! [`VirtualDisplay`] is the in-process driver used when no panel is attached.

use crate::renderer::render_ascii;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// IT8951 waveform modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayMode {
    /// Full clear to white, slow and flashy
    #[serde(rename = "INIT")]
    Init,
    /// Direct update, black/white only
    #[serde(rename = "DU")]
    Du,
    /// 16 grey levels with a full flash
    #[serde(rename = "GC16")]
    Gc16,
    /// 16 grey levels without the flash
    #[serde(rename = "GL16")]
    Gl16,
    #[serde(rename = "GLR16")]
    Glr16,
    #[serde(rename = "GLD16")]
    Gld16,
    /// Fast black/white animation mode
    #[serde(rename = "A2")]
    A2,
    #[serde(rename = "DU4")]
    Du4,
}

#[derive(Debug, Error)]
pub enum DisplayError {
    /// Frame buffer and panel disagree on size
    #[error("frame buffer size mismatch: expected {expected} bytes, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("display IO error: {0}")]
    Io(#[from] io::Error),
}

/// Minimal e-paper driver: pixel buffer plus full/partial refresh.
pub trait PanelDriver {
    /// Panel size as (width, height) in pixels
    fn dimensions(&self) -> (u32, u32);

    /// Driver-owned 8bpp buffer, `width * height` bytes, row-major
    fn frame_buf(&mut self) -> &mut [u8];

    /// Refresh the whole panel from the buffer
    fn draw_full(&mut self, mode: DisplayMode) -> Result<(), DisplayError>;

    /// Refresh only what changed since the last push
    fn draw_partial(&mut self, mode: DisplayMode) -> Result<(), DisplayError>;
}

/// Driver without hardware: keeps the pixels, counts pushes and can mirror
/// the panel to a PGM file and to the terminal.
pub struct VirtualDisplay {
    width: u32,
    height: u32,
    buffer: Vec<u8>,
    snapshot_path: Option<PathBuf>,
    ascii_columns: Option<u32>,
    full_pushes: usize,
    partial_pushes: usize,
    last_mode: Option<DisplayMode>,
}

impl VirtualDisplay {
    pub fn new(width: u32, height: u32) -> Self {
        VirtualDisplay {
            width,
            height,
            buffer: vec![0xFF; (width * height) as usize],
            snapshot_path: None,
            ascii_columns: None,
            full_pushes: 0,
            partial_pushes: 0,
            last_mode: None,
        }
    }

    /// Write a PGM snapshot to `path` after every push
    pub fn with_snapshot(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = Some(path.into());
        self
    }

    /// Print an ASCII preview `columns` characters wide on every full push
    pub fn with_ascii_preview(mut self, columns: u32) -> Self {
        self.ascii_columns = Some(columns);
        self
    }

    pub fn full_pushes(&self) -> usize {
        self.full_pushes
    }

    pub fn partial_pushes(&self) -> usize {
        self.partial_pushes
    }

    pub fn last_mode(&self) -> Option<DisplayMode> {
        self.last_mode
    }

    pub fn pixels(&self) -> &[u8] {
        &self.buffer
    }

    /// Binary PGM (P5) image of the current buffer
    pub fn to_pgm(&self) -> Vec<u8> {
        let mut out = format!("P5\n{} {}\n255\n", self.width, self.height).into_bytes();
        out.extend_from_slice(&self.buffer);
        out
    }

    fn write_snapshot(&self) -> Result<(), DisplayError> {
        if let Some(path) = &self.snapshot_path {
            fs::write(path, self.to_pgm())?;
            debug!("Wrote panel snapshot to {}", path.display());
        }
        Ok(())
    }
}

impl PanelDriver for VirtualDisplay {
    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn frame_buf(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    fn draw_full(&mut self, mode: DisplayMode) -> Result<(), DisplayError> {
        self.full_pushes += 1;
        self.last_mode = Some(mode);
        debug!("Virtual display: full refresh ({:?})", mode);

        if let Some(columns) = self.ascii_columns {
            println!(
                "{}",
                render_ascii(&self.buffer, self.width, self.height, columns)
            );
        }
        self.write_snapshot()
    }

    fn draw_partial(&mut self, mode: DisplayMode) -> Result<(), DisplayError> {
        self.partial_pushes += 1;
        self.last_mode = Some(mode);
        if let Err(e) = self.write_snapshot() {
            // A missed partial snapshot is caught up by the next push
            warn!("Virtual display snapshot failed: {}", e);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_names_match_controller() {
        let json = serde_json::to_string(&DisplayMode::Gc16).unwrap();
        assert_eq!(json, "\"GC16\"");
        let mode: DisplayMode = serde_json::from_str("\"GL16\"").unwrap();
        assert_eq!(mode, DisplayMode::Gl16);
    }

    #[test]
    fn test_pushes_are_counted() {
        let mut display = VirtualDisplay::new(4, 2);
        display.draw_full(DisplayMode::Gc16).unwrap();
        display.draw_partial(DisplayMode::Gl16).unwrap();
        display.draw_partial(DisplayMode::Gl16).unwrap();

        assert_eq!(display.full_pushes(), 1);
        assert_eq!(display.partial_pushes(), 2);
        assert_eq!(display.last_mode(), Some(DisplayMode::Gl16));
    }

    #[test]
    fn test_snapshot_is_pgm() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("panel.pgm");
        let mut display = VirtualDisplay::new(3, 2).with_snapshot(&path);
        display.frame_buf()[0] = 0x00;
        display.draw_full(DisplayMode::Gc16).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(b"P5\n3 2\n255\n"));
        assert_eq!(bytes.len(), "P5\n3 2\n255\n".len() + 6);
        assert_eq!(bytes[bytes.len() - 6], 0x00);
    }

    #[test]
    fn test_full_push_fails_on_unwritable_snapshot() {
        let mut display = VirtualDisplay::new(2, 2).with_snapshot("/nonexistent/dir/panel.pgm");
        assert!(matches!(
            display.draw_full(DisplayMode::Gc16),
            Err(DisplayError::Io(_))
        ));
        // Partial pushes only log it
        assert!(display.draw_partial(DisplayMode::Gl16).is_ok());
    }
}
