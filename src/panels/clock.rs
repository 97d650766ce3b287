use super::{draw_text, text_width, GLYPH_HEIGHT};
use crate::compositor::{CompositorError, DisplayCompositor, RegionOwner};
use crate::Timestamp;
use embedded_graphics::prelude::*;

/// Big "HH:MM" clock, centred in its region.
#[derive(Debug, Clone)]
pub struct ClockPanel {
    scale: u32,
    shown: Option<String>,
}

impl ClockPanel {
    pub fn new(scale: u32) -> Self {
        ClockPanel {
            scale: scale.max(1),
            shown: None,
        }
    }

    /// Repaint when the displayed minute changed. Returns whether it did.
    pub fn render(
        &mut self,
        compositor: &mut DisplayCompositor,
        now: Timestamp,
    ) -> Result<bool, CompositorError> {
        let text = now.format("%H:%M").to_string();
        if self.shown.as_deref() == Some(text.as_str()) {
            return Ok(false);
        }

        let scale = self.scale;
        compositor.repaint_region(RegionOwner::Clock, |canvas| {
            let size = canvas.bounding_box().size;
            let x = size.width.saturating_sub(text_width(&text, scale)) / 2;
            let y = size.height.saturating_sub(GLYPH_HEIGHT * scale) / 2;
            draw_text(canvas, &text, Point::new(x as i32, y as i32), scale);
        })?;

        self.shown = Some(text);
        Ok(true)
    }
}

impl Default for ClockPanel {
    fn default() -> Self {
        Self::new(8)
    }
}
