//! # Panels
//!
//! A panel turns one source's data into pixels inside its own region. Each
//! tick the render loop calls [`render_source`] for every panel, which works
//! out which of three things happened since the last tick:
//!
//! - nothing new: the region keeps its pixels
//! - the fetch failed: the wrapped error text is painted once
//! - fresh data: the panel paints it and the data is dropped
//!
//! The clock is not backed by a source and repaints itself when the minute
//! changes (see [`ClockPanel`]).

mod clock;
mod forecast;
mod sensor;
mod thermostat;

pub use clock::ClockPanel;
pub use forecast::{day_night_icon, ForecastPanel};
pub use sensor::SensorPanel;
pub use thermostat::ThermostatPanel;

use crate::compositor::{CompositorError, DisplayCompositor, RegionCanvas, RegionOwner};
use crate::framebuffer::Scaled;
use crate::source::{DataSource, SourceData, Unrendered};
use crate::Timestamp;
use embedded_graphics::{
    mono_font::{iso_8859_1::FONT_10X20, MonoTextStyle},
    pixelcolor::Gray8,
    prelude::*,
    text::{Baseline, Text},
};
use log::{debug, warn};

/// Glyph cell of the panel font
pub const GLYPH_WIDTH: u32 = 10;
pub const GLYPH_HEIGHT: u32 = 20;

/// What a render pass did to a region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    /// Nothing new; pixels untouched
    Unchanged,
    /// Error text painted
    Error,
    /// Fresh data painted; the count is the number of records drawn
    Drawn(usize),
}

/// Paints one source's data into its region.
pub trait SourcePanel {
    fn owner(&self) -> RegionOwner;

    /// Paint `data` on a freshly cleared canvas and return the number of
    /// records drawn.
    fn paint(&mut self, canvas: &mut RegionCanvas<'_>, data: &SourceData, now: Timestamp)
        -> usize;
}

/// Bring `panel`'s region up to date with `source`.
pub fn render_source(
    panel: &mut dyn SourcePanel,
    source: &mut DataSource,
    compositor: &mut DisplayCompositor,
    now: Timestamp,
) -> Result<RenderOutcome, CompositorError> {
    let owner = panel.owner();
    // Check first so nothing is taken out of the source for a missing region
    if !compositor.has_region(owner) {
        return Err(CompositorError::UnknownRegion(owner));
    }

    match source.take_unrendered() {
        None => Ok(RenderOutcome::Unchanged),
        Some(Unrendered::Error(message)) => {
            compositor.repaint_region(owner, |canvas| draw_error(canvas, &message))?;
            debug!("{}: error painted", source.name());
            Ok(RenderOutcome::Error)
        }
        Some(Unrendered::Data(data)) => {
            let drawn = compositor.repaint_region(owner, |canvas| panel.paint(canvas, &data, now))?;
            debug!("{}: {} record(s) painted", source.name(), drawn);
            Ok(RenderOutcome::Drawn(drawn))
        }
    }
}

/// Draw `text` with its top-left corner at `top_left`, magnified `scale` times.
pub fn draw_text(canvas: &mut RegionCanvas<'_>, text: &str, top_left: Point, scale: u32) {
    let style = MonoTextStyle::new(&FONT_10X20, Gray8::BLACK);
    if scale <= 1 {
        Text::with_baseline(text, top_left, style, Baseline::Top)
            .draw(canvas)
            .ok();
    } else {
        let mut big = Scaled::new(canvas, scale);
        Text::with_baseline(text, top_left / scale as i32, style, Baseline::Top)
            .draw(&mut big)
            .ok();
    }
}

/// Pixel width of `text` at `scale`
pub fn text_width(text: &str, scale: u32) -> u32 {
    text.chars().count() as u32 * GLYPH_WIDTH * scale.max(1)
}

/// Paint a multi-line error message, large if it fits the region.
///
/// Only as many lines as the region can hold are drawn.
pub fn draw_error(canvas: &mut RegionCanvas<'_>, message: &str) {
    let size = canvas.bounding_box().size;
    let lines: Vec<&str> = message.lines().collect();
    let widest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) as u32;

    let fits = |scale: u32| {
        widest * GLYPH_WIDTH * scale + 8 <= size.width
            && lines.len() as u32 * GLYPH_HEIGHT * scale + 8 <= size.height
    };
    let scale = if fits(2) { 2 } else { 1 };

    // Lines past the bottom edge are dropped
    let room = (size.height.saturating_sub(4) / (GLYPH_HEIGHT * scale)).max(1) as usize;
    if lines.len() > room {
        debug!("Error text cut to {} of {} lines", room, lines.len());
    }
    for (i, line) in lines.iter().take(room).enumerate() {
        let y = 4 + (i as u32 * GLYPH_HEIGHT * scale) as i32;
        draw_text(canvas, line, Point::new(4, y), scale);
    }
}

/// Warn about data a panel cannot show and paint nothing
fn unexpected(owner: RegionOwner, data: &SourceData) -> usize {
    warn!(
        "{:?} panel got data it cannot show ({} record(s))",
        owner,
        data.len()
    );
    0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::DisplayMode;
    use std::time::Duration;

    fn compositor(w: u32, h: u32) -> DisplayCompositor {
        let mut c = DisplayCompositor::new(
            w,
            h,
            Duration::from_secs(1800),
            DisplayMode::Gc16,
            DisplayMode::Gl16,
        );
        c.claim_region(
            RegionOwner::Sensor,
            embedded_graphics::primitives::Rectangle::new(Point::zero(), Size::new(w, h)),
        )
        .unwrap();
        c
    }

    #[test]
    fn test_text_width() {
        assert_eq!(text_width("12:34", 1), 50);
        assert_eq!(text_width("°C", 4), 80);
    }

    #[test]
    fn test_error_text_uses_large_font_when_it_fits() {
        let mut wide = compositor(400, 100);
        wide.repaint_region(RegionOwner::Sensor, |c| draw_error(c, "boom"))
            .unwrap();
        let large = wide.frame().ink_count(&wide.frame().bounding_box());

        let mut narrow = compositor(60, 100);
        narrow
            .repaint_region(RegionOwner::Sensor, |c| draw_error(c, "boom"))
            .unwrap();
        let small = narrow.frame().ink_count(&narrow.frame().bounding_box());

        assert!(small > 0);
        // Double scale quadruples the ink
        assert_eq!(large, small * 4);
    }
}
