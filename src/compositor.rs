//! # Display compositor
//!
//! Owns the frame buffer and the map of which panel owns which rectangle.
//! Panels never see the whole buffer: [`DisplayCompositor::repaint_region`]
//! clears their rectangle to white and hands them a canvas clipped to it, so a
//! panel cannot scribble over its neighbours.
//!
//! Pushing is separate from painting. Each tick the render loop asks
//! [`DisplayCompositor::schedule_push`] for the refresh kind and then calls
//! [`DisplayCompositor::push`] once, the only call here that blocks.

use crate::display::{DisplayError, DisplayMode, PanelDriver};
use crate::framebuffer::{FrameBuffer, WHITE};
pub use crate::framebuffer::RegionCanvas;
use crate::Timestamp;
use embedded_graphics::{prelude::*, primitives::Rectangle};
use log::{debug, info};
use std::time::Duration;
use thiserror::Error;

/// Who owns a rectangle of the frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegionOwner {
    Clock,
    Sensor,
    Forecast,
    Thermostat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRegion {
    pub owner: RegionOwner,
    pub area: Rectangle,
}

impl FrameRegion {
    /// True when the two rectangles share at least one pixel
    pub fn overlaps(&self, other: &Rectangle) -> bool {
        overlaps(&self.area, other)
    }
}

fn overlaps(a: &Rectangle, b: &Rectangle) -> bool {
    if a.is_zero_sized() || b.is_zero_sized() {
        return false;
    }
    let (aw, ah) = (a.size.width as i32, a.size.height as i32);
    let (bw, bh) = (b.size.width as i32, b.size.height as i32);

    a.top_left.x < b.top_left.x + bw
        && b.top_left.x < a.top_left.x + aw
        && a.top_left.y < b.top_left.y + bh
        && b.top_left.y < a.top_left.y + ah
}

#[derive(Debug, Error, PartialEq)]
pub enum CompositorError {
    #[error("region {owner:?} overlaps region {other:?}")]
    Overlap {
        owner: RegionOwner,
        other: RegionOwner,
    },

    #[error("region {owner:?} at {area:?} does not fit the {width}x{height} frame")]
    OutOfBounds {
        owner: RegionOwner,
        area: Rectangle,
        width: u32,
        height: u32,
    },

    #[error("region {0:?} is already claimed")]
    DuplicateOwner(RegionOwner),

    #[error("no region claimed for {0:?}")]
    UnknownRegion(RegionOwner),
}

/// How the next push should refresh the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    /// Whole panel with the flashing waveform; clears ghosting
    Full,
    /// Changed pixels only
    Partial,
}

/// Full-refresh bookkeeping
#[derive(Debug, Clone)]
struct RefreshCadence {
    full_interval: Duration,
    last_full: Option<Timestamp>,
}

impl RefreshCadence {
    fn next(&mut self, now: Timestamp) -> PushKind {
        let due = match self.last_full {
            None => true,
            Some(last) => match (now - last).to_std() {
                Ok(elapsed) => elapsed >= self.full_interval,
                Err(_) => false,
            },
        };

        if due {
            self.last_full = Some(now);
            PushKind::Full
        } else {
            PushKind::Partial
        }
    }
}

pub struct DisplayCompositor {
    frame: FrameBuffer,
    regions: Vec<FrameRegion>,
    cadence: RefreshCadence,
    full_mode: DisplayMode,
    partial_mode: DisplayMode,
}

impl DisplayCompositor {
    /// Blank (white) compositor. The first [`schedule_push`](Self::schedule_push)
    /// always returns [`PushKind::Full`].
    pub fn new(
        width: u32,
        height: u32,
        full_interval: Duration,
        full_mode: DisplayMode,
        partial_mode: DisplayMode,
    ) -> Self {
        DisplayCompositor {
            frame: FrameBuffer::new(width, height),
            regions: Vec::new(),
            cadence: RefreshCadence {
                full_interval,
                last_full: None,
            },
            full_mode,
            partial_mode,
        }
    }

    pub fn frame(&self) -> &FrameBuffer {
        &self.frame
    }

    pub fn regions(&self) -> &[FrameRegion] {
        &self.regions
    }

    pub fn region(&self, owner: RegionOwner) -> Option<&FrameRegion> {
        self.regions.iter().find(|r| r.owner == owner)
    }

    pub fn has_region(&self, owner: RegionOwner) -> bool {
        self.region(owner).is_some()
    }

    /// Reserve `area` for `owner`.
    ///
    /// Rejected when the area leaves the frame, the owner already has a region
    /// or the area overlaps another owner's region.
    pub fn claim_region(
        &mut self,
        owner: RegionOwner,
        area: Rectangle,
    ) -> Result<(), CompositorError> {
        let frame_box = self.frame.bounding_box();
        if area.is_zero_sized() || frame_box.intersection(&area) != area {
            return Err(CompositorError::OutOfBounds {
                owner,
                area,
                width: self.frame.width(),
                height: self.frame.height(),
            });
        }
        if self.has_region(owner) {
            return Err(CompositorError::DuplicateOwner(owner));
        }
        if let Some(other) = self.regions.iter().find(|r| r.overlaps(&area)) {
            return Err(CompositorError::Overlap {
                owner,
                other: other.owner,
            });
        }

        debug!("Region {:?} claimed at {:?}", owner, area);
        self.regions.push(FrameRegion { owner, area });
        Ok(())
    }

    /// Clear `owner`'s region to white and let `draw` paint into it.
    ///
    /// Never pushes to the panel.
    pub fn repaint_region<R>(
        &mut self,
        owner: RegionOwner,
        draw: impl FnOnce(&mut RegionCanvas<'_>) -> R,
    ) -> Result<R, CompositorError> {
        let area = self
            .region(owner)
            .map(|r| r.area)
            .ok_or(CompositorError::UnknownRegion(owner))?;

        self.frame.fill_rect(&area, WHITE);
        let mut canvas = self.frame.region(area);
        Ok(draw(&mut canvas))
    }

    /// Pick the refresh kind for a push at `now`.
    ///
    /// Returns [`PushKind::Full`] when the full-refresh interval has elapsed
    /// since the last full push (and on the very first call), and counts that
    /// as the new last full push.
    pub fn schedule_push(&mut self, now: Timestamp) -> PushKind {
        let kind = self.cadence.next(now);
        if kind == PushKind::Full {
            info!("Full refresh due");
        }
        kind
    }

    /// Copy the frame into the driver's buffer and refresh the panel.
    pub fn push<D: PanelDriver + ?Sized>(
        &self,
        driver: &mut D,
        kind: PushKind,
    ) -> Result<(), DisplayError> {
        let target = driver.frame_buf();
        let source = self.frame.pixels();
        if target.len() != source.len() {
            return Err(DisplayError::BufferSizeMismatch {
                expected: source.len(),
                actual: target.len(),
            });
        }
        target.copy_from_slice(source);

        match kind {
            PushKind::Full => driver.draw_full(self.full_mode),
            PushKind::Partial => driver.draw_partial(self.partial_mode),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::VirtualDisplay;
    use crate::framebuffer::BLACK;
    use chrono::{FixedOffset, TimeZone};
    use embedded_graphics::{
        pixelcolor::Gray8,
        primitives::{PrimitiveStyle, Rectangle},
    };

    fn compositor() -> DisplayCompositor {
        DisplayCompositor::new(
            100,
            60,
            Duration::from_secs(30 * 60),
            DisplayMode::Gc16,
            DisplayMode::Gl16,
        )
    }

    fn rect(x: i32, y: i32, w: u32, h: u32) -> Rectangle {
        Rectangle::new(Point::new(x, y), Size::new(w, h))
    }

    fn start() -> Timestamp {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2020, 12, 12, 8, 0, 0)
            .single()
            .unwrap()
    }

    #[test]
    fn test_claims_must_be_disjoint_and_inside() {
        let mut c = compositor();
        c.claim_region(RegionOwner::Clock, rect(0, 0, 100, 20)).unwrap();
        // Touching edges do not overlap
        c.claim_region(RegionOwner::Sensor, rect(0, 20, 50, 20)).unwrap();

        assert_eq!(
            c.claim_region(RegionOwner::Forecast, rect(40, 30, 20, 20)),
            Err(CompositorError::Overlap {
                owner: RegionOwner::Forecast,
                other: RegionOwner::Sensor
            })
        );
        assert_eq!(
            c.claim_region(RegionOwner::Clock, rect(60, 40, 10, 10)),
            Err(CompositorError::DuplicateOwner(RegionOwner::Clock))
        );
        assert!(matches!(
            c.claim_region(RegionOwner::Thermostat, rect(90, 50, 20, 20)),
            Err(CompositorError::OutOfBounds { .. })
        ));
        assert_eq!(c.regions().len(), 2);
    }

    #[test]
    fn test_repaint_clears_only_own_region() {
        let mut c = compositor();
        let sensor = rect(0, 0, 50, 60);
        let forecast = rect(50, 0, 50, 60);
        c.claim_region(RegionOwner::Sensor, sensor).unwrap();
        c.claim_region(RegionOwner::Forecast, forecast).unwrap();

        fn fill_all(canvas: &mut RegionCanvas<'_>) {
            let area = canvas.bounding_box();
            area.into_styled(PrimitiveStyle::with_fill(Gray8::new(BLACK)))
                .draw(canvas)
                .ok();
        }
        c.repaint_region(RegionOwner::Sensor, fill_all).unwrap();
        c.repaint_region(RegionOwner::Forecast, fill_all).unwrap();
        assert_eq!(c.frame().ink_count(&forecast), 50 * 60);

        // Repainting the sensor with nothing leaves it blank and the forecast intact
        c.repaint_region(RegionOwner::Sensor, |_| ()).unwrap();
        assert_eq!(c.frame().ink_count(&sensor), 0);
        assert_eq!(c.frame().ink_count(&forecast), 50 * 60);
    }

    #[test]
    fn test_canvas_is_clipped_to_region() {
        let mut c = compositor();
        let area = rect(10, 10, 20, 20);
        c.claim_region(RegionOwner::Clock, area).unwrap();

        c.repaint_region(RegionOwner::Clock, |canvas| {
            // Larger than the region on purpose
            rect(-5, -5, 200, 200)
                .into_styled(PrimitiveStyle::with_fill(Gray8::new(BLACK)))
                .draw(canvas)
                .ok();
        })
        .unwrap();

        assert_eq!(c.frame().ink_count(&area), 400);
        assert_eq!(c.frame().ink_count(&c.frame().bounding_box()), 400);
    }

    #[test]
    fn test_unknown_region_is_an_error() {
        let mut c = compositor();
        assert_eq!(
            c.repaint_region(RegionOwner::Thermostat, |_| ()),
            Err(CompositorError::UnknownRegion(RegionOwner::Thermostat))
        );
    }

    #[test]
    fn test_full_refresh_every_900_ticks_of_2s() {
        let mut c = compositor();
        let t0 = start();
        // Start-up push
        assert_eq!(c.schedule_push(t0), PushKind::Full);

        let mut fulls = Vec::new();
        for tick in 1..=2700i64 {
            let now = t0 + chrono::Duration::seconds(2 * tick);
            if c.schedule_push(now) == PushKind::Full {
                fulls.push(tick);
            }
        }
        assert_eq!(fulls, vec![900, 1800, 2700]);
    }

    #[test]
    fn test_push_copies_frame_and_uses_modes() {
        let mut c = compositor();
        c.claim_region(RegionOwner::Clock, rect(0, 0, 10, 10)).unwrap();
        c.repaint_region(RegionOwner::Clock, |canvas| {
            canvas.clear(Gray8::new(BLACK)).ok();
        })
        .unwrap();

        let mut display = VirtualDisplay::new(100, 60);
        c.push(&mut display, PushKind::Full).unwrap();
        assert_eq!(display.pixels(), c.frame().pixels());
        assert_eq!(display.last_mode(), Some(DisplayMode::Gc16));

        c.push(&mut display, PushKind::Partial).unwrap();
        assert_eq!(display.last_mode(), Some(DisplayMode::Gl16));
        assert_eq!((display.full_pushes(), display.partial_pushes()), (1, 1));
    }

    #[test]
    fn test_push_rejects_wrong_size_driver() {
        let c = compositor();
        let mut display = VirtualDisplay::new(10, 10);
        assert!(matches!(
            c.push(&mut display, PushKind::Partial),
            Err(DisplayError::BufferSizeMismatch {
                expected: 6000,
                actual: 100
            })
        ));
        assert_eq!(display.partial_pushes(), 0);
    }
}
