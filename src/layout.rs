//! Panel layout: four horizontal bands stacked top to bottom.
//!
//! ```text
//! +------------------------------+
//! |            clock             |  1/3
//! +------------------------------+
//! |     sensor (temp, humidity)  |  11/60
//! +------------------------------+
//! |  forecast strip (columns)    |  17/60
//! +------------------------------+
//! |  thermostat zones            |  rest
//! +------------------------------+
//! ```

use crate::compositor::{CompositorError, DisplayCompositor, RegionOwner};
use embedded_graphics::{prelude::*, primitives::Rectangle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub clock: Rectangle,
    pub sensor: Rectangle,
    pub forecast: Rectangle,
    pub thermostat: Rectangle,
}

impl Layout {
    /// Split a `width`×`height` panel into the four bands
    pub fn for_panel(width: u32, height: u32) -> Self {
        let clock_h = height / 3;
        let sensor_h = height * 11 / 60;
        let forecast_h = height * 17 / 60;
        let thermostat_h = height - clock_h - sensor_h - forecast_h;

        let band = |y: u32, h: u32| Rectangle::new(Point::new(0, y as i32), Size::new(width, h));
        Layout {
            clock: band(0, clock_h),
            sensor: band(clock_h, sensor_h),
            forecast: band(clock_h + sensor_h, forecast_h),
            thermostat: band(clock_h + sensor_h + forecast_h, thermostat_h),
        }
    }

    pub fn regions(&self) -> [(RegionOwner, Rectangle); 4] {
        [
            (RegionOwner::Clock, self.clock),
            (RegionOwner::Sensor, self.sensor),
            (RegionOwner::Forecast, self.forecast),
            (RegionOwner::Thermostat, self.thermostat),
        ]
    }

    /// Claim every band on `compositor`
    pub fn claim_all(&self, compositor: &mut DisplayCompositor) -> Result<(), CompositorError> {
        for (owner, area) in self.regions() {
            compositor.claim_region(owner, area)?;
        }
        Ok(())
    }
}
