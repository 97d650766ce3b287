use super::{draw_text, unexpected, SourcePanel};
use crate::compositor::{RegionCanvas, RegionOwner};
use crate::source::SourceData;
use crate::{Timestamp, ZoneReading};
use embedded_graphics::prelude::*;

/// One column per thermostat zone: name, current and target temperature.
#[derive(Debug, Clone, Copy)]
pub struct ThermostatPanel {
    column_width: u32,
}

impl ThermostatPanel {
    pub fn new(column_width: u32) -> Self {
        ThermostatPanel {
            column_width: column_width.max(1),
        }
    }

    /// "21.0°C", or "N/A" when the zone reports nothing
    fn temperature(value: Option<f32>) -> String {
        value.map_or_else(|| "N/A".to_string(), |t| format!("{:.1}°C", t))
    }

    fn paint_zone(canvas: &mut RegionCanvas<'_>, zone: &ZoneReading, x: i32) {
        draw_text(canvas, &zone.name, Point::new(x + 4, 4), 1);
        draw_text(canvas, &Self::temperature(zone.current_c), Point::new(x + 4, 30), 2);
        draw_text(
            canvas,
            &format!("{} min", Self::temperature(zone.target_c)),
            Point::new(x + 4, 76),
            1,
        );
    }
}

impl Default for ThermostatPanel {
    fn default() -> Self {
        Self::new(195)
    }
}

impl SourcePanel for ThermostatPanel {
    fn owner(&self) -> RegionOwner {
        RegionOwner::Thermostat
    }

    fn paint(&mut self, canvas: &mut RegionCanvas<'_>, data: &SourceData, _now: Timestamp) -> usize {
        let SourceData::Thermostat(zones) = data else {
            return unexpected(self.owner(), data);
        };

        let capacity = (canvas.bounding_box().size.width / self.column_width) as usize;
        let mut drawn = 0;
        for (i, zone) in zones.iter().take(capacity).enumerate() {
            Self::paint_zone(canvas, zone, (i as u32 * self.column_width) as i32);
            drawn += 1;
        }
        drawn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heating_off_shows_na() {
        assert_eq!(ThermostatPanel::temperature(None), "N/A");
        assert_eq!(ThermostatPanel::temperature(Some(20.0)), "20.0°C");
    }
}
