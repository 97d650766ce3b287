use super::{draw_text, unexpected, SourcePanel};
use crate::compositor::{RegionCanvas, RegionOwner};
use crate::source::SourceData;
use crate::{SensorReading, Timestamp};
use embedded_graphics::prelude::*;

/// Indoor temperature and humidity in large digits, gas resistance beside.
#[derive(Debug, Default, Clone, Copy)]
pub struct SensorPanel;

impl SensorPanel {
    fn gas_line(reading: &SensorReading) -> String {
        match (reading.heat_stable, reading.gas_resistance_ohm) {
            (true, Some(ohm)) => format!("gas: {:.1} kOhm", ohm / 1000.0),
            (true, None) => "gas: n/a".to_string(),
            (false, _) => "gas: heater warming up".to_string(),
        }
    }
}

impl SourcePanel for SensorPanel {
    fn owner(&self) -> RegionOwner {
        RegionOwner::Sensor
    }

    fn paint(&mut self, canvas: &mut RegionCanvas<'_>, data: &SourceData, _now: Timestamp) -> usize {
        let SourceData::Sensor(reading) = data else {
            return unexpected(self.owner(), data);
        };

        draw_text(
            canvas,
            &format!("{:.1}°C", reading.temperature_c),
            Point::new(10, 14),
            4,
        );
        draw_text(
            canvas,
            &format!("{:.0}%", reading.humidity_pct),
            Point::new(300, 14),
            4,
        );
        draw_text(canvas, &Self::gas_line(reading), Point::new(540, 14), 1);
        1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gas_line_waits_for_heater() {
        let mut reading = SensorReading {
            temperature_c: 21.5,
            humidity_pct: 45.0,
            gas_resistance_ohm: Some(52_300.0),
            heat_stable: false,
        };
        assert_eq!(SensorPanel::gas_line(&reading), "gas: heater warming up");

        reading.heat_stable = true;
        assert_eq!(SensorPanel::gas_line(&reading), "gas: 52.3 kOhm");

        reading.gas_resistance_ohm = None;
        assert_eq!(SensorPanel::gas_line(&reading), "gas: n/a");
    }
}
