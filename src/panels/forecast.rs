use super::{draw_text, text_width, unexpected, SourcePanel};
use crate::compositor::{RegionCanvas, RegionOwner};
use crate::icons::{IconPainter, SUNRISE, SUNSET, UMBRELLA};
use crate::source::SourceData;
use crate::sun::{self, SunError, SunTimes};
use crate::{ForecastRecord, Precipitation, Timestamp};
use embedded_graphics::prelude::*;

const ICON_SIZE: u32 = 64;
const SMALL_ICON_SIZE: u32 = 20;

/// Icons that exist in a day and a night variant
const DAY_NIGHT_ICONS: [&str; 3] = ["01", "02", "03"];

/// Icon name for `icon` at a time that is (or is not) in daylight.
///
/// Only clear and partly cloudy skies look different at night; every other
/// code is returned unchanged.
pub fn day_night_icon(icon: &str, daylight: bool) -> String {
    if DAY_NIGHT_ICONS.contains(&icon) {
        format!("{}{}", icon, if daylight { 'd' } else { 'n' })
    } else {
        icon.to_string()
    }
}

/// One column of the strip
#[derive(Debug, Clone, PartialEq)]
enum Column<'a> {
    Forecast { record: &'a ForecastRecord, icon: String },
    Sunrise(Timestamp),
    Sunset(Timestamp),
}

/// Horizontal strip of forecast columns with sunrise/sunset markers.
pub struct ForecastPanel {
    latitude: f64,
    longitude: f64,
    column_width: u32,
    icons: Box<dyn IconPainter>,
}

impl ForecastPanel {
    pub fn new(latitude: f64, longitude: f64, icons: Box<dyn IconPainter>) -> Self {
        ForecastPanel {
            latitude,
            longitude,
            column_width: 130,
            icons,
        }
    }

    /// Interleave today's sunrise/sunset markers with the forecast records.
    ///
    /// A marker goes right before the first record after it, and only while it
    /// is still ahead of `now`. Without a sunrise or sunset (polar day/night)
    /// there are no markers and every record gets the same variant.
    fn columns<'a>(
        records: &'a [ForecastRecord],
        sun: &Result<SunTimes, SunError>,
        now: Timestamp,
    ) -> Vec<Column<'a>> {
        let mut columns = Vec::with_capacity(records.len() + 2);
        let mut sunrise_placed = false;
        let mut sunset_placed = false;

        for record in records {
            if let Ok(times) = sun {
                if !sunrise_placed && now < times.sunrise && times.sunrise < record.time {
                    columns.push(Column::Sunrise(times.sunrise));
                    sunrise_placed = true;
                }
                if !sunset_placed && now < times.sunset && times.sunset < record.time {
                    columns.push(Column::Sunset(times.sunset));
                    sunset_placed = true;
                }
            }

            let daylight = match sun {
                Ok(times) => times.is_daylight(record.time),
                Err(e) => e.is_daylight(),
            };
            columns.push(Column::Forecast {
                record,
                icon: day_night_icon(&record.icon, daylight),
            });
        }
        columns
    }

    fn paint_forecast(
        &self,
        canvas: &mut RegionCanvas<'_>,
        x: i32,
        record: &ForecastRecord,
        icon: &str,
    ) {
        let w = self.column_width;
        self.centered(canvas, &record.time.format("%H:%M").to_string(), x, 2);
        self.icons.paint(
            canvas,
            icon,
            Point::new(x + (w.saturating_sub(ICON_SIZE) / 2) as i32, 24),
            ICON_SIZE,
        );
        self.centered(
            canvas,
            &format!("{}°C", record.temperature_c.round() as i32),
            x,
            92,
        );

        match record.precipitation {
            Precipitation::AmountMm(mm) if mm > 0.0 => {
                let text = format!("{}mm", mm);
                let total = SMALL_ICON_SIZE + 4 + text_width(&text, 1);
                let left = x + (w.saturating_sub(total) / 2) as i32;
                self.icons
                    .paint(canvas, UMBRELLA, Point::new(left, 116), SMALL_ICON_SIZE);
                draw_text(
                    canvas,
                    &text,
                    Point::new(left + SMALL_ICON_SIZE as i32 + 4, 116),
                    1,
                );
            }
            Precipitation::AmountMm(_) => {}
            Precipitation::ProbabilityPct(pct) => {
                self.centered(canvas, &format!("{}%", pct), x, 116);
            }
        }
    }

    fn paint_marker(&self, canvas: &mut RegionCanvas<'_>, x: i32, icon: &str, time: Timestamp) {
        self.centered(canvas, &time.format("%H:%M").to_string(), x, 2);
        self.icons.paint(
            canvas,
            icon,
            Point::new(x + (self.column_width.saturating_sub(ICON_SIZE) / 2) as i32, 24),
            ICON_SIZE,
        );
    }

    /// Text centred horizontally in the column starting at `x`
    fn centered(&self, canvas: &mut RegionCanvas<'_>, text: &str, x: i32, y: i32) {
        let offset = self.column_width.saturating_sub(text_width(text, 1)) / 2;
        draw_text(canvas, text, Point::new(x + offset as i32, y), 1);
    }
}

impl SourcePanel for ForecastPanel {
    fn owner(&self) -> RegionOwner {
        RegionOwner::Forecast
    }

    /// Returns the number of forecast columns drawn; markers are not counted.
    fn paint(&mut self, canvas: &mut RegionCanvas<'_>, data: &SourceData, now: Timestamp) -> usize {
        let SourceData::Forecast(records) = data else {
            return unexpected(self.owner(), data);
        };

        // Recomputed for today on every paint
        let sun = sun::sun_times_today(self.latitude, self.longitude, now);
        let capacity = (canvas.bounding_box().size.width / self.column_width) as usize;

        let mut drawn = 0;
        for (i, column) in Self::columns(records, &sun, now)
            .into_iter()
            .take(capacity)
            .enumerate()
        {
            let x = (i as u32 * self.column_width) as i32;
            match column {
                Column::Forecast { record, icon } => {
                    self.paint_forecast(canvas, x, record, &icon);
                    drawn += 1;
                }
                Column::Sunrise(time) => self.paint_marker(canvas, x, SUNRISE, time),
                Column::Sunset(time) => self.paint_marker(canvas, x, SUNSET, time),
            }
        }
        drawn
    }
}
