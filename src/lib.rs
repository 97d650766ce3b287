//! # Weather Station Core Library
//!
//! This library drives an e-paper information panel on a Raspberry Pi. It pulls
//! data from several independently rate-limited sources (a BME680 environmental
//! sensor, a weather forecast API, a smart-thermostat API), works out today's
//! sunrise and sunset, and composites everything onto one 8-bit grayscale frame
//! buffer that is pushed to the panel with either a full or a partial refresh.
//!
//! ## Design Philosophy
//!
//! ### The render loop never waits on the network
//! - **One loop, many producers**: a single render loop ticks every ~2 seconds.
//!   Data sources are fetched on short-lived blocking workers and report back
//!   over a channel that the loop drains once per tick.
//! - **Optimistic rate limiting**: a source's refresh timestamp is bumped when a
//!   fetch is dispatched, not when it completes, so a slow or failing API is never
//!   hammered faster than its configured interval.
//! - **Failure isolation**: a failed fetch only turns its own panel region into an
//!   error message. Nothing a data source does can stop the loop.
//!
//! ### E-paper friendly rendering
//! - **Disjoint regions**: every panel owns one rectangle of the frame buffer and
//!   clears it before painting, so stale pixels never bleed through.
//! - **Draw once**: fresh data is painted exactly once and then dropped; unchanged
//!   regions keep their pixels.
//! - **Ghosting control**: partial refreshes every tick, a full refresh every
//!   30 minutes to wipe accumulated grey-level drift.
//!
//! ## Data Flow
//! 1. [`main_loop::MainLoop`] drains completions and asks the
//!    [`scheduler::RefreshScheduler`] which sources are due
//! 2. Due sources run their [`fetch::Fetcher`] on a background worker
//! 3. Outcomes land in each [`source::DataSource`]
//! 4. Panels repaint their regions of the [`compositor::DisplayCompositor`]
//! 5. The compositor pushes the frame to a [`display::PanelDriver`]
//!
//! ## Core Types
//! - [`ForecastRecord`]: one dated forecast entry
//! - [`SensorReading`]: the latest indoor sensor sample
//! - [`ZoneReading`]: one thermostat zone

use chrono::{DateTime, FixedOffset, Local};

// Module declarations
pub mod climacell;
pub mod compositor;
pub mod config;
pub mod display;
pub mod fetch;
pub mod framebuffer;
pub mod icons;
pub mod layout;
pub mod main_loop;
pub mod panels;
pub mod renderer;
pub mod scheduler;
pub mod sensor;
pub mod source;
pub mod sun;
pub mod tado;
pub mod yr;

#[cfg(test)]
mod tests;

/// Timezone-aware instant used throughout the crate.
///
/// A fixed offset keeps the type concrete while still comparing correctly
/// against timestamps decoded from UTC API responses.
pub type Timestamp = DateTime<FixedOffset>;

/// Current wall-clock time in the local zone.
pub fn now() -> Timestamp {
    Local::now().fixed_offset()
}

/// Precipitation as reported by the forecast provider.
///
/// yr.no reports an expected amount for the next hour, Climacell reports a
/// probability. The panel shows whichever one the provider gave.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Precipitation {
    /// Expected precipitation in millimetres
    AmountMm(f32),
    /// Probability of precipitation in percent (0-100)
    ProbabilityPct(u8),
}

/// A single forecast entry.
///
/// # Example
/// ```
/// use chrono::DateTime;
/// use weather_station_lib::{ForecastRecord, Precipitation};
///
/// let record = ForecastRecord {
///     time: DateTime::parse_from_rfc3339("2020-12-12T18:00:00+01:00").unwrap(),
///     temperature_c: 8.0,
///     precipitation: Precipitation::AmountMm(0.4),
///     icon: "46".to_string(),
/// };
///
/// assert_eq!(record.icon, "46");
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ForecastRecord {
    /// Start of the forecast period
    pub time: Timestamp,
    /// Air temperature in °C
    pub temperature_c: f32,
    /// Rain/snow expectation for the period
    pub precipitation: Precipitation,
    /// Legacy yr.no icon number ("01".."50"), without a day/night suffix
    pub icon: String,
}

/// Latest sample from the indoor environmental sensor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorReading {
    /// Calibrated temperature in °C
    pub temperature_c: f32,
    /// Relative humidity in percent
    pub humidity_pct: f32,
    /// Gas resistance in ohms, when the sensor reported one
    pub gas_resistance_ohm: Option<f32>,
    /// True once the gas heater has reached its target temperature
    pub heat_stable: bool,
}

/// Current state of one thermostat zone.
#[derive(Clone, Debug, PartialEq)]
pub struct ZoneReading {
    /// Zone name as configured in the thermostat app
    pub name: String,
    /// Measured inside temperature in °C
    pub current_c: Option<f32>,
    /// Target temperature in °C; `None` when heating is off
    pub target_c: Option<f32>,
}
