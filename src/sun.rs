//! Sunrise & sunset from the sunrise equation (closed form, no ephemeris).
//!
//! Accuracy: about a minute at mid latitudes, which is plenty for picking
//! day/night forecast icons and placing sunrise/sunset markers on the strip.
//! References: "Sunrise equation" (Wikipedia) and Duffett-Smith & Zwart,
//! *Practical Astronomy with your Calculator or Spreadsheet*, 4th ed. (2011)
//! for the calendar → Julian Day conversion.
//!
//! Results are always for the calendar date of the instant passed in. Near
//! local midnight that means a forecast from "yesterday evening" is compared
//! against today's sunrise/sunset, which can misclassify day and night for a
//! few entries. This is a known limitation and intentionally left as is.

use crate::Timestamp;
use chrono::{Datelike, Duration, FixedOffset, NaiveDate, TimeZone};
use core::f64::consts::PI;
use thiserror::Error;

/// Julian date of 2000-01-01 12:00 UT.
pub const J2000: f64 = 2_451_545.0;

/// Earth's axial tilt in degrees.
const EARTH_TILT_DEG: f64 = 23.44;

/// Solar altitude of sunrise/sunset: the sun's centre 0.83° below the horizon
/// (atmospheric refraction plus the radius of the solar disc).
const SUN_DISC_DEG: f64 = -0.83;

/// Today's sunrise and sunset as local civil time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunTimes {
    pub sunrise: Timestamp,
    pub sunset: Timestamp,
}

impl SunTimes {
    /// True while the sun is strictly above the horizon at `time`.
    pub fn is_daylight(&self, time: Timestamp) -> bool {
        self.sunrise < time && time < self.sunset
    }
}

/// Days on which the sunrise equation has no solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SunError {
    /// The sun stays above the horizon all day (cos ω < -1)
    #[error("polar day: the sun does not set")]
    PolarDay,

    /// The sun stays below the horizon all day (cos ω > 1)
    #[error("polar night: the sun does not rise")]
    PolarNight,

    /// The computed instant does not fit chrono's calendar range
    #[error("sun time out of calendar range")]
    OutOfRange,
}

impl SunError {
    /// Daylight classification to use when there is no sunrise/sunset.
    pub fn is_daylight(&self) -> bool {
        matches!(self, SunError::PolarDay)
    }
}

/// Convert a proleptic Gregorian calendar date to a Julian Day (at 0h UT).
///
/// Dates before 1582-10-15 are treated as Julian calendar dates (no leap
/// correction), matching the historical switch to the Gregorian calendar.
pub fn julian_day(year: i32, month: u32, day: u32) -> f64 {
    // ---------- 1. Jan/Feb belong to the previous year ----------
    let (year_p, month_p) = if month <= 2 {
        (year - 1, month as i32 + 12)
    } else {
        (year, month as i32)
    };

    // ---------- 2. Gregorian leap correction from 1582-10-15 ----------
    let before_gregorian =
        year < 1582 || (year == 1582 && (month < 10 || (month == 10 && day < 15)));
    let b = if before_gregorian {
        0.0
    } else {
        let a = (year_p as f64 / 100.0).trunc();
        2.0 - a + (a / 4.0).trunc()
    };

    // ---------- 3. Day count ----------
    let c = if year_p < 0 {
        (365.25 * year_p as f64 - 0.75).trunc()
    } else {
        (365.25 * year_p as f64).trunc()
    };
    let d = (30.6001 * (month_p + 1) as f64).trunc();

    b + c + d + day as f64 + 1_720_994.5
}

/// Sunrise and sunset on `date` for an observer at `lat_deg`/`lon_deg`
/// (north and east positive), expressed in the `offset` time zone.
pub fn sun_times_on(
    lat_deg: f64,
    lon_deg: f64,
    date: NaiveDate,
    offset: FixedOffset,
) -> Result<SunTimes, SunError> {
    let (transit, omega_deg) = transit_and_hour_angle(lat_deg, lon_deg, date)?;

    Ok(SunTimes {
        sunrise: julian_to_civil(transit - omega_deg / 360.0, offset)?,
        sunset: julian_to_civil(transit + omega_deg / 360.0, offset)?,
    })
}

/// Sunrise and sunset for the calendar day of `now`, in `now`'s offset.
///
/// Recomputed on every call; this is cheap and keeps the function stateless.
pub fn sun_times_today(lat_deg: f64, lon_deg: f64, now: Timestamp) -> Result<SunTimes, SunError> {
    sun_times_on(lat_deg, lon_deg, now.date_naive(), *now.offset())
}

/// Julian date of solar transit and the sunrise hour angle ω in degrees.
fn transit_and_hour_angle(
    lat_deg: f64,
    lon_deg: f64,
    date: NaiveDate,
) -> Result<(f64, f64), SunError> {
    let jd = julian_day(date.year(), date.month(), date.day());

    // ---------- 1. Mean solar noon ----------
    let n = jd - J2000 + 0.0008;
    let j_star = n - lon_deg / 360.0;

    // ---------- 2. Mean anomaly, equation of centre, ecliptic longitude ----------
    let m_deg = (357.5291 + 0.985_600_28 * j_star).rem_euclid(360.0);
    let m = m_deg.to_radians();
    let c = 1.9148 * m.sin() + 0.0200 * (2.0 * m).sin() + 0.0003 * (3.0 * m).sin();
    let lambda = ((m_deg + c + 180.0 + 102.9372) % 360.0).to_radians();

    // ---------- 3. Solar transit and declination ----------
    let transit = J2000 + 0.5 + j_star + 0.0053 * m.sin() - 0.0069 * (2.0 * lambda).sin();
    let sin_delta = lambda.sin() * EARTH_TILT_DEG.to_radians().sin();
    let delta = sin_delta.asin();

    // ---------- 4. Hour angle ----------
    let lat = lat_deg.to_radians();
    let cos_omega = (SUN_DISC_DEG.to_radians().sin() - lat.sin() * delta.sin())
        / (lat.cos() * delta.cos());

    if cos_omega < -1.0 {
        return Err(SunError::PolarDay);
    }
    if cos_omega > 1.0 {
        return Err(SunError::PolarNight);
    }

    Ok((transit, cos_omega.acos() * 180.0 / PI))
}

/// Turn a Julian date into civil time at `offset`.
fn julian_to_civil(julian: f64, offset: FixedOffset) -> Result<Timestamp, SunError> {
    // Julian dates start at noon, hence the half day
    let days = julian - J2000 + 0.5 + offset.local_minus_utc() as f64 / 86_400.0;
    let millis = (days * 86_400_000.0).round() as i64;

    let epoch = NaiveDate::from_ymd_opt(2000, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .ok_or(SunError::OutOfRange)?;
    let local = epoch
        .checked_add_signed(Duration::milliseconds(millis))
        .ok_or(SunError::OutOfRange)?;

    offset
        .from_local_datetime(&local)
        .single()
        .ok_or(SunError::OutOfRange)
}
