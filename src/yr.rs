//! # yr.no forecast client
//!
//! Downloads the hourly `locationforecast/2.0/compact` feed of the Norwegian
//! Meteorological Institute and turns it into [`ForecastRecord`]s.
//!
//! ## Decoding
//! - Only timeseries entries with a `next_1_hours` block are usable (the
//!   feed switches to 6-hour blocks a few days out); the first `limit` of
//!   those are kept
//! - Air temperature is truncated to whole degrees
//! - Symbol codes (`"partlycloudy_night"`) become legacy yr icon numbers
//!   (`"03"`); the panel adds its own day/night suffix
//! - Entries not strictly after "now" are dropped; that is not an error
//!
//! The service requires an identifying User-Agent and answers 403 without one.

use crate::config::Config;
use crate::fetch::{http_client, FetchError, FetchOutcome, Fetcher};
use crate::source::{retain_future, SourceData};
use crate::{ForecastRecord, Precipitation, Timestamp};
use chrono::{DateTime, Utc};
use log::debug;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use tokio::runtime::Handle;

pub const YR_URL: &str = "https://api.met.no/weatherapi/locationforecast/2.0/compact";

/// Icon used for symbol codes missing from the legacy table
pub const UNKNOWN_ICON: &str = "unknown_weather";

#[derive(Debug, Deserialize)]
struct Document {
    properties: Properties,
}

#[derive(Debug, Deserialize)]
struct Properties {
    timeseries: Vec<Entry>,
}

#[derive(Debug, Deserialize)]
struct Entry {
    time: DateTime<Utc>,
    data: EntryData,
}

#[derive(Debug, Deserialize)]
struct EntryData {
    instant: Instant,
    next_1_hours: Option<NextHour>,
}

#[derive(Debug, Deserialize)]
struct Instant {
    details: InstantDetails,
}

#[derive(Debug, Deserialize)]
struct InstantDetails {
    air_temperature: f32,
}

#[derive(Debug, Deserialize)]
struct NextHour {
    summary: Summary,
    #[serde(default)]
    details: NextHourDetails,
}

#[derive(Debug, Deserialize)]
struct Summary {
    symbol_code: String,
}

#[derive(Debug, Default, Deserialize)]
struct NextHourDetails {
    #[serde(default)]
    precipitation_amount: f32,
}

/// Map a yr symbol code to its legacy icon number.
///
/// `_day`, `_night` and `_polartwilight` variants share a number.
pub fn legacy_icon(symbol_code: &str) -> &'static str {
    let base = symbol_code
        .split_once('_')
        .map_or(symbol_code, |(base, _)| base);

    match base {
        "clearsky" => "01",
        "fair" => "02",
        "partlycloudy" => "03",
        "cloudy" => "04",
        "rainshowers" => "05",
        "rainshowersandthunder" => "06",
        "sleetshowers" => "07",
        "snowshowers" => "08",
        "rain" => "09",
        "heavyrain" => "10",
        "heavyrainandthunder" => "11",
        "sleet" => "12",
        "snow" => "13",
        "snowandthunder" => "14",
        "fog" => "15",
        "sleetshowersandthunder" => "20",
        "snowshowersandthunder" => "21",
        "rainandthunder" => "22",
        "sleetandthunder" => "23",
        "lightrainshowersandthunder" => "24",
        "heavyrainshowersandthunder" => "25",
        // Misspelled like this in the API
        "lightssleetshowersandthunder" => "26",
        "heavysleetshowersandthunder" => "27",
        "lightssnowshowersandthunder" => "28",
        "heavysnowshowersandthunder" => "29",
        "lightrainandthunder" => "30",
        "lightsleetandthunder" => "31",
        "heavysleetandthunder" => "32",
        "lightsnowandthunder" => "33",
        "heavysnowandthunder" => "34",
        "lightrainshowers" => "40",
        "heavyrainshowers" => "41",
        "lightsleetshowers" => "42",
        "heavysleetshowers" => "43",
        "lightsnowshowers" => "44",
        "heavysnowshowers" => "45",
        "lightrain" => "46",
        "lightsleet" => "47",
        "heavysleet" => "48",
        "lightsnow" => "49",
        "heavysnow" => "50",
        _ => UNKNOWN_ICON,
    }
}

/// Decode a compact forecast document into at most `limit` future records,
/// with timestamps in `now`'s offset.
pub fn decode(body: &str, now: Timestamp, limit: usize) -> Result<Vec<ForecastRecord>, FetchError> {
    let document: Document = serde_json::from_str(body)?;
    let total = document.properties.timeseries.len();

    let mut records: Vec<ForecastRecord> = document
        .properties
        .timeseries
        .into_iter()
        .filter_map(|entry| {
            let next = entry.data.next_1_hours?;
            Some(ForecastRecord {
                time: entry.time.with_timezone(now.offset()),
                temperature_c: entry.data.instant.details.air_temperature.trunc(),
                precipitation: Precipitation::AmountMm(next.details.precipitation_amount),
                icon: legacy_icon(&next.summary.symbol_code).to_string(),
            })
        })
        .take(limit)
        .collect();

    retain_future(&mut records, now);
    debug!(
        "Decoded yr.no response: {} entries, {} in future",
        total,
        records.len()
    );
    Ok(records)
}

/// yr.no as a data source
pub struct YrFetcher {
    client: reqwest::Client,
    runtime: Handle,
    url: String,
    latitude: f64,
    longitude: f64,
    altitude: i32,
    limit: usize,
}

impl YrFetcher {
    pub fn new(runtime: Handle, config: &Config) -> Result<Self, FetchError> {
        Ok(YrFetcher {
            client: http_client(&config.weather.user_agent)?,
            runtime,
            url: YR_URL.to_string(),
            latitude: config.location.latitude,
            longitude: config.location.longitude,
            altitude: config.location.altitude,
            limit: config.weather.forecast_hours,
        })
    }

    async fn download(&self) -> Result<String, FetchError> {
        // yr.no asks for at most four decimals
        let query = [
            ("lat", format!("{:.4}", self.latitude)),
            ("lon", format!("{:.4}", self.longitude)),
            ("altitude", self.altitude.to_string()),
        ];
        let body = self
            .client
            .get(&self.url)
            .query(&query)
            .header(ACCEPT, "application/json")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

impl Fetcher for YrFetcher {
    fn fetch(&self) -> FetchOutcome {
        let body = self.runtime.block_on(self.download())?;
        let records = decode(&body, crate::now(), self.limit)?;
        Ok(SourceData::Forecast(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone, Timelike};

    fn entry(time: &str, temp: f32, symbol: Option<(&str, f32)>) -> String {
        let next = symbol
            .map(|(code, mm)| {
                format!(
                    r#","next_1_hours":{{"summary":{{"symbol_code":"{code}"}},"details":{{"precipitation_amount":{mm}}}}}"#
                )
            })
            .unwrap_or_default();
        format!(
            r#"{{"time":"{time}","data":{{"instant":{{"details":{{"air_temperature":{temp}}}}}{next}}}}}"#
        )
    }

    fn document(entries: &[String]) -> String {
        format!(
            r#"{{"type":"Feature","properties":{{"meta":{{}},"timeseries":[{}]}}}}"#,
            entries.join(",")
        )
    }

    fn budapest_now() -> Timestamp {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2020, 12, 12, 16, 30, 0)
            .single()
            .unwrap()
    }

    #[test]
    fn test_legacy_icon_table() {
        assert_eq!(legacy_icon("clearsky_day"), "01");
        assert_eq!(legacy_icon("fair_polartwilight"), "02");
        assert_eq!(legacy_icon("partlycloudy_night"), "03");
        assert_eq!(legacy_icon("lightrain"), "46");
        assert_eq!(legacy_icon("lightssnowshowersandthunder_day"), "28");
        assert_eq!(legacy_icon("volcanic_ash"), UNKNOWN_ICON);
    }

    #[test]
    fn test_decode_keeps_future_hourly_entries() {
        let body = document(&[
            entry("2020-12-12T15:00:00Z", 6.9, Some(("cloudy", 0.0))),
            entry("2020-12-12T16:00:00Z", 5.4, Some(("lightrain", 0.4))),
            entry("2020-12-12T17:00:00Z", -0.7, Some(("fair_night", 0.0))),
            entry("2020-12-18T00:00:00Z", 1.0, None),
        ]);

        let records = decode(&body, budapest_now(), 6).unwrap();
        // 15:00Z is 16:00 local, before now
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.time.hour(), 17);
        assert_eq!(first.time.offset(), budapest_now().offset());
        assert_eq!(first.temperature_c, 5.0);
        assert_eq!(first.precipitation, Precipitation::AmountMm(0.4));
        assert_eq!(first.icon, "46");

        // Truncation, not rounding
        assert_eq!(records[1].temperature_c, 0.0);
        assert_eq!(records[1].icon, "02");
    }

    #[test]
    fn test_limit_applies_before_future_filter() {
        let body = document(&[
            entry("2020-12-12T14:00:00Z", 1.0, Some(("rain", 1.0))),
            entry("2020-12-12T15:00:00Z", 1.0, Some(("rain", 1.0))),
            entry("2020-12-12T16:00:00Z", 1.0, Some(("rain", 1.0))),
            entry("2020-12-12T17:00:00Z", 1.0, Some(("rain", 1.0))),
        ]);
        let records = decode(&body, budapest_now(), 3).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_all_past_is_empty_not_error() {
        let body = document(&[entry("2020-12-12T10:00:00Z", 3.0, Some(("fog", 0.0)))]);
        assert!(decode(&body, budapest_now(), 6).unwrap().is_empty());
    }

    #[test]
    fn test_malformed_body_is_decode_error() {
        assert!(matches!(
            decode("{\"properties\":{}}", budapest_now(), 6),
            Err(FetchError::Decode(_))
        ));
        assert!(matches!(
            decode("<html>503</html>", budapest_now(), 6),
            Err(FetchError::Decode(_))
        ));
    }
}
