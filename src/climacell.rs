//! # Climacell (tomorrow.io) forecast client
//!
//! Alternative forecast source using the v3 hourly endpoint, asked for the next
//! five hours. Climacell reports a precipitation probability instead of an
//! amount and its own weather codes, which are mapped onto the yr.no legacy
//! icon numbers so the forecast strip can draw either provider.

use crate::config::Config;
use crate::fetch::{http_client, FetchError, FetchOutcome, Fetcher};
use crate::source::{retain_future, SourceData};
use crate::yr::UNKNOWN_ICON;
use crate::{ForecastRecord, Precipitation, Timestamp};
use chrono::{DateTime, Duration, Utc};
use log::debug;
use serde::Deserialize;
use serde_json::Value;
use tokio::runtime::Handle;

pub const CLIMACELL_URL: &str = "https://api.climacell.co/v3/weather/forecast/hourly";

const FIELDS: &str = "precipitation_probability,temp,precipitation_type,weather_code";

/// Hours of forecast requested
const HORIZON_HOURS: i64 = 5;

#[derive(Debug, Deserialize)]
struct Field<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct Hour {
    temp: Field<f32>,
    precipitation_probability: Option<Field<Option<f32>>>,
    weather_code: Field<Value>,
    observation_time: Field<DateTime<Utc>>,
}

/// Map a Climacell weather code onto a yr legacy icon number.
///
/// Accepts both the v3 string codes (`"rain_light"`) and the numeric codes of
/// the newer API (`4200`).
pub fn legacy_icon(code: &str) -> &'static str {
    match code {
        "freezing_rain_heavy" | "6201" => "48",
        "freezing_rain" | "6001" => "12",
        "freezing_rain_light" | "6200" => "47",
        "freezing_drizzle" | "6000" => "47",
        "ice_pellets_heavy" | "7101" => "48",
        "ice_pellets" | "7000" => "12",
        "ice_pellets_light" | "7102" => "47",
        "snow_heavy" | "5101" => "50",
        "snow" | "5000" => "13",
        "snow_light" | "5100" => "49",
        "flurries" | "5001" => "49",
        "tstorm" | "8000" => "11",
        "rain_heavy" | "4201" => "10",
        "rain" | "4001" => "09",
        "rain_light" | "4200" => "46",
        "drizzle" | "4000" => "46",
        "fog_light" | "2100" => "15",
        "fog" | "2000" => "15",
        "cloudy" | "1001" => "04",
        "mostly_cloudy" | "1102" => "03",
        "partly_cloudy" | "1101" => "02",
        "mostly_clear" | "1100" => "01",
        "clear" | "1000" => "01",
        // Wind only: no precipitation, no clouds
        "3000" | "3001" | "3002" => "01",
        _ => UNKNOWN_ICON,
    }
}

fn code_text(code: &Value) -> String {
    match code {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    }
}

/// Decode an hourly response into future records in `now`'s offset.
pub fn decode(body: &str, now: Timestamp) -> Result<Vec<ForecastRecord>, FetchError> {
    let hours: Vec<Hour> = serde_json::from_str(body)?;
    let total = hours.len();

    let mut records: Vec<ForecastRecord> = hours
        .into_iter()
        .map(|hour| {
            let probability = hour
                .precipitation_probability
                .and_then(|p| p.value)
                .unwrap_or(0.0)
                .round()
                .clamp(0.0, 100.0) as u8;
            ForecastRecord {
                time: hour.observation_time.value.with_timezone(now.offset()),
                temperature_c: hour.temp.value,
                precipitation: Precipitation::ProbabilityPct(probability),
                icon: legacy_icon(&code_text(&hour.weather_code.value)).to_string(),
            }
        })
        .collect();

    retain_future(&mut records, now);
    debug!(
        "Decoded Climacell response: {} hours, {} in future",
        total,
        records.len()
    );
    Ok(records)
}

/// Climacell as a data source
pub struct ClimacellFetcher {
    client: reqwest::Client,
    runtime: Handle,
    url: String,
    latitude: f64,
    longitude: f64,
    api_key: String,
}

impl ClimacellFetcher {
    pub fn new(runtime: Handle, config: &Config, api_key: String) -> Result<Self, FetchError> {
        Ok(ClimacellFetcher {
            client: http_client(&config.weather.user_agent)?,
            runtime,
            url: CLIMACELL_URL.to_string(),
            latitude: config.location.latitude,
            longitude: config.location.longitude,
            api_key,
        })
    }

    async fn download(&self) -> Result<String, FetchError> {
        let end_time = (Utc::now() + Duration::hours(HORIZON_HOURS))
            .format("%Y-%m-%dT%H:%M:%S")
            .to_string();
        let query = [
            ("lat", self.latitude.to_string()),
            ("lon", self.longitude.to_string()),
            ("unit_system", "si".to_string()),
            ("start_time", "now".to_string()),
            ("end_time", end_time),
            ("fields", FIELDS.to_string()),
            ("apikey", self.api_key.clone()),
        ];
        let body = self
            .client
            .get(&self.url)
            .query(&query)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body)
    }
}

impl Fetcher for ClimacellFetcher {
    fn fetch(&self) -> FetchOutcome {
        let body = self.runtime.block_on(self.download())?;
        Ok(SourceData::Forecast(decode(&body, crate::now())?))
    }
}
