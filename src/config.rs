//! # Configuration Management
//!
//! This module handles loading and parsing configuration from the
//! weather-station.toml file. It provides a centralized way to configure the
//! observer location, per-source refresh intervals, the panel geometry and the
//! credentials of the remote data sources.
//!
//! Every section is optional in the file; missing sections and keys fall back
//! to the defaults below (Budapest, 800×600 panel, yr.no forecast).

use crate::display::DisplayMode;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file name, looked up in the working directory
pub const DEFAULT_CONFIG_FILE: &str = "weather-station.toml";

/// Configuration values that load fine but cannot drive the station.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// Latitude outside [-90, 90] or longitude outside [-180, 180]
    #[error("invalid coordinates: latitude {latitude}, longitude {longitude}")]
    Coordinates { latitude: f64, longitude: f64 },

    /// A refresh interval or the tick period is zero
    #[error("refresh interval `{0}` must be greater than zero")]
    ZeroInterval(&'static str),

    /// Panel width or height is zero
    #[error("display dimensions must be non-zero, got {width}x{height}")]
    ZeroDimensions { width: u32, height: u32 },

    /// Climacell selected without an API key
    #[error("weather provider `climacell` requires `climacell_api_key`")]
    MissingApiKey,
}

/// Application configuration loaded from weather-station.toml
#[derive(Debug, Default, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Observer location for the forecast and sunrise/sunset
    pub location: LocationConfig,
    /// Per-source refresh intervals and the render cadence
    pub refresh: RefreshConfig,
    /// Panel geometry and refresh modes
    pub display: DisplayConfig,
    /// Indoor environmental sensor
    pub sensor: SensorConfig,
    /// Forecast provider
    pub weather: WeatherConfig,
    /// Smart thermostat
    pub thermostat: ThermostatConfig,
}

/// Observer location
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LocationConfig {
    /// Latitude in degrees, north positive
    pub latitude: f64,
    /// Longitude in degrees, east positive
    pub longitude: f64,
    /// Altitude above sea level in metres (yr.no uses it for temperature)
    pub altitude: i32,
    /// IANA time zone name, exported as `TZ` when the environment has none
    pub time_zone: String,
}

/// Refresh cadence of the render loop and every data source
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RefreshConfig {
    /// Render loop period in seconds
    pub tick_secs: u64,
    /// Minutes between full (ghost-clearing) refreshes
    pub full_refresh_mins: u64,
    /// Minimum seconds between weather API calls
    pub weather_secs: u64,
    /// Minimum seconds between sensor reads
    pub sensor_secs: u64,
    /// Minimum seconds between thermostat API calls
    pub thermostat_secs: u64,
}

/// Panel geometry and refresh modes
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct DisplayConfig {
    /// Panel width in pixels
    pub width: u32,
    /// Panel height in pixels
    pub height: u32,
    /// Error messages are hard-wrapped at this many characters (0 disables)
    pub error_wrap_width: usize,
    /// Where the virtual display writes its PGM snapshot
    pub snapshot_path: Option<PathBuf>,
    /// Waveform used for full refreshes
    pub full_mode: DisplayMode,
    /// Waveform used for partial refreshes
    pub partial_mode: DisplayMode,
}

/// Indoor environmental sensor
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SensorConfig {
    /// Added to every temperature reading (the board heats the sensor)
    pub temperature_offset: f32,
    /// IIO sysfs directory of the BME680
    pub iio_device: PathBuf,
}

/// Which forecast API feeds the forecast strip
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WeatherProvider {
    Yr,
    Climacell,
}

/// Forecast provider settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct WeatherConfig {
    pub provider: WeatherProvider,
    /// Identifying User-Agent; yr.no rejects anonymous clients
    pub user_agent: String,
    pub climacell_api_key: Option<String>,
    /// Number of hourly entries requested from the provider
    pub forecast_hours: usize,
}

/// Smart thermostat settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ThermostatConfig {
    pub enabled: bool,
    /// Where the OAuth refresh token is kept between runs
    pub token_file: PathBuf,
    /// Zones that are never shown
    pub hidden_zones: Vec<String>,
}

impl Default for LocationConfig {
    fn default() -> Self {
        LocationConfig {
            latitude: 47.5249,
            longitude: 19.0825,
            altitude: 90,
            time_zone: "Europe/Budapest".to_string(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        RefreshConfig {
            tick_secs: 2,
            full_refresh_mins: 30,
            weather_secs: 50 * 60,
            sensor_secs: 5,
            thermostat_secs: 10 * 60,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        DisplayConfig {
            width: 800,
            height: 600,
            error_wrap_width: 40,
            snapshot_path: None,
            full_mode: DisplayMode::Gc16,
            partial_mode: DisplayMode::Gl16,
        }
    }
}

impl Default for SensorConfig {
    fn default() -> Self {
        SensorConfig {
            temperature_offset: -4.0,
            iio_device: PathBuf::from("/sys/bus/iio/devices/iio:device0"),
        }
    }
}

impl Default for WeatherConfig {
    fn default() -> Self {
        WeatherConfig {
            provider: WeatherProvider::Yr,
            user_agent: "weather-station/1.0 https://github.com/matyasf/weather-station"
                .to_string(),
            climacell_api_key: None,
            forecast_hours: 6,
        }
    }
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        ThermostatConfig {
            enabled: false,
            token_file: PathBuf::from("tado-token.json"),
            hidden_zones: vec!["Közlekedő".to_string()],
        }
    }
}

impl RefreshConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }

    pub fn full_refresh(&self) -> Duration {
        Duration::from_secs(self.full_refresh_mins * 60)
    }

    pub fn weather(&self) -> Duration {
        Duration::from_secs(self.weather_secs)
    }

    pub fn sensor(&self) -> Duration {
        Duration::from_secs(self.sensor_secs)
    }

    pub fn thermostat(&self) -> Duration {
        Duration::from_secs(self.thermostat_secs)
    }
}

impl Config {
    /// Load configuration from weather-station.toml
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load() -> Self {
        Self::load_from_path(DEFAULT_CONFIG_FILE)
    }

    /// Load configuration from specified path
    /// Falls back to default configuration if file doesn't exist or is invalid
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<Config>(&contents) {
                Ok(config) => {
                    info!(
                        "Loaded configuration from {} ({}, {})",
                        path.display(),
                        config.location.latitude,
                        config.location.longitude
                    );
                    config
                }
                Err(e) => {
                    warn!("Invalid config file format in {}: {}", path.display(), e);
                    warn!("Using default configuration (Budapest)");
                    Self::default()
                }
            },
            Err(_) => {
                info!(
                    "No config file at {}, using default configuration (Budapest)",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Save current configuration to weather-station.toml
    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.save_to_path(DEFAULT_CONFIG_FILE)
    }

    /// Save current configuration to the given path
    pub fn save_to_path<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(&path, contents)?;
        info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Reject values that would make the station misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let loc = &self.location;
        if !(-90.0..=90.0).contains(&loc.latitude) || !(-180.0..=180.0).contains(&loc.longitude) {
            return Err(ConfigError::Coordinates {
                latitude: loc.latitude,
                longitude: loc.longitude,
            });
        }

        let r = &self.refresh;
        let intervals = [
            ("tick_secs", r.tick_secs),
            ("full_refresh_mins", r.full_refresh_mins),
            ("weather_secs", r.weather_secs),
            ("sensor_secs", r.sensor_secs),
            ("thermostat_secs", r.thermostat_secs),
        ];
        if let Some((name, _)) = intervals.into_iter().find(|(_, v)| *v == 0) {
            return Err(ConfigError::ZeroInterval(name));
        }

        if self.display.width == 0 || self.display.height == 0 {
            return Err(ConfigError::ZeroDimensions {
                width: self.display.width,
                height: self.display.height,
            });
        }

        if self.weather.provider == WeatherProvider::Climacell
            && self.weather.climacell_api_key.is_none()
        {
            return Err(ConfigError::MissingApiKey);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.location.latitude, 47.5249);
        assert_eq!(config.location.time_zone, "Europe/Budapest");
        assert_eq!(config.refresh.weather(), Duration::from_secs(3000));
        assert_eq!(config.refresh.full_refresh(), Duration::from_secs(1800));
        assert_eq!(config.sensor.temperature_offset, -4.0);
        assert_eq!(config.display.error_wrap_width, 40);
        assert_eq!(config.display.full_mode, DisplayMode::Gc16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_roundtrip() {
        let config = Config::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_load_nonexistent_file() {
        let config = Config::load_from_path("/nonexistent/path");
        // Should fallback to default
        assert_eq!(config.location.longitude, 19.0825);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[location]\nlatitude = 60.39\nlongitude = 5.32\n\n[display]\npartial_mode = \"DU\""
        )
        .unwrap();

        let config = Config::load_from_path(file.path());
        assert_eq!(config.location.latitude, 60.39);
        assert_eq!(config.location.altitude, 90);
        assert_eq!(config.display.partial_mode, DisplayMode::Du);
        assert_eq!(config.refresh.sensor_secs, 5);
    }

    #[test]
    fn test_invalid_file_falls_back_to_default() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[location\nlatitude = ").unwrap();
        assert_eq!(Config::load_from_path(file.path()), Config::default());
    }

    #[test]
    fn test_save_to_path_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("station.toml");

        let mut config = Config::default();
        config.weather.provider = WeatherProvider::Climacell;
        config.weather.climacell_api_key = Some("key".to_string());
        config.save_to_path(&path).unwrap();

        let loaded = Config::load_from_path(&path);
        assert_eq!(loaded.weather.provider, WeatherProvider::Climacell);
        assert!(loaded.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.location.latitude = 91.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Coordinates { .. })
        ));

        let mut config = Config::default();
        config.refresh.sensor_secs = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroInterval("sensor_secs"))
        );

        let mut config = Config::default();
        config.display.height = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroDimensions { .. })
        ));

        let mut config = Config::default();
        config.weather.provider = WeatherProvider::Climacell;
        assert_eq!(config.validate(), Err(ConfigError::MissingApiKey));
    }
}
