//! # Environmental sensor
//!
//! The BME680 is read through the Linux IIO subsystem (`bme680` kernel
//! driver), which exposes each channel as a sysfs file:
//!
//! - `in_temp_input`: milli-degrees Celsius
//! - `in_humidityrelative_input`: milli-percent relative humidity
//! - `in_resistance_input`: gas resistance in ohms; only readable once the
//!   gas heater has reached its target temperature
//!
//! [`SensorFetcher`] wraps any [`SensorDriver`] as a data source and applies
//! the temperature calibration offset.

use crate::fetch::{FetchOutcome, Fetcher};
use crate::source::SourceData;
use crate::SensorReading;
use log::debug;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SensorError {
    #[error("sensor read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("sensor value {value:?} in {} is not a number", path.display())]
    Parse { path: PathBuf, value: String },
}

/// Pulls the latest sample from a sensor.
pub trait SensorDriver: Send {
    fn read_latest(&mut self) -> Result<SensorReading, SensorError>;
}

/// BME680 behind the kernel IIO driver
#[derive(Debug, Clone)]
pub struct IioSensor {
    device: PathBuf,
}

impl IioSensor {
    pub fn new(device: impl Into<PathBuf>) -> Self {
        IioSensor {
            device: device.into(),
        }
    }

    fn read_channel(&self, channel: &str) -> Result<f32, SensorError> {
        let path = self.device.join(channel);
        read_number(&path)
    }
}

fn read_number(path: &Path) -> Result<f32, SensorError> {
    let raw = fs::read_to_string(path).map_err(|source| SensorError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value = raw.trim();
    value.parse::<f32>().map_err(|_| SensorError::Parse {
        path: path.to_path_buf(),
        value: value.to_string(),
    })
}

impl SensorDriver for IioSensor {
    fn read_latest(&mut self) -> Result<SensorReading, SensorError> {
        let temperature_c = self.read_channel("in_temp_input")? / 1000.0;
        let humidity_pct = self.read_channel("in_humidityrelative_input")? / 1000.0;

        // The driver refuses the gas channel until the heater is stable
        let gas = match self.read_channel("in_resistance_input") {
            Ok(ohm) => Some(ohm),
            Err(e) => {
                debug!("Gas resistance not available yet: {}", e);
                None
            }
        };

        Ok(SensorReading {
            temperature_c,
            humidity_pct,
            gas_resistance_ohm: gas,
            heat_stable: gas.is_some(),
        })
    }
}

/// Fixed reading, used with the virtual display
#[derive(Debug, Clone, Copy)]
pub struct StaticSensor {
    pub reading: SensorReading,
}

impl Default for StaticSensor {
    fn default() -> Self {
        StaticSensor {
            reading: SensorReading {
                temperature_c: 21.5,
                humidity_pct: 45.0,
                gas_resistance_ohm: None,
                heat_stable: false,
            },
        }
    }
}

impl SensorDriver for StaticSensor {
    fn read_latest(&mut self) -> Result<SensorReading, SensorError> {
        Ok(self.reading)
    }
}

/// A sensor driver as a data source
pub struct SensorFetcher {
    driver: Mutex<Box<dyn SensorDriver>>,
    temperature_offset: f32,
}

impl SensorFetcher {
    pub fn new(driver: Box<dyn SensorDriver>, temperature_offset: f32) -> Self {
        SensorFetcher {
            driver: Mutex::new(driver),
            temperature_offset,
        }
    }
}

impl Fetcher for SensorFetcher {
    fn fetch(&self) -> FetchOutcome {
        // A panicked read poisons the lock; the driver itself is still usable
        let mut driver = self
            .driver
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut reading = driver.read_latest()?;
        reading.temperature_c += self.temperature_offset;
        Ok(SourceData::Sensor(reading))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use tempfile::TempDir;

    fn device(files: &[(&str, &str)]) -> TempDir {
        let dir = tempfile::tempdir().unwrap();
        for (name, value) in files {
            fs::write(dir.path().join(name), value).unwrap();
        }
        dir
    }

    #[test]
    fn test_reads_iio_channels() {
        let dir = device(&[
            ("in_temp_input", "25120\n"),
            ("in_humidityrelative_input", "41250\n"),
            ("in_resistance_input", "53210\n"),
        ]);
        let reading = IioSensor::new(dir.path()).read_latest().unwrap();

        assert!((reading.temperature_c - 25.12).abs() < 1e-4);
        assert!((reading.humidity_pct - 41.25).abs() < 1e-4);
        assert_eq!(reading.gas_resistance_ohm, Some(53210.0));
        assert!(reading.heat_stable);
    }

    #[test]
    fn test_missing_gas_means_heater_not_stable() {
        let dir = device(&[
            ("in_temp_input", "20000"),
            ("in_humidityrelative_input", "50000"),
        ]);
        let reading = IioSensor::new(dir.path()).read_latest().unwrap();
        assert_eq!(reading.gas_resistance_ohm, None);
        assert!(!reading.heat_stable);
    }

    #[test]
    fn test_bad_values_are_errors() {
        let dir = device(&[("in_temp_input", "warm")]);
        assert!(matches!(
            IioSensor::new(dir.path()).read_latest(),
            Err(SensorError::Parse { .. })
        ));

        let empty = device(&[]);
        assert!(matches!(
            IioSensor::new(empty.path()).read_latest(),
            Err(SensorError::Io { .. })
        ));
    }

    #[test]
    fn test_fetcher_applies_offset() {
        let fetcher = SensorFetcher::new(Box::new(StaticSensor::default()), -4.0);
        match fetcher.fetch().unwrap() {
            SourceData::Sensor(reading) => assert_eq!(reading.temperature_c, 17.5),
            other => panic!("unexpected data {other:?}"),
        }
    }

    #[test]
    fn test_fetcher_surfaces_sensor_errors() {
        let empty = device(&[]);
        let fetcher = SensorFetcher::new(Box::new(IioSensor::new(empty.path())), 0.0);
        assert!(matches!(fetcher.fetch(), Err(FetchError::Sensor(_))));
    }
}
