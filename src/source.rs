//! Per-source refresh bookkeeping and display state.
//!
//! A [`DataSource`] is owned by the [`RefreshScheduler`](crate::scheduler::RefreshScheduler)
//! and only ever mutated on the render thread. Fetch workers never touch it;
//! their outcomes arrive as [`Completion`](crate::fetch::Completion) messages
//! and are folded in with [`DataSource::apply`].

use crate::fetch::{FetchOutcome, Fetcher};
use crate::{ForecastRecord, SensorReading, Timestamp, ZoneReading};
use chrono::DateTime;
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;

/// 2000-01-01T00:00:00Z, the "last refreshed" time of a source that never ran
const NEVER_REFRESHED_SECS: i64 = 946_684_800;

/// Index of a source inside its scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(pub(crate) usize);

/// What a successful fetch produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceData {
    Forecast(Vec<ForecastRecord>),
    Sensor(SensorReading),
    Thermostat(Vec<ZoneReading>),
}

impl SourceData {
    /// Number of records carried
    pub fn len(&self) -> usize {
        match self {
            SourceData::Forecast(records) => records.len(),
            SourceData::Sensor(_) => 1,
            SourceData::Thermostat(zones) => zones.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Display state of one source
#[derive(Debug, Clone, PartialEq)]
pub enum SourceState {
    NoData,
    Data(SourceData),
    /// Wrapped, human-readable failure message
    Error(String),
}

/// Whether the current state has reached the frame buffer yet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFlag {
    Pending,
    Rendered,
}

/// Something a panel has not painted yet
#[derive(Debug, Clone, PartialEq)]
pub enum Unrendered {
    Data(SourceData),
    Error(String),
}

/// What a failed fetch does to the source's region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorDisplay {
    /// Replace the region with the error text
    #[default]
    Panel,
    /// Only log; the region keeps showing the last good data
    LogOnly,
}

pub struct DataSource {
    name: String,
    min_interval: Duration,
    last_refresh: Timestamp,
    state: SourceState,
    render: RenderFlag,
    in_flight: bool,
    on_error: ErrorDisplay,
    fetcher: Arc<dyn Fetcher>,
}

impl DataSource {
    pub fn new(name: impl Into<String>, min_interval: Duration, fetcher: Arc<dyn Fetcher>) -> Self {
        DataSource {
            name: name.into(),
            min_interval,
            last_refresh: never_refreshed(),
            state: SourceState::NoData,
            render: RenderFlag::Rendered,
            in_flight: false,
            on_error: ErrorDisplay::Panel,
            fetcher,
        }
    }

    pub fn with_error_display(mut self, on_error: ErrorDisplay) -> Self {
        self.on_error = on_error;
        self
    }

    pub fn error_display(&self) -> ErrorDisplay {
        self.on_error
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn last_refresh(&self) -> Timestamp {
        self.last_refresh
    }

    pub fn state(&self) -> &SourceState {
        &self.state
    }

    pub fn render_flag(&self) -> RenderFlag {
        self.render
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    pub(crate) fn fetcher(&self) -> Arc<dyn Fetcher> {
        Arc::clone(&self.fetcher)
    }

    /// True once `min_interval` has elapsed since the last dispatch.
    ///
    /// A clock that went backwards counts as "not yet".
    pub fn is_due(&self, now: Timestamp) -> bool {
        match (now - self.last_refresh).to_std() {
            Ok(elapsed) => elapsed >= self.min_interval,
            Err(_) => false,
        }
    }

    /// Record a dispatch: the refresh time moves even if the fetch later fails.
    pub(crate) fn mark_dispatched(&mut self, now: Timestamp) {
        self.last_refresh = now;
        self.in_flight = true;
    }

    /// Fold a fetch outcome into the display state.
    ///
    /// Both success and failure replace whatever was there before and mark it
    /// for painting, except a failure under [`ErrorDisplay::LogOnly`], which
    /// leaves state and render flag alone. Failure text is
    /// `":( <name>: <error>"` wrapped to `wrap_width` characters.
    pub fn apply(&mut self, outcome: FetchOutcome, wrap_width: usize) {
        self.in_flight = false;
        match outcome {
            Ok(data) => {
                info!("{}: fetched {} record(s)", self.name, data.len());
                self.state = SourceState::Data(data);
            }
            Err(e) if self.on_error == ErrorDisplay::LogOnly => {
                warn!("{}: fetch failed, keeping last reading: {}", self.name, e);
                return;
            }
            Err(e) => {
                warn!("{}: fetch failed: {}", self.name, e);
                let message = format!(":( {}: {}", self.name, e);
                self.state = SourceState::Error(wrap_error(&message, wrap_width));
            }
        }
        self.render = RenderFlag::Pending;
    }

    /// Hand out what has not been painted yet, at most once.
    ///
    /// Fresh data is moved out of the source, leaving [`SourceState::NoData`];
    /// an error message stays in place so it keeps describing the region until
    /// the next successful fetch.
    pub fn take_unrendered(&mut self) -> Option<Unrendered> {
        if self.render == RenderFlag::Rendered {
            return None;
        }
        self.render = RenderFlag::Rendered;

        match std::mem::replace(&mut self.state, SourceState::NoData) {
            SourceState::NoData => None,
            SourceState::Data(data) => Some(Unrendered::Data(data)),
            SourceState::Error(message) => {
                self.state = SourceState::Error(message.clone());
                Some(Unrendered::Error(message))
            }
        }
    }
}

/// The "last refreshed" sentinel: far enough back that the first tick fires.
pub fn never_refreshed() -> Timestamp {
    DateTime::from_timestamp(NEVER_REFRESHED_SECS, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .fixed_offset()
}

/// Hard-wrap `message` every `width` characters. A width of 0 disables wrapping.
pub fn wrap_error(message: &str, width: usize) -> String {
    if width == 0 {
        return message.to_string();
    }

    let chars: Vec<char> = message.chars().collect();
    chars
        .chunks(width)
        .map(|line| line.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Keep only records strictly after `now`, preserving order.
pub fn retain_future(records: &mut Vec<ForecastRecord>, now: Timestamp) {
    records.retain(|record| record.time > now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use crate::Precipitation;
    use chrono::{FixedOffset, TimeZone};

    fn at(h: u32, m: u32) -> Timestamp {
        FixedOffset::east_opt(3600)
            .unwrap()
            .with_ymd_and_hms(2020, 12, 12, h, m, 0)
            .single()
            .unwrap()
    }

    fn record(time: Timestamp) -> ForecastRecord {
        ForecastRecord {
            time,
            temperature_c: 3.0,
            precipitation: Precipitation::AmountMm(0.0),
            icon: "04".to_string(),
        }
    }

    fn source(interval_secs: u64) -> DataSource {
        let fetcher: Arc<dyn Fetcher> =
            Arc::new(|| -> FetchOutcome { Ok(SourceData::Forecast(Vec::new())) });
        DataSource::new("yr", Duration::from_secs(interval_secs), fetcher)
    }

    #[test]
    fn test_new_source_is_due_immediately() {
        let src = source(3000);
        assert_eq!(src.last_refresh().timestamp(), NEVER_REFRESHED_SECS);
        assert!(src.is_due(at(0, 0)));
        assert_eq!(src.state(), &SourceState::NoData);
        assert!(!src.is_in_flight());
    }

    #[test]
    fn test_due_boundary_is_inclusive() {
        let mut src = source(60);
        src.mark_dispatched(at(10, 0));
        assert!(!src.is_due(at(10, 0)));
        assert!(src.is_due(at(10, 1)));
        // Clock stepped back
        assert!(!src.is_due(at(9, 0)));
    }

    #[test]
    fn test_wrap_error_chunks_by_chars() {
        assert_eq!(wrap_error("abcdefgh", 3), "abc\ndef\ngh");
        assert_eq!(wrap_error("abc", 3), "abc");
        assert_eq!(wrap_error("abcdef", 0), "abcdef");
        // Multi-byte characters count as one
        assert_eq!(wrap_error("Közlekedő", 4), "Közl\neked\nő");
    }

    #[test]
    fn test_retain_future_is_strict() {
        let now = at(12, 0);
        let mut records = vec![record(at(11, 0)), record(now), record(at(13, 0))];
        retain_future(&mut records, now);
        assert_eq!(records, vec![record(at(13, 0))]);

        let mut past = vec![record(at(1, 0)), record(at(2, 0))];
        retain_future(&mut past, now);
        assert!(past.is_empty());
    }

    #[test]
    fn test_data_is_taken_once() {
        let mut src = source(60);
        src.mark_dispatched(at(10, 0));
        src.apply(Ok(SourceData::Forecast(vec![record(at(11, 0))])), 40);

        assert!(!src.is_in_flight());
        assert_eq!(src.render_flag(), RenderFlag::Pending);
        assert!(matches!(src.take_unrendered(), Some(Unrendered::Data(_))));
        assert_eq!(src.state(), &SourceState::NoData);
        assert_eq!(src.take_unrendered(), None);
    }

    #[test]
    fn test_error_replaces_data_and_stays() {
        let mut src = source(60);
        src.apply(Ok(SourceData::Forecast(vec![record(at(11, 0))])), 40);
        src.apply(Err(FetchError::Payload("bad".into())), 40);

        let expected = ":( yr: malformed payload: bad".to_string();
        assert_eq!(src.state(), &SourceState::Error(expected.clone()));
        assert_eq!(src.take_unrendered(), Some(Unrendered::Error(expected.clone())));
        // Painted once; the message keeps describing the region
        assert_eq!(src.take_unrendered(), None);
        assert_eq!(src.state(), &SourceState::Error(expected));
    }

    #[test]
    fn test_log_only_failure_keeps_state() {
        let mut src = source(5).with_error_display(ErrorDisplay::LogOnly);
        src.apply(Ok(SourceData::Forecast(vec![record(at(11, 0))])), 40);
        assert!(matches!(src.take_unrendered(), Some(Unrendered::Data(_))));

        src.mark_dispatched(at(10, 0));
        src.apply(Err(FetchError::Payload("i2c".into())), 40);
        assert!(!src.is_in_flight());
        assert_eq!(src.render_flag(), RenderFlag::Rendered);
        assert_eq!(src.state(), &SourceState::NoData);
        assert_eq!(src.take_unrendered(), None);
    }
}
