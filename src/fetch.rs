//! # Background fetch tasks
//!
//! Every data source is fetched by a blocking callable ([`Fetcher`]). The
//! scheduler runs it on one of tokio's blocking workers so that a slow API or a
//! stuck sensor never delays the render loop. The worker reports back exactly
//! once over an unbounded channel, even when the fetcher panics.

use crate::sensor::SensorError;
use crate::source::{SourceData, SourceId};
use log::debug;
use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

/// Why a fetch produced no data.
///
/// The `Display` text ends up on the panel, so it is kept short.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network failure or a non-success HTTP status
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON did not match the expected schema
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// JSON parsed but the content made no sense
    #[error("malformed payload: {0}")]
    Payload(String),

    #[error("{0}")]
    Sensor(#[from] SensorError),

    /// The thermostat account still has to be linked by the user
    #[error("activate the device at {url}")]
    Activation { url: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The fetcher panicked; the message is the panic payload
    #[error("fetch panicked: {0}")]
    Panicked(String),
}

/// Result of one fetch, consumed exactly once by the scheduler
pub type FetchOutcome = Result<SourceData, FetchError>;

/// A blocking producer of source data.
///
/// Implementations may block for as long as their own I/O timeouts allow;
/// they always run off the render thread.
pub trait Fetcher: Send + Sync {
    fn fetch(&self) -> FetchOutcome;
}

impl<F> Fetcher for F
where
    F: Fn() -> FetchOutcome + Send + Sync,
{
    fn fetch(&self) -> FetchOutcome {
        self()
    }
}

/// Message sent by a finished fetch task
#[derive(Debug)]
pub struct Completion {
    pub source: SourceId,
    pub outcome: FetchOutcome,
}

/// One source's fetch, running on a blocking worker.
pub struct SourceFetchTask;

impl SourceFetchTask {
    /// Start `fetcher` on a blocking worker of `runtime`.
    ///
    /// The completion is sent on `tx` whether the fetch succeeds, fails or
    /// panics. A closed channel just drops the outcome.
    pub fn spawn(
        runtime: &Handle,
        source: SourceId,
        name: &str,
        fetcher: Arc<dyn Fetcher>,
        tx: UnboundedSender<Completion>,
    ) -> JoinHandle<()> {
        let name = name.to_string();
        runtime.spawn_blocking(move || {
            let outcome = match panic::catch_unwind(AssertUnwindSafe(|| fetcher.fetch())) {
                Ok(outcome) => outcome,
                Err(payload) => Err(FetchError::Panicked(panic_message(&*payload))),
            };

            if tx.send(Completion { source, outcome }).is_err() {
                debug!("{name}: scheduler gone, dropping fetch outcome");
            }
        })
    }
}

/// HTTP client shared by the API fetchers: identifying User-Agent, gzip and
/// bounded timeouts. These timeouts are the only ones a fetch has.
pub fn http_client(user_agent: &str) -> Result<reqwest::Client, FetchError> {
    let client = reqwest::Client::builder()
        .user_agent(user_agent)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .gzip(true)
        .build()?;
    Ok(client)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SensorReading;
    use tokio::runtime::Runtime;
    use tokio::sync::mpsc;

    fn reading() -> SensorReading {
        SensorReading {
            temperature_c: 21.0,
            humidity_pct: 40.0,
            gas_resistance_ohm: None,
            heat_stable: false,
        }
    }

    #[test]
    fn test_success_is_reported() {
        let rt = Runtime::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let fetcher: Arc<dyn Fetcher> =
            Arc::new(|| -> FetchOutcome { Ok(SourceData::Sensor(reading())) });

        let task = SourceFetchTask::spawn(rt.handle(), SourceId(3), "bme680", fetcher, tx);
        rt.block_on(task).unwrap();

        let completion = rx.try_recv().unwrap();
        assert_eq!(completion.source, SourceId(3));
        assert_eq!(completion.outcome.unwrap(), SourceData::Sensor(reading()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_panic_becomes_error() {
        let rt = Runtime::new().unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let fetcher: Arc<dyn Fetcher> = Arc::new(|| -> FetchOutcome { panic!("sensor on fire") });

        let task = SourceFetchTask::spawn(rt.handle(), SourceId(0), "bme680", fetcher, tx);
        // The worker itself must finish normally
        rt.block_on(task).unwrap();

        match rx.try_recv().unwrap().outcome {
            Err(FetchError::Panicked(msg)) => assert_eq!(msg, "sensor on fire"),
            other => panic!("expected a panic error, got {other:?}"),
        }
    }

    #[test]
    fn test_dropped_receiver_is_harmless() {
        let rt = Runtime::new().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let fetcher: Arc<dyn Fetcher> =
            Arc::new(|| -> FetchOutcome { Ok(SourceData::Thermostat(Vec::new())) });

        let task = SourceFetchTask::spawn(rt.handle(), SourceId(1), "tado", fetcher, tx);
        assert!(rt.block_on(task).is_ok());
    }
}
