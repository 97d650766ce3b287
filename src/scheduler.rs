//! # Refresh scheduler
//!
//! Registry of data sources, each with its own minimum refresh interval. The
//! render loop calls [`RefreshScheduler::drain_completions`] and then
//! [`RefreshScheduler::tick`] once per tick; neither call ever blocks.
//!
//! Rate limiting is optimistic: the refresh time is bumped at dispatch, so a
//! failing source is retried no sooner than its interval. There are no
//! synchronous retries and at most one fetch per source is in flight; a due
//! tick that finds one running is simply dropped.

use crate::fetch::{Completion, Fetcher, SourceFetchTask};
use crate::source::{DataSource, ErrorDisplay, SourceId};
use crate::Timestamp;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

pub struct RefreshScheduler {
    runtime: Handle,
    sources: Vec<DataSource>,
    tx: UnboundedSender<Completion>,
    rx: UnboundedReceiver<Completion>,
    error_wrap_width: usize,
}

impl RefreshScheduler {
    /// New scheduler spawning fetches on `runtime`'s blocking pool.
    ///
    /// Error messages are wrapped to `error_wrap_width` characters.
    pub fn new(runtime: Handle, error_wrap_width: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        RefreshScheduler {
            runtime,
            sources: Vec::new(),
            tx,
            rx,
            error_wrap_width,
        }
    }

    /// Add a source whose failures are painted into its region. It is due on
    /// the very next tick.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        min_interval: Duration,
        fetcher: Arc<dyn Fetcher>,
    ) -> SourceId {
        self.register_with(name, min_interval, ErrorDisplay::Panel, fetcher)
    }

    /// Like [`register`](Self::register), choosing what a failed fetch does.
    pub fn register_with(
        &mut self,
        name: impl Into<String>,
        min_interval: Duration,
        on_error: ErrorDisplay,
        fetcher: Arc<dyn Fetcher>,
    ) -> SourceId {
        let id = SourceId(self.sources.len());
        let source = DataSource::new(name, min_interval, fetcher).with_error_display(on_error);
        debug!(
            "Registered source {} (every {:?}, errors: {:?})",
            source.name(),
            source.min_interval(),
            on_error
        );
        self.sources.push(source);
        id
    }

    /// Dispatch a fetch for every source that is due and idle.
    pub fn tick(&mut self, now: Timestamp) {
        for (index, source) in self.sources.iter_mut().enumerate() {
            if !source.is_due(now) {
                continue;
            }
            if source.is_in_flight() {
                debug!("{}: due but still fetching, skipping", source.name());
                continue;
            }

            source.mark_dispatched(now);
            debug!("{}: dispatching fetch", source.name());
            SourceFetchTask::spawn(
                &self.runtime,
                SourceId(index),
                source.name(),
                source.fetcher(),
                self.tx.clone(),
            );
        }
    }

    /// Apply every completion that has already arrived. Never waits.
    ///
    /// Returns how many outcomes were applied.
    pub fn drain_completions(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(Completion { source, outcome }) = self.rx.try_recv() {
            match self.sources.get_mut(source.0) {
                Some(target) => {
                    target.apply(outcome, self.error_wrap_width);
                    applied += 1;
                }
                None => warn!("Completion for unknown source {:?}", source),
            }
        }
        applied
    }

    pub fn source(&self, id: SourceId) -> Option<&DataSource> {
        self.sources.get(id.0)
    }

    pub fn source_mut(&mut self, id: SourceId) -> Option<&mut DataSource> {
        self.sources.get_mut(id.0)
    }

    /// Number of fetches dispatched and not yet drained
    pub fn in_flight_count(&self) -> usize {
        self.sources.iter().filter(|s| s.is_in_flight()).count()
    }
}
