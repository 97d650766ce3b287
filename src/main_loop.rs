//! # Render loop
//!
//! One synchronous loop at a fixed period. Each tick:
//!
//! 1. apply fetch completions that arrived since the last tick
//! 2. dispatch fetches for sources that are due
//! 3. repaint the clock and every panel with something new to show
//! 4. push the frame, full or partial
//!
//! Only step 4 may block, and only on the display. The loop then sleeps for
//! whatever is left of the period.

use crate::compositor::{DisplayCompositor, PushKind};
use crate::display::PanelDriver;
use crate::panels::{render_source, ClockPanel, RenderOutcome, SourcePanel};
use crate::scheduler::RefreshScheduler;
use crate::source::SourceId;
use crate::Timestamp;
use log::{debug, error, info, warn};
use std::thread;
use std::time::{Duration, Instant};

/// What happened during one tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    /// Fetch outcomes applied
    pub completions: usize,
    /// Regions repainted, clock included
    pub rendered: usize,
    pub push: PushKind,
}

pub struct MainLoop<D: PanelDriver> {
    scheduler: RefreshScheduler,
    compositor: DisplayCompositor,
    driver: D,
    clock: ClockPanel,
    panels: Vec<(SourceId, Box<dyn SourcePanel>)>,
    period: Duration,
}

impl<D: PanelDriver> MainLoop<D> {
    /// Regions must already be claimed on `compositor`.
    pub fn new(
        scheduler: RefreshScheduler,
        compositor: DisplayCompositor,
        driver: D,
        period: Duration,
    ) -> Self {
        MainLoop {
            scheduler,
            compositor,
            driver,
            clock: ClockPanel::default(),
            panels: Vec::new(),
            period,
        }
    }

    /// Show `source` through `panel` from now on.
    pub fn attach(&mut self, source: SourceId, panel: Box<dyn SourcePanel>) {
        self.panels.push((source, panel));
    }

    pub fn compositor(&self) -> &DisplayCompositor {
        &self.compositor
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Paint the clock and make the start-up full push.
    ///
    /// Sources have no data yet; their regions fill in on later ticks. A
    /// failed push is logged like any other and the loop carries on.
    pub fn start(&mut self, now: Timestamp) {
        if let Err(e) = self.clock.render(&mut self.compositor, now) {
            warn!("Clock: {}", e);
        }
        let kind = self.compositor.schedule_push(now);
        match self.compositor.push(&mut self.driver, kind) {
            Ok(()) => info!("Display initialised ({:?} push)", kind),
            Err(e) => error!("Display push failed: {}", e),
        }
    }

    /// Run one tick at `now`. Never fails; problems are logged.
    pub fn tick(&mut self, now: Timestamp) -> TickReport {
        let completions = self.scheduler.drain_completions();
        self.scheduler.tick(now);

        let mut rendered = 0;
        match self.clock.render(&mut self.compositor, now) {
            Ok(true) => rendered += 1,
            Ok(false) => {}
            Err(e) => warn!("Clock: {}", e),
        }

        for (id, panel) in self.panels.iter_mut() {
            let Some(source) = self.scheduler.source_mut(*id) else {
                warn!("{:?} panel is attached to unknown source {:?}", panel.owner(), id);
                continue;
            };
            match render_source(panel.as_mut(), source, &mut self.compositor, now) {
                Ok(RenderOutcome::Unchanged) => {}
                Ok(_) => rendered += 1,
                Err(e) => warn!("{}: {}", source.name(), e),
            }
        }

        let push = self.compositor.schedule_push(now);
        if let Err(e) = self.compositor.push(&mut self.driver, push) {
            error!("Display push failed: {}", e);
        }

        debug!(
            "Tick: {} completion(s), {} region(s) repainted, {:?} push, {} in flight",
            completions,
            rendered,
            push,
            self.scheduler.in_flight_count()
        );
        TickReport {
            completions,
            rendered,
            push,
        }
    }

    /// Tick forever at the configured period.
    pub fn run(&mut self) -> ! {
        info!("Render loop running every {:?}", self.period);
        loop {
            let started = Instant::now();
            self.tick(crate::now());
            if let Some(pause) = pause_for(started.elapsed(), self.period) {
                thread::sleep(pause);
            }
        }
    }
}

/// Sleep needed to keep a `period` cadence after a tick that took `elapsed`.
///
/// `None` when the tick overran.
pub fn pause_for(elapsed: Duration, period: Duration) -> Option<Duration> {
    period
        .checked_sub(elapsed)
        .filter(|pause| !pause.is_zero())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pause_fills_the_period() {
        let period = Duration::from_secs(2);
        assert_eq!(
            pause_for(Duration::from_millis(300), period),
            Some(Duration::from_millis(1700))
        );
    }

    #[test]
    fn test_no_pause_after_overrun() {
        let period = Duration::from_secs(2);
        assert_eq!(pause_for(Duration::from_secs(2), period), None);
        assert_eq!(pause_for(Duration::from_secs(5), period), None);
    }
}
