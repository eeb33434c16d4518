//! Presentation of a stampede: progress while running and the final report.

use std::time::Duration;

use crate::engine::{RunReport, Statistics};

mod human;
mod json;

pub use self::{human::HumanReporter, json::JsonReporter};

/// Receives progress and the final report of a run.
///
/// Owned by the aggregator while the run is active,
/// and handed back to the engine to [`Reporter::finish`] the run.
pub trait Reporter: Send + 'static {
    /// Called after every recorded outcome, `now` being the time since the run started.
    fn on_tick(&mut self, now: Duration, stats: &Statistics);
    fn finish(&mut self, report: &RunReport);
}

/// Tracks when the next progress line is due.
#[derive(Debug)]
struct Ticker {
    interval: Option<Duration>,
    last_tick: Duration,
    last_total: u64,
}

impl Ticker {
    fn new(interval: Option<Duration>) -> Self {
        Self {
            interval: interval.filter(|interval| !interval.is_zero()),
            last_tick: Duration::ZERO,
            last_total: 0,
        }
    }

    /// Returns the interval length and the requests per second within it,
    /// when a progress line is due.
    fn tick(&mut self, now: Duration, total: u64) -> Option<(Duration, f64)> {
        let interval = self.interval?;
        let since_last = now.saturating_sub(self.last_tick);
        if since_last < interval {
            return None;
        }

        let rps = (total - self.last_total) as f64 / since_last.as_secs_f64();
        self.last_tick = now;
        self.last_total = total;
        Some((since_last, rps))
    }
}

#[inline(always)]
fn millis(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.
}
