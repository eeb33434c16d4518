use std::{io::Write, time::Duration};

use rama::telemetry::tracing;

use super::{Reporter, Ticker, millis};
use crate::engine::{RunReport, Statistics, StatusClass};

/// Reports as JSON lines: a `summary` line per interval and a `final` line.
pub struct JsonReporter<W> {
    ticker: Ticker,
    out: W,
}

impl<W> JsonReporter<W>
where
    W: Write + Send + 'static,
{
    pub fn new(interval: Option<Duration>, out: W) -> Self {
        Self {
            ticker: Ticker::new(interval),
            out,
        }
    }

    #[cfg(test)]
    pub(super) fn into_inner(self) -> W {
        self.out
    }

    fn emit(&mut self, line: serde_json::Value) {
        if let Err(err) = writeln!(self.out, "{line}").and_then(|_| self.out.flush()) {
            tracing::error!("failed to write json report line: {err}");
        }
    }
}

fn codes(stats: &Statistics) -> serde_json::Value {
    let mut codes = serde_json::Map::new();
    for class in StatusClass::ALL {
        codes.insert(class.label().to_owned(), stats.count(class).into());
    }
    codes.into()
}

impl<W> Reporter for JsonReporter<W>
where
    W: Write + Send + 'static,
{
    fn on_tick(&mut self, now: Duration, stats: &Statistics) {
        let Some((interval, rps)) = self.ticker.tick(now, stats.total()) else {
            return;
        };

        self.emit(serde_json::json!({
            "type": "summary",
            "t_ms": now.as_millis(),
            "interval_ms": interval.as_millis(),
            "rps": rps,
            "total": stats.total(),
            "codes": codes(stats),
        }));
    }

    fn finish(&mut self, report: &RunReport) {
        let stats = report.stats();
        self.emit(serde_json::json!({
            "type": "final",
            "codes": codes(stats),
            "total": stats.total(),
            "success": stats.successes(),
            "fail": stats.failures(),
            "availability": report.availability(),
            "latency_ms": {
                "min": stats.min_elapsed().map(millis),
                "max": stats.max_elapsed().map(millis),
                "avg": report.average_latency().map(millis),
            },
            "wall_clock_s": report.wall_clock().as_secs_f64(),
            "throughput_rps": report.throughput(),
        }));
    }
}
