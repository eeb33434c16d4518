use std::{io::Write, time::Duration};

use rama::telemetry::tracing;

use super::{Reporter, Ticker, millis};
use crate::engine::{RunReport, Statistics, StatusClass};

/// Plain text reporter, meant to be read by a human operator.
pub struct HumanReporter<W> {
    ticker: Ticker,
    out: W,
}

impl<W> HumanReporter<W>
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

    fn write_final(&mut self, report: &RunReport) -> std::io::Result<()> {
        let stats = report.stats();
        let out = &mut self.out;

        writeln!(out, "\nResponse codes:")?;
        for class in StatusClass::ALL {
            writeln!(out, "[{}]:\t{}", class.label(), stats.count(class))?;
        }

        writeln!(out, "\nTotal requests:\t{}", stats.total())?;
        writeln!(out, "Successful:\t{}", stats.successes())?;
        writeln!(out, "Failed:\t\t{}", stats.failures())?;
        match report.availability() {
            Some(availability) => writeln!(out, "Availability:\t{availability:.2}%")?,
            None => writeln!(out, "Availability:\tn/a")?,
        }

        writeln!(out, "\nLatency (ms):")?;
        for (label, value) in [
            ("min", stats.min_elapsed()),
            ("max", stats.max_elapsed()),
            ("avg", report.average_latency()),
        ] {
            match value {
                Some(d) => writeln!(out, "[{label}]:\t{:.2}", millis(d))?,
                None => writeln!(out, "[{label}]:\tn/a")?,
            }
        }

        writeln!(
            out,
            "\nWall clock:\t{:.2}s",
            report.wall_clock().as_secs_f64()
        )?;
        writeln!(out, "Throughput:\t{:.2} req/s", report.throughput())?;
        out.flush()
    }
}

impl<W> Reporter for HumanReporter<W>
where
    W: Write + Send + 'static,
{
    fn on_tick(&mut self, now: Duration, stats: &Statistics) {
        let Some((_, rps)) = self.ticker.tick(now, stats.total()) else {
            return;
        };

        if let Err(err) = writeln!(
            self.out,
            "t={:.1}s rps={:.1} total={} 2xx={} 3xx={} 4xx={} 5xx={}",
            now.as_secs_f64(),
            rps,
            stats.total(),
            stats.count(StatusClass::Success),
            stats.count(StatusClass::Redirection),
            stats.count(StatusClass::ClientError),
            stats.count(StatusClass::ServerError),
        ) {
            tracing::debug!("failed to write progress line: {err}");
        }
    }

    fn finish(&mut self, report: &RunReport) {
        if let Err(err) = self.write_final(report) {
            tracing::error!("failed to write final report: {err}");
        }
    }
}
