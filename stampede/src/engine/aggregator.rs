use std::time::Duration;

use rama::telemetry::tracing;
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};

use super::worker::Outcome;
use crate::report::Reporter;

/// HTTP status classes tracked by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// `2xx`
    Success,
    /// `3xx`
    Redirection,
    /// `4xx`
    ClientError,
    /// `5xx`
    ServerError,
}

impl StatusClass {
    pub const ALL: [Self; 4] = [
        Self::Success,
        Self::Redirection,
        Self::ClientError,
        Self::ServerError,
    ];

    /// Bucket a status code, `None` for anything outside of `[200, 600)`.
    pub fn from_status(status: u16) -> Option<Self> {
        match status {
            200..300 => Some(Self::Success),
            300..400 => Some(Self::Redirection),
            400..500 => Some(Self::ClientError),
            500..600 => Some(Self::ServerError),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "2xx",
            Self::Redirection => "3xx",
            Self::ClientError => "4xx",
            Self::ServerError => "5xx",
        }
    }

    #[inline(always)]
    fn index(self) -> usize {
        self as usize
    }
}

/// Running statistics of a stampede.
///
/// Only ever mutated by the aggregator task that owns it;
/// once that task is done it is handed over (by value) to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statistics {
    class_counts: [u64; 4],
    total: u64,
    elapsed_sum: Duration,
    elapsed_min: Duration,
    elapsed_max: Duration,
}

impl Default for Statistics {
    fn default() -> Self {
        Self {
            class_counts: [0; 4],
            total: 0,
            elapsed_sum: Duration::ZERO,
            elapsed_min: Duration::MAX,
            elapsed_max: Duration::ZERO,
        }
    }
}

impl Statistics {
    /// Record a single outcome.
    ///
    /// Outcomes with a status outside of the tracked classes are ignored
    /// as a whole, which keeps `total` equal to the sum of all class counts.
    /// Returns the class the outcome was counted in.
    pub(crate) fn record(&mut self, outcome: &Outcome) -> Option<StatusClass> {
        let Some(class) = StatusClass::from_status(outcome.status) else {
            tracing::debug!(status = outcome.status, "ignore outcome with untracked status");
            return None;
        };

        self.class_counts[class.index()] += 1;
        self.total += 1;
        self.elapsed_sum = self.elapsed_sum.saturating_add(outcome.elapsed);
        self.elapsed_min = self.elapsed_min.min(outcome.elapsed);
        self.elapsed_max = self.elapsed_max.max(outcome.elapsed);

        Some(class)
    }

    #[inline(always)]
    pub fn count(&self, class: StatusClass) -> u64 {
        self.class_counts[class.index()]
    }

    #[inline(always)]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Requests answered by the target: everything but `5xx`.
    pub fn successes(&self) -> u64 {
        self.total - self.count(StatusClass::ServerError)
    }

    pub fn failures(&self) -> u64 {
        self.count(StatusClass::ServerError)
    }

    pub fn elapsed_sum(&self) -> Duration {
        self.elapsed_sum
    }

    pub fn min_elapsed(&self) -> Option<Duration> {
        (self.total > 0).then_some(self.elapsed_min)
    }

    pub fn max_elapsed(&self) -> Option<Duration> {
        (self.total > 0).then_some(self.elapsed_max)
    }

    pub fn average_elapsed(&self) -> Option<Duration> {
        if self.total == 0 {
            return None;
        }
        Some(Duration::from_secs_f64(
            self.elapsed_sum.as_secs_f64() / self.total as f64,
        ))
    }

    /// Percentage of successes (see [`Self::successes`]) over all requests.
    pub fn availability(&self) -> Option<f64> {
        (self.total > 0).then(|| self.successes() as f64 * 100. / self.total as f64)
    }
}

/// Sole consumer of the outcome channel and sole owner of the [`Statistics`].
pub(super) struct Aggregator {
    outcome_rx: mpsc::Receiver<Outcome>,
    early_stop_tx: Option<oneshot::Sender<()>>,
    reporter: Box<dyn Reporter>,
    stats: Statistics,
}

impl Aggregator {
    pub(super) fn new(
        outcome_rx: mpsc::Receiver<Outcome>,
        early_stop_tx: oneshot::Sender<()>,
        reporter: Box<dyn Reporter>,
    ) -> Self {
        Self {
            outcome_rx,
            early_stop_tx: Some(early_stop_tx),
            reporter,
            stats: Statistics::default(),
        }
    }

    /// Drain the outcome channel until all workers are gone.
    ///
    /// An external interrupt asks the timeout driver to stop the run early,
    /// after which draining continues as normal.
    pub(super) async fn run<F>(mut self, interrupt: F) -> (Statistics, Box<dyn Reporter>)
    where
        F: Future<Output: Send + 'static> + Send + 'static,
    {
        let start = Instant::now();
        let mut interrupt = std::pin::pin!(interrupt);

        loop {
            tokio::select! {
                maybe_outcome = self.outcome_rx.recv() => {
                    let Some(outcome) = maybe_outcome else {
                        tracing::debug!(total = self.stats.total(), "exit aggregator: outcome senders closed");
                        return (self.stats, self.reporter);
                    };

                    tracing::debug!(status = outcome.status, elapsed = ?outcome.elapsed, "received outcome");
                    self.stats.record(&outcome);
                    self.reporter.on_tick(start.elapsed(), &self.stats);
                }

                _ = interrupt.as_mut(), if self.early_stop_tx.is_some() => {
                    tracing::info!("interrupt received: request early stop of stampede");
                    if let Some(early_stop_tx) = self.early_stop_tx.take() {
                        let _ = early_stop_tx.send(());
                    }
                }
            }
        }
    }
}
