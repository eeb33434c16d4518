//! The stampede engine: a pool of workers hammering the targets
//! and a single aggregator folding their outcomes into [`Statistics`].
//!
//! ```text
//! worker 0 ─┐
//! worker 1 ─┼─ mpsc<Outcome> ──▶ aggregator ──▶ Reporter
//! worker N ─┘        ▲                │
//!                    │ watch<bool>    │ early stop (interrupt)
//!                    └─ timeout driver ◀┘
//! ```

use std::{fmt, time::Duration};

use rama::{
    Service,
    error::{BoxError, ErrorContext as _},
    http::{Request, Response},
    telemetry::tracing,
};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinSet,
    time::Instant,
};

use crate::{
    config::{EngineConfig, Targets},
    report::Reporter,
};

mod aggregator;
mod shutdown;
mod target;
mod worker;

pub use self::aggregator::{Statistics, StatusClass};

use self::{
    aggregator::Aggregator,
    shutdown::StopReason,
    target::TargetSelector,
    worker::{Worker, WorkerSettings},
};

/// Lifecycle of a single run, only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Configured,
    Running,
    Draining,
    Done,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Configured => "configured",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Done => "done",
        })
    }
}

/// Final result of a run.
#[derive(Debug, Clone)]
pub struct RunReport {
    stats: Statistics,
    wall_clock: Duration,
}

impl RunReport {
    pub fn new(stats: Statistics, wall_clock: Duration) -> Self {
        Self { stats, wall_clock }
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Time between the start of the run and the last outcome drained.
    pub fn wall_clock(&self) -> Duration {
        self.wall_clock
    }

    pub fn average_latency(&self) -> Option<Duration> {
        self.stats.average_elapsed()
    }

    /// Requests per second over the wall clock of the run.
    pub fn throughput(&self) -> f64 {
        let secs = self.wall_clock.as_secs_f64();
        if secs > 0. {
            self.stats.total() as f64 / secs
        } else {
            0.
        }
    }

    pub fn availability(&self) -> Option<f64> {
        self.stats.availability()
    }
}

#[derive(Debug)]
pub struct Engine<C> {
    client: C,
    targets: Targets,
    config: EngineConfig,
}

impl<C> Engine<C>
where
    C: Service<Request, Output = Response, Error = BoxError> + Clone,
{
    pub fn new(client: C, targets: Targets, config: EngineConfig) -> Self {
        Self {
            client,
            targets,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn targets(&self) -> &Targets {
        &self.targets
    }

    /// Run the stampede to completion and hand the final report to the reporter.
    ///
    /// The run ends once the configured duration elapsed, or earlier
    /// when `interrupt` resolves. In-flight requests are completed and
    /// recorded before the report is produced, except after an interrupt
    /// with a drain limit: workers still busy once it passes are aborted.
    pub async fn run<F>(self, interrupt: F, reporter: Box<dyn Reporter>) -> Result<RunReport, BoxError>
    where
        F: Future<Output: Send + 'static> + Send + 'static,
    {
        let Self {
            client,
            targets,
            config,
        } = self;

        let mut state = EngineState::Configured;
        tracing::debug!(%state, ?config, "stampede engine configured");

        let start = Instant::now();

        let (outcome_tx, outcome_rx) = mpsc::channel(config.channel_capacity.max(1));
        let (trigger, signal) = shutdown::channel();
        let (early_stop_tx, early_stop_rx) = oneshot::channel();

        let mut timeout_handle = tokio::spawn(shutdown::timeout_driver(
            config.duration,
            early_stop_rx,
            trigger,
        ));

        let aggregator_handle = tokio::spawn(
            Aggregator::new(outcome_rx, early_stop_tx, reporter).run(interrupt),
        );

        let settings = WorkerSettings {
            wait: config.wait,
            failure_penalty: config.failure_penalty,
            request_timeout: config.request_timeout,
        };

        let mut workers = JoinSet::new();
        for id in 0..config.concurrency {
            let selector = TargetSelector::new(targets.clone(), config.policy, config.seed, id);
            let worker = Worker::new(
                id,
                client.clone(),
                selector,
                settings.clone(),
                signal.clone(),
                outcome_tx.clone(),
            );
            workers.spawn(worker.run());
        }
        // the aggregator only sees the channel close once all workers are gone
        drop(outcome_tx);
        drop(signal);

        state = EngineState::Running;
        tracing::debug!(%state, workers = config.concurrency, "stampede engine running");

        let mut emitted = 0;
        let mut stop_reason = None;
        let mut drain_deadline = None;
        loop {
            tokio::select! {
                maybe_result = workers.join_next() => {
                    match maybe_result {
                        None => break,
                        Some(Ok(count)) => emitted += count,
                        Some(Err(err)) if err.is_cancelled() => {
                            tracing::debug!("stampede worker aborted: {err}");
                        }
                        Some(Err(err)) => tracing::error!("stampede worker failed: {err}"),
                    }
                }

                result = &mut timeout_handle, if stop_reason.is_none() => {
                    let reason = result.context("join stampede timeout driver")?;
                    stop_reason = Some(reason);
                    if reason == StopReason::Interrupted {
                        drain_deadline = config.drain_limit.map(|limit| Instant::now() + limit);
                    }
                }

                _ = sleep_until_deadline(drain_deadline) => {
                    tracing::warn!(
                        in_flight = workers.len(),
                        "in-flight requests exceeded the drain limit after interrupt: abort them",
                    );
                    drain_deadline = None;
                    workers.abort_all();
                }
            }
        }

        state = EngineState::Draining;
        tracing::debug!(%state, emitted, ?stop_reason, "all workers exited");

        let (stats, mut reporter) = aggregator_handle
            .await
            .context("join stampede aggregator")?;
        let wall_clock = start.elapsed();

        if stop_reason.is_none() {
            // all workers exited, so the broadcast already happened
            if let Err(err) = timeout_handle.await {
                tracing::debug!("stampede timeout driver did not finish cleanly: {err}");
            }
        }

        state = EngineState::Done;
        tracing::debug!(%state, total = stats.total(), ?wall_clock, "stampede engine done");

        let report = RunReport::new(stats, wall_clock);
        reporter.finish(&report);

        Ok(report)
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
