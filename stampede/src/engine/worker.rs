use std::time::Duration;

use rama::{
    Service,
    error::{BoxError, ErrorContext as _},
    http::{Request, Response, body::util::BodyExt as _, service::client::HttpClientExt as _},
    telemetry::tracing,
};
use tokio::{sync::mpsc, time::Instant};

use super::{shutdown::ShutdownSignal, target::TargetSelector};

/// Status code recorded for requests that did not produce a response.
pub(crate) const FAILURE_STATUS: u16 = 500;

/// Result of a single request attempt,
/// produced by a worker and consumed by the aggregator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Outcome {
    pub(crate) status: u16,
    pub(crate) elapsed: Duration,
}

/// The subset of the engine configuration a worker needs.
#[derive(Debug, Clone)]
pub(super) struct WorkerSettings {
    pub(super) wait: Option<Duration>,
    pub(super) failure_penalty: Duration,
    pub(super) request_timeout: Option<Duration>,
}

/// One buffalo of the stampede: issues sequential GET requests
/// until the shutdown signal is observed.
pub(super) struct Worker<C> {
    id: usize,
    client: C,
    selector: TargetSelector,
    settings: WorkerSettings,
    shutdown: ShutdownSignal,
    outcome_tx: mpsc::Sender<Outcome>,
}

impl<C> Worker<C>
where
    C: Service<Request, Output = Response, Error = BoxError>,
{
    pub(super) fn new(
        id: usize,
        client: C,
        selector: TargetSelector,
        settings: WorkerSettings,
        shutdown: ShutdownSignal,
        outcome_tx: mpsc::Sender<Outcome>,
    ) -> Self {
        Self {
            id,
            client,
            selector,
            settings,
            shutdown,
            outcome_tx,
        }
    }

    /// Run the request loop.
    ///
    /// The shutdown signal is only checked between requests:
    /// a request in flight always completes and is recorded.
    /// Returns the amount of outcomes emitted.
    pub(super) async fn run(mut self) -> usize {
        let mut emitted = 0;

        loop {
            if self.shutdown.is_fired() {
                tracing::debug!(worker = self.id, emitted, "worker observed shutdown: exit");
                return emitted;
            }

            let uri = self.selector.next_target().clone();
            tracing::debug!(worker = self.id, %uri, "requesting url");

            let outcome = self.timed_get(uri).await;
            if let Err(err) = self.outcome_tx.send(outcome).await {
                tracing::debug!(worker = self.id, "failed to send outcome, aggregator gone: {err}");
                return emitted;
            }
            emitted += 1;

            if let Some(wait) = self.settings.wait
                && !wait.is_zero()
            {
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {}
                    _ = self.shutdown.fired() => {
                        tracing::debug!(worker = self.id, emitted, "shutdown while waiting: exit");
                        return emitted;
                    }
                }
            }
        }
    }

    async fn timed_get(&self, uri: rama::http::Uri) -> Outcome {
        let start = Instant::now();

        let result = match self.settings.request_timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.get_and_drain(&uri))
                .await
                .context("request timed out")
                .and_then(|result| result),
            None => self.get_and_drain(&uri).await,
        };

        match result {
            Ok(status) => Outcome {
                status,
                elapsed: start.elapsed(),
            },
            Err(err) => {
                tracing::error!(worker = self.id, "failed to connect to {uri}: {err}");
                Outcome {
                    status: FAILURE_STATUS,
                    elapsed: self.settings.failure_penalty,
                }
            }
        }
    }

    /// Issue the GET request and consume the full response body,
    /// so the connection can go back to the pool.
    async fn get_and_drain(&self, uri: &rama::http::Uri) -> Result<u16, BoxError> {
        let resp = self
            .client
            .get(uri.clone())
            .send()
            .await
            .context("send GET request")?;

        let status = resp.status().as_u16();
        resp.into_body()
            .collect()
            .await
            .context("drain response body")?;

        Ok(status)
    }
}
