use std::time::Duration;

use rama::telemetry::tracing;
use tokio::sync::{oneshot, watch};

/// Create a new one-shot shutdown broadcast.
///
/// The [`ShutdownTrigger`] is consumed when fired,
/// so a run can only ever be stopped once.
pub(super) fn channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger(tx), ShutdownSignal(rx))
}

#[derive(Debug)]
pub(super) struct ShutdownTrigger(watch::Sender<bool>);

impl ShutdownTrigger {
    /// Notify all signal holders and close the broadcast.
    pub(super) fn fire(self) {
        // no receivers left is fine: all workers are already gone
        let _ = self.0.send(true);
    }
}

/// Receiving end of the shutdown broadcast, one clone per worker.
///
/// A closed broadcast (trigger dropped without firing) counts as fired.
#[derive(Debug, Clone)]
pub(super) struct ShutdownSignal(watch::Receiver<bool>);

impl ShutdownSignal {
    /// Non-blocking check.
    pub(super) fn is_fired(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    /// Resolves once the shutdown is fired.
    pub(super) async fn fired(&mut self) {
        let _ = self.0.wait_for(|fired| *fired).await;
    }
}

/// Why the shutdown was broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum StopReason {
    Elapsed,
    Interrupted,
}

/// Sleeps for the run duration, or until an early stop is requested,
/// after which the shutdown is broadcast to all workers.
pub(super) async fn timeout_driver(
    duration: Duration,
    early_stop_rx: oneshot::Receiver<()>,
    trigger: ShutdownTrigger,
) -> StopReason {
    let reason = tokio::select! {
        _ = tokio::time::sleep(duration) => {
            tracing::debug!(?duration, "run duration elapsed: broadcast shutdown");
            StopReason::Elapsed
        }
        Ok(()) = early_stop_rx => {
            tracing::info!("early stop requested: broadcast shutdown");
            StopReason::Interrupted
        }
    };
    trigger.fire();
    reason
}
