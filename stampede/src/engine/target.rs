use rama::http::Uri;
use rand::{RngExt as _, SeedableRng as _, rngs::SmallRng};

use crate::config::{SelectionPolicy, Targets};

/// Picks the next target URL for a single worker.
///
/// Each worker owns its selector, there is no shared cursor:
/// in sequential mode every worker cycles through the full list on its own,
/// so with few workers the overall spread over the targets
/// is round-robin per worker rather than globally balanced.
pub(super) struct TargetSelector {
    targets: Targets,
    state: SelectorState,
}

enum SelectorState {
    Sequential { counter: usize },
    Random { rng: SmallRng },
}

impl TargetSelector {
    /// Create the selector for the worker with the given index.
    ///
    /// Random streams are derived from the single run seed,
    /// so the same seed reproduces the same per-worker target sequences.
    pub(super) fn new(targets: Targets, policy: SelectionPolicy, seed: u64, worker: usize) -> Self {
        let state = match policy {
            SelectionPolicy::Sequential => SelectorState::Sequential { counter: 0 },
            SelectionPolicy::Random => SelectorState::Random {
                rng: SmallRng::seed_from_u64(seed.wrapping_add(worker as u64)),
            },
        };
        Self { targets, state }
    }

    pub(super) fn next_target(&mut self) -> &Uri {
        let index = match &mut self.state {
            SelectorState::Sequential { counter } => {
                let index = *counter % self.targets.len();
                *counter = counter.wrapping_add(1);
                index
            }
            SelectorState::Random { rng } => rng.random_range(0..self.targets.len()),
        };
        self.targets.get(index)
    }
}
