use std::{path::Path, sync::Arc, time::Duration};

use rama::{
    error::{BoxError, ErrorContext as _},
    http::Uri,
    telemetry::tracing,
};

/// Immutable, never empty, list of target URLs,
/// shared read-only by all workers of a run.
#[derive(Debug, Clone)]
pub struct Targets(Arc<[Uri]>);

impl Targets {
    pub fn try_new(uris: Vec<Uri>) -> Result<Self, BoxError> {
        if uris.is_empty() {
            return Err(BoxError::from("target list is empty"));
        }
        Ok(Self(uris.into()))
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Panics if `index` is out of range.
    #[inline(always)]
    pub fn get(&self, index: usize) -> &Uri {
        &self.0[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &Uri> {
        self.0.iter()
    }
}

/// How workers pick the next target URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionPolicy {
    /// Per-worker round-robin over the target list.
    #[default]
    Sequential,
    /// Uniform random sampling of the target list ("internet mode").
    Random,
}

/// Raw, unvalidated engine parameters as received from the CLI.
#[derive(Debug, Clone)]
pub struct EngineParams {
    pub clients: usize,
    pub duration_secs: u64,
    pub wait_secs: i64,
    pub benchmark_mode: bool,
    pub policy: SelectionPolicy,
    pub seed: Option<u64>,
    pub failure_penalty_secs: f64,
    pub request_timeout_secs: f64,
    pub graceful_secs: f64,
}

/// Immutable configuration of a single stampede run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Amount of concurrent workers.
    pub concurrency: usize,
    /// Wall-clock duration after which workers are told to stop.
    pub duration: Duration,
    /// Pause between two requests of the same worker, `None` when not enforced.
    pub wait: Option<Duration>,
    pub policy: SelectionPolicy,
    /// Seed from which all random target sampling streams are derived.
    pub seed: u64,
    /// Latency recorded for a failed request.
    pub failure_penalty: Duration,
    pub request_timeout: Option<Duration>,
    /// Time in-flight requests get to complete after an interrupt,
    /// `None` to always wait for them.
    pub drain_limit: Option<Duration>,
    /// Capacity of the worker to aggregator outcome channel.
    pub channel_capacity: usize,
}

impl EngineConfig {
    pub fn try_new(params: EngineParams) -> Result<Self, BoxError> {
        if params.clients == 0 {
            return Err(BoxError::from("the number of clients has to be at least 1"));
        }

        if !params.failure_penalty_secs.is_finite() || params.failure_penalty_secs < 0. {
            return Err(BoxError::from(format!(
                "invalid failure penalty: {} seconds",
                params.failure_penalty_secs
            )));
        }

        let wait = if params.benchmark_mode {
            tracing::debug!("benchmark mode: force wait duration to 0");
            Some(Duration::ZERO)
        } else if params.wait_secs >= 0 {
            Some(Duration::from_secs(params.wait_secs.unsigned_abs()))
        } else {
            None
        };

        let request_timeout = (params.request_timeout_secs.is_finite()
            && params.request_timeout_secs > 0.)
            .then(|| Duration::from_secs_f64(params.request_timeout_secs));

        let drain_limit = (params.graceful_secs.is_finite() && params.graceful_secs > 0.)
            .then(|| Duration::from_secs_f64(params.graceful_secs));

        Ok(Self {
            concurrency: params.clients,
            duration: Duration::from_secs(params.duration_secs),
            wait,
            policy: params.policy,
            seed: params.seed.unwrap_or_else(rand::random),
            failure_penalty: Duration::from_secs_f64(params.failure_penalty_secs),
            request_timeout,
            drain_limit,
            channel_capacity: params.clients.saturating_mul(8),
        })
    }

    /// Configuration with defaults matching the CLI defaults,
    /// useful as a base for tests.
    #[cfg(test)]
    pub fn for_test(concurrency: usize, duration: Duration, wait: Option<Duration>) -> Self {
        Self {
            concurrency,
            duration,
            wait,
            policy: SelectionPolicy::Sequential,
            seed: 42,
            failure_penalty: Duration::from_secs(1),
            request_timeout: None,
            drain_limit: None,
            channel_capacity: concurrency * 8,
        }
    }
}

/// Parse and validate a single target URL.
///
/// Only absolute `http` and `https` URLs are accepted.
pub fn parse_target(raw: &str) -> Result<Uri, BoxError> {
    let uri: Uri = raw
        .trim()
        .parse()
        .with_context(|| format!("parse '{raw}' as URI"))?;

    match uri.scheme_str() {
        Some("http" | "https") => (),
        Some(scheme) => {
            return Err(BoxError::from(format!(
                "unsupported scheme '{scheme}' in target '{raw}'"
            )));
        }
        None => {
            return Err(BoxError::from(format!(
                "target '{raw}' is not an absolute URL (missing scheme)"
            )));
        }
    }

    if uri.host().is_none_or(str::is_empty) {
        return Err(BoxError::from(format!("target '{raw}' has no host")));
    }

    Ok(uri)
}

/// Parse the content of a target list: one URL per line, blank lines are skipped.
pub fn parse_targets(content: &str) -> Result<Targets, BoxError> {
    let uris = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(index, line)| {
            parse_target(line).with_context(|| format!("invalid target on line {}", index + 1))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Targets::try_new(uris)
}

/// Read a newline-delimited list of target URLs from the file at the given path.
pub async fn load_targets_from_file(path: &Path) -> Result<Targets, BoxError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("read target list at path '{}'", path.display()))?;

    let targets = parse_targets(&content)
        .with_context(|| format!("parse target list at path '{}'", path.display()))?;

    tracing::info!(
        path = %path.display(),
        count = targets.len(),
        "target list loaded",
    );

    Ok(targets)
}
