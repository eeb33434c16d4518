#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

use std::{path::PathBuf, time::Duration};

use rama::{
    Service,
    error::{BoxError, ErrorContext as _},
    graceful::{self, ShutdownGuard},
    http::{Request, Response, Uri},
    rt::Executor,
    telemetry::tracing::{self, Instrument as _},
};

use clap::{CommandFactory as _, Parser};

pub mod client;
pub mod config;
pub mod engine;
pub mod report;
pub mod utils;


use crate::{
    config::{EngineConfig, SelectionPolicy, Targets},
    engine::Engine,
    report::{HumanReporter, JsonReporter, Reporter},
};

#[cfg(target_family = "unix")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Exit code used for configuration (and fatal runtime) errors.
const EXIT_CONFIG_ERROR: i32 = 1;
/// Exit code used when usage is printed (help or wrong arguments).
const EXIT_USAGE: i32 = 2;

/// CLI arguments for configuring a stampede.
#[derive(Debug, Clone, Parser)]
#[command(name = "stampede")]
#[command(bin_name = "stampede")]
#[command(version, about, long_about = None)]
#[command(disable_help_flag = true)]
pub struct Args {
    /// single target URL, used when no input file is given
    #[arg(value_name = "URL")]
    pub target: Option<String>,

    /// input file to read newline-delimited target URLs from
    #[arg(long, short = 'f', value_name = "PATH")]
    pub file: Option<PathBuf>,

    /// the number of buffalo (concurrent clients) to spawn
    #[arg(long, short = 'c', value_name = "N", default_value_t = 10)]
    pub clients: usize,

    /// the duration of the stampede
    #[arg(long, short = 't', value_name = "SECONDS", default_value_t = 30)]
    pub duration: u64,

    /// the time a client waits between requests (< 0 = no wait)
    #[arg(
        long,
        short = 'w',
        value_name = "SECONDS",
        default_value_t = 1,
        allow_negative_numbers = true
    )]
    pub wait: i64,

    /// "internet mode": random sampling of the target URLs instead of round-robin
    #[arg(long = "internet", short = 'i', default_value_t = false)]
    pub internet_mode: bool,

    /// benchmark mode: fire requests without waiting (forces --wait to 0)
    #[arg(long = "benchmark", short = 'b', default_value_t = false)]
    pub benchmark_mode: bool,

    /// seed for the random target sampling (random if not defined)
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// latency recorded for a request that failed to connect or complete
    #[arg(long, value_name = "SECONDS", default_value_t = 1.)]
    pub failure_penalty: f64,

    /// abort and count as failed any request taking longer than this (<= 0.0 = no timeout)
    #[arg(long, value_name = "SECONDS", default_value_t = 0.)]
    pub request_timeout: f64,

    /// report json instead of a human-friendly format
    #[arg(long, default_value_t = false)]
    pub json: bool,

    /// interval at which progress is reported (<= 0.0 = final report only)
    #[arg(long, value_name = "SECONDS", default_value_t = 1.)]
    pub report_interval: f64,

    /// verbose (per request) logging; use RUST_LOG env for more options
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,

    /// enable pretty logging (format for humans)
    #[arg(long, default_value_t = false)]
    pub pretty: bool,

    /// write the tracing output to the provided (log) file instead of stderr
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    #[arg(long, value_name = "SECONDS", default_value_t = 1.)]
    /// time in-flight requests get to complete after an interrupt,
    /// before they are aborted and the report is printed (<= 0.0 = no limit)
    pub graceful: f64,

    #[cfg(target_family = "unix")]
    /// Set the limit of max open file descriptors for this process and its children.
    #[arg(long, value_name = "N", default_value_t = 262_144)]
    pub ulimit: utils::os::rlim_t,

    /// show this help
    #[arg(long, short = 'h', default_value_t = false)]
    pub help: bool,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    if check_invocation(&args) == Invocation::Usage {
        exit_with_usage();
    }

    utils::telemetry::init_tracing(&args)?;

    #[cfg(target_family = "unix")]
    utils::os::raise_nofile(args.ulimit).context("set file descriptor limit")?;

    let (targets, engine_cfg) = match load_run_input(&args).await {
        Ok(input) => input,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let base_shutdown_signal = graceful::default_signal();
    if let Err(err) = run_with_args(
        base_shutdown_signal,
        args,
        targets,
        engine_cfg,
        std::io::stdout(),
    )
    .await
    {
        eprintln!("🚩 exit with error: {err}");
        std::process::exit(EXIT_CONFIG_ERROR);
    }

    Ok(())
}

/// What to do with the parsed arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Invocation {
    Run,
    /// Print usage and exit with [`EXIT_USAGE`].
    Usage,
}

/// Help requested, or not exactly one of input file and target URL given.
fn check_invocation(args: &Args) -> Invocation {
    if args.help || args.file.is_some() == args.target.is_some() {
        Invocation::Usage
    } else {
        Invocation::Run
    }
}

fn exit_with_usage() -> ! {
    eprintln!("{}", Args::command().render_help());
    std::process::exit(EXIT_USAGE);
}

/// Load and validate everything a run needs before any worker starts.
async fn load_run_input(args: &Args) -> Result<(Targets, EngineConfig), BoxError> {
    let targets = match (&args.file, &args.target) {
        (Some(path), _) => config::load_targets_from_file(path)
            .await
            .context("input file not readable")?,
        (None, Some(raw)) => {
            let uri: Uri = config::parse_target(raw).context("invalid target URL")?;
            Targets::try_new(vec![uri])?
        }
        (None, None) => return Err(BoxError::from("no target URL or input file defined")),
    };

    let engine_cfg = EngineConfig::try_new(config::EngineParams {
        clients: args.clients,
        duration_secs: args.duration,
        wait_secs: args.wait,
        benchmark_mode: args.benchmark_mode,
        policy: if args.internet_mode {
            SelectionPolicy::Random
        } else {
            SelectionPolicy::Sequential
        },
        seed: args.seed,
        failure_penalty_secs: args.failure_penalty,
        request_timeout_secs: args.request_timeout,
        graceful_secs: args.graceful,
    })?;

    Ok((targets, engine_cfg))
}

/// Runs the stampede and blocks until it is finished and reported,
/// a critical error occurs or the (graceful) shutdown has been initiated.
///
/// The report is written to `out`. In-flight requests after an interrupt
/// are bounded by the engine itself (`--graceful`), so the graceful shutdown
/// always waits for the run task and its final report.
///
/// This entry point is used by both the (binary) `main` function as well as
/// for the e2e test suite found in the test module.
async fn run_with_args<F, W>(
    base_shutdown_signal: F,
    args: Args,
    targets: Targets,
    engine_cfg: EngineConfig,
    out: W,
) -> Result<(), BoxError>
where
    F: Future<Output: Send + 'static> + Send + 'static,
    W: std::io::Write + Send + 'static,
{
    let client =
        client::new_web_client(Executor::default()).context("create HTTP(S) web client")?;

    let report_interval =
        (args.report_interval > 0.).then(|| Duration::from_secs_f64(args.report_interval));
    let reporter: Box<dyn Reporter> = if args.json {
        Box::new(JsonReporter::new(report_interval, out))
    } else {
        Box::new(HumanReporter::new(report_interval, out))
    };

    let (error_tx, error_rx) = tokio::sync::mpsc::channel::<BoxError>(1);
    let (fatal_tx, fatal_rx) = tokio::sync::oneshot::channel::<BoxError>();
    let graceful = graceful::Shutdown::new(new_shutdown_signal(
        error_rx,
        fatal_tx,
        base_shutdown_signal,
    ));

    let engine = Engine::new(client, targets, engine_cfg);
    graceful.spawn_task_fn(move |guard| run_stampede(guard, error_tx, engine, reporter));

    let delay = graceful.shutdown().await;
    tracing::debug!("gracefully shutdown with a delay of: {delay:?}");

    match fatal_rx.await {
        Ok(err) => Err(err),
        Err(_) => Ok(()),
    }
}

async fn run_stampede<C>(
    guard: ShutdownGuard,
    error_tx: tokio::sync::mpsc::Sender<BoxError>,
    engine: Engine<C>,
    reporter: Box<dyn Reporter>,
) where
    C: Service<Request, Output = Response, Error = BoxError> + Clone,
{
    tracing::info!(
        clients = engine.config().concurrency,
        targets = engine.targets().len(),
        "starting stampede with {} buffalo...",
        engine.config().concurrency,
    );

    let interrupt = guard.clone_weak().into_cancelled();
    let result = engine
        .run(interrupt, reporter)
        .instrument(tracing::debug_span!(
            "stampede lifetime",
            otel.kind = "client",
            network.protocol.name = "http",
        ))
        .await;

    match result {
        Ok(run_report) => {
            tracing::debug!(
                total = run_report.stats().total(),
                wall_clock = ?run_report.wall_clock(),
                "stampede finished and reported"
            );
        }
        Err(err) => {
            tracing::error!("stampede exited with an error: {err}");
            let _ = error_tx.send(err).await;
        }
    }
}

fn new_shutdown_signal(
    error_rx: tokio::sync::mpsc::Receiver<BoxError>,
    fatal_tx: tokio::sync::oneshot::Sender<BoxError>,
    base_shutdown_signal: impl Future<Output: Send + 'static> + Send + 'static,
) -> impl Future + Send + 'static {
    async move {
        let mut mut_error_rx = error_rx;
        let mut signal = Box::pin(base_shutdown_signal);

        tokio::select! {
            _ = signal.as_mut() => {
                tracing::debug!("default signal triggered: init graceful shutdown");
            }
            err = mut_error_rx.recv() => {
                match err {
                    Some(err) => {
                        tracing::error!("fatal err received: {err}; abort");
                        let _ = fatal_tx.send(err);
                    }
                    None => {
                        tracing::debug!("stampede is finished without error, return control");
                    }
                }
            }
        }
    }
}
