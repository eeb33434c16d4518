use std::time::{Duration, Instant};

use clap::Parser as _;

use super::runtime::{SLOW_RESPONSE_DELAY, SharedBuffer, TargetServer};
use crate::{Args, Invocation, check_invocation, load_run_input, run_with_args};

fn args(extra: &[&str]) -> Args {
    Args::try_parse_from(std::iter::once("stampede").chain(extra.iter().copied())).unwrap()
}

#[tokio::test]
async fn test_run_with_args_single_target() {
    let server = TargetServer::spawn().await;
    let url = server.url("/ok");

    let args = args(&[url.as_str(), "-c", "2", "-t", "1", "-b", "--report-interval", "0"]);
    let (targets, engine_cfg) = load_run_input(&args).await.unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(engine_cfg.concurrency, 2);
    assert_eq!(engine_cfg.wait, Some(Duration::ZERO));

    let out = SharedBuffer::default();
    run_with_args(
        std::future::pending::<()>(),
        args,
        targets,
        engine_cfg,
        out.clone(),
    )
    .await
    .unwrap();

    let report = out.contents();
    assert!(report.contains("Response codes:"), "{report}");
    assert!(report.contains("[5xx]:\t0"), "{report}");
    assert!(report.contains("Availability:\t100.00%"), "{report}");
}

#[tokio::test]
async fn test_run_with_args_target_file_json() {
    let server = TargetServer::spawn().await;

    let path = std::env::temp_dir().join(format!("stampede-e2e-{}.txt", std::process::id()));
    tokio::fs::write(
        &path,
        format!("{}\n\n{}\n", server.url("/ok"), server.url("/missing")),
    )
    .await
    .unwrap();

    let args = args(&[
        "-f",
        path.to_str().unwrap(),
        "-t",
        "1",
        "-w",
        "-1",
        "-i",
        "--seed",
        "3",
        "--json",
    ]);
    let (targets, engine_cfg) = load_run_input(&args).await.unwrap();
    let _ = tokio::fs::remove_file(&path).await;

    assert_eq!(targets.len(), 2);
    assert_eq!(engine_cfg.wait, None);
    assert_eq!(engine_cfg.seed, 3);

    let out = SharedBuffer::default();
    run_with_args(
        std::future::pending::<()>(),
        args,
        targets,
        engine_cfg,
        out.clone(),
    )
    .await
    .unwrap();

    let contents = out.contents();
    let last: serde_json::Value = serde_json::from_str(contents.lines().last().unwrap()).unwrap();
    assert_eq!(last["type"], "final");
    assert_eq!(last["codes"]["3xx"], 0);
    assert_eq!(last["codes"]["5xx"], 0);
    assert!(last["total"].as_u64().unwrap() > 0);
}

async fn run_interrupted(extra: &[&str]) -> (String, Duration) {
    let server = TargetServer::spawn().await;
    let url = server.url("/slow");

    let mut argv = vec![url.as_str(), "-c", "1", "-t", "60", "--report-interval", "0"];
    argv.extend_from_slice(extra);
    let args = args(&argv);
    let (targets, engine_cfg) = load_run_input(&args).await.unwrap();

    let out = SharedBuffer::default();
    let start = Instant::now();
    run_with_args(
        tokio::time::sleep(Duration::from_millis(300)),
        args,
        targets,
        engine_cfg,
        out.clone(),
    )
    .await
    .unwrap();

    (out.contents(), start.elapsed())
}

#[tokio::test]
async fn test_interrupt_with_slow_in_flight_request_still_reports() {
    // default --graceful (1s) is shorter than the in-flight request
    let (report, elapsed) = run_interrupted(&[]).await;

    assert!(elapsed < SLOW_RESPONSE_DELAY, "elapsed: {elapsed:?}");
    assert!(report.contains("Response codes:"), "{report}");
    assert!(report.contains("Total requests:\t0"), "{report}");
    assert!(report.contains("[avg]:\tn/a"), "{report}");
    assert!(report.contains("Wall clock:"), "{report}");
}

#[tokio::test]
async fn test_interrupt_without_graceful_limit_waits_for_in_flight_request() {
    let (report, elapsed) = run_interrupted(&["--graceful", "0"]).await;

    assert!(elapsed >= SLOW_RESPONSE_DELAY, "elapsed: {elapsed:?}");
    assert!(report.contains("[2xx]:\t1"), "{report}");
    assert!(report.contains("Total requests:\t1"), "{report}");
    assert!(report.contains("Availability:\t100.00%"), "{report}");
}

#[tokio::test]
async fn test_load_run_input_errors() {
    let missing = args(&["-f", "/definitely/not/a/stampede/file.txt"]);
    let err = load_run_input(&missing).await.unwrap_err();
    let msg = format!("{err} {err:?}");
    assert!(msg.contains("input file not readable"), "{msg}");

    let bad_url = args(&["ftp://example.com/"]);
    assert!(load_run_input(&bad_url).await.is_err());

    let no_clients = args(&["http://example.com/", "-c", "0"]);
    assert!(load_run_input(&no_clients).await.is_err());
}

#[test]
fn test_check_invocation() {
    for (argv, expected) in [
        (&[][..], Invocation::Usage),
        (&["http://example.com/", "-f", "targets.txt"][..], Invocation::Usage),
        (&["-h"][..], Invocation::Usage),
        (&["--help", "http://example.com/"][..], Invocation::Usage),
        (&["-h", "-f", "targets.txt"][..], Invocation::Usage),
        (&["http://example.com/"][..], Invocation::Run),
        (&["-f", "targets.txt", "-c", "3"][..], Invocation::Run),
    ] {
        assert_eq!(check_invocation(&args(argv)), expected, "argv: {argv:?}");
    }
}

#[test]
fn test_args_defaults() {
    let args = args(&["http://example.com/"]);
    assert_eq!(args.clients, 10);
    assert_eq!(args.duration, 30);
    assert_eq!(args.wait, 1);
    assert_eq!(args.graceful, 1.);
    assert!(!args.internet_mode);
    assert!(!args.benchmark_mode);
    assert!(!args.help);
}
