use std::time::Duration;

use rama::rt::Executor;

use super::runtime::{TargetServer, UNREACHABLE_URL};
use crate::{
    client,
    config::{EngineConfig, parse_targets},
    engine::{Engine, StatusClass},
    report::JsonReporter,
};

#[tokio::test]
async fn test_stampede_local_server_all_success() {
    let server = TargetServer::spawn().await;
    let targets = parse_targets(&server.url("/ok")).unwrap();

    let engine = Engine::new(
        client::new_web_client(Executor::default()).unwrap(),
        targets,
        EngineConfig::for_test(1, Duration::from_secs(1), Some(Duration::ZERO)),
    );
    let report = engine
        .run(
            std::future::pending::<()>(),
            Box::new(JsonReporter::new(None, std::io::sink())),
        )
        .await
        .unwrap();

    let stats = report.stats();
    assert!(stats.total() > 1, "total: {}", stats.total());
    assert_eq!(stats.count(StatusClass::Success), stats.total());
    assert_eq!(report.availability(), Some(100.));
    assert!(report.wall_clock() >= Duration::from_secs(1));
    assert!(report.throughput() > 0.);
}

#[tokio::test]
async fn test_stampede_local_server_status_classes() {
    let server = TargetServer::spawn().await;
    let content = ["/ok", "/moved", "/missing", "/broken"]
        .map(|path| server.url(path))
        .join("\n");
    let targets = parse_targets(&content).unwrap();

    let engine = Engine::new(
        client::new_web_client(Executor::default()).unwrap(),
        targets,
        EngineConfig::for_test(2, Duration::from_millis(500), Some(Duration::from_millis(10))),
    );
    let report = engine
        .run(
            std::future::pending::<()>(),
            Box::new(JsonReporter::new(None, std::io::sink())),
        )
        .await
        .unwrap();

    let stats = report.stats();
    let class_sum: u64 = StatusClass::ALL.iter().map(|c| stats.count(*c)).sum();
    assert_eq!(stats.total(), class_sum);
    for class in StatusClass::ALL {
        assert!(stats.count(class) > 0, "no {} recorded", class.label());
    }
    assert_eq!(
        stats.count(StatusClass::ServerError) as usize,
        server.broken_hits()
    );
}

#[tokio::test]
async fn test_stampede_unreachable_target_all_failures() {
    let targets = parse_targets(UNREACHABLE_URL).unwrap();

    let config = EngineConfig {
        failure_penalty: Duration::from_millis(100),
        ..EngineConfig::for_test(3, Duration::from_millis(500), Some(Duration::from_millis(50)))
    };
    let engine = Engine::new(
        client::new_web_client(Executor::default()).unwrap(),
        targets,
        config,
    );
    let report = engine
        .run(
            std::future::pending::<()>(),
            Box::new(JsonReporter::new(None, std::io::sink())),
        )
        .await
        .unwrap();

    let stats = report.stats();
    assert!(stats.total() >= 3, "total: {}", stats.total());
    assert_eq!(stats.failures(), stats.total());
    assert_eq!(report.availability(), Some(0.));
    assert_eq!(stats.min_elapsed(), Some(Duration::from_millis(100)));
}
