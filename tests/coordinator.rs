mod common;

use common::{coordinator, hosts, ready_session, unverified, verified_us, Script, ScriptedEngine, Tail};
use proxy_broker::relay::{CollectionLimits, DiscoveryMode, FindRequest, GrabRequest};
use proxy_broker::{ProxyType, RequestCoordinator, ServiceError, Session};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

const TICK: Duration = Duration::from_secs(1);

fn host_list(records: &[proxy_broker::ProxyRecord]) -> Vec<String> {
    records.iter().map(|r| r.host.clone()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_us_http_find_returns_verified_batch() {
    let records: Vec<_> = (1..=5)
        .map(|i| verified_us(&format!("198.51.100.{i}"), 3128))
        .collect();
    let engine = ScriptedEngine::new(vec![Script::new(Tail::Finish).push_every(TICK, records)]);
    let coordinator = coordinator(engine.clone());

    let request = FindRequest::new(vec!["HTTP".into(), "HTTPS".into()])
        .with_countries(vec!["US".into()])
        .with_limit(5);
    let batch = coordinator.find(request).await.unwrap();

    assert_eq!(batch.len(), 5);
    assert!(batch.iter().all(|r| r.metrics.map(|m| m.is_working) == Some(true)));
    assert!(batch
        .iter()
        .all(|r| r.geo.country_code.as_deref() == Some("US")));

    let jobs = engine.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].mode, DiscoveryMode::Find);
    assert_eq!(jobs[0].filter.types, vec![ProxyType::Http, ProxyType::Https]);
    assert_eq!(jobs[0].filter.countries, vec!["US".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn test_nothing_before_stall_is_not_found() {
    let engine = ScriptedEngine::new(vec![Script::new(Tail::Hang)]);
    let coordinator = coordinator(engine);

    let started = Instant::now();
    let result = coordinator
        .find(FindRequest::new(vec!["SOCKS5".into()]).with_limit(3))
        .await;

    assert_eq!(result, Err(ServiceError::NotFound));
    assert!(started.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_grab_stall_returns_partial_unverified_batch() {
    let engine = ScriptedEngine::new(vec![
        Script::new(Tail::Hang).push_every(TICK, hosts("10.0.7", 7))
    ]);
    let coordinator = coordinator(engine);

    let batch = coordinator.grab(GrabRequest::new(10)).await.unwrap();

    assert_eq!(batch.len(), 7);
    assert!(batch.iter().all(|r| r.metrics.is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_never_more_than_limit_and_in_arrival_order() {
    let engine = ScriptedEngine::new(vec![
        Script::new(Tail::Finish).push_every(TICK, hosts("10.0.1", 8))
    ]);
    let coordinator = coordinator(engine);

    let batch = coordinator
        .find(FindRequest::new(vec!["HTTP".into()]).with_limit(3))
        .await
        .unwrap();

    assert_eq!(host_list(&batch), vec!["10.0.1.1", "10.0.1.2", "10.0.1.3"]);
}

#[tokio::test(start_paused = true)]
async fn test_stream_end_returns_short_batch_without_stalling() {
    let engine = ScriptedEngine::new(vec![
        Script::new(Tail::Finish).push_every(TICK, hosts("10.0.2", 2))
    ]);
    let coordinator = coordinator(engine);

    let started = Instant::now();
    let batch = coordinator
        .find(FindRequest::new(vec!["HTTP".into()]).with_limit(5))
        .await
        .unwrap();

    assert_eq!(batch.len(), 2);
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_item_budget_restarts_after_each_record() {
    // 4 records 20s apart: 80s total, but no single gap exceeds 30s.
    let engine = ScriptedEngine::new(vec![Script::new(Tail::Hang)
        .push_every(Duration::from_secs(20), hosts("10.0.3", 4))]);
    let coordinator = coordinator(engine);

    let batch = coordinator
        .find(FindRequest::new(vec!["HTTP".into()]).with_limit(4))
        .await
        .unwrap();

    assert_eq!(batch.len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_unknown_type_rejected_before_engine_starts() {
    let engine = ScriptedEngine::new(vec![]);
    let coordinator = coordinator(engine.clone());

    let result = coordinator
        .find(FindRequest::new(vec!["HTTP".into(), "FTP".into()]))
        .await;

    match result {
        Err(ServiceError::InvalidFilter(detail)) => assert!(detail.contains("FTP")),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(engine.starts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_limit_bounds_rejected() {
    let engine = ScriptedEngine::new(vec![]);
    let coordinator = coordinator(engine.clone());

    for limit in [0, 1001] {
        let result = coordinator
            .find(FindRequest::new(vec!["HTTP".into()]).with_limit(limit))
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidFilter(_))));
    }
    assert!(matches!(
        coordinator.grab(GrabRequest::new(0)).await,
        Err(ServiceError::InvalidFilter(_))
    ));
    assert_eq!(engine.starts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_engine_failure_with_empty_batch() {
    let engine = ScriptedEngine::new(vec![Script::new(Tail::Fail("listing unreachable".into()))]);
    let coordinator = coordinator(engine);

    match coordinator.find(FindRequest::new(vec!["HTTP".into()])).await {
        Err(ServiceError::DiscoveryFailed(reason)) => {
            assert!(reason.contains("listing unreachable"))
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_engine_failure_after_records_keeps_batch() {
    let engine = ScriptedEngine::new(vec![Script::new(Tail::Fail("late crash".into()))
        .push_every(TICK, hosts("10.0.4", 2))]);
    let coordinator = coordinator(engine);

    let batch = coordinator
        .find(FindRequest::new(vec!["HTTP".into()]).with_limit(5))
        .await
        .unwrap();

    assert_eq!(host_list(&batch), vec!["10.0.4.1", "10.0.4.2"]);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_requests_do_not_share_records() {
    // The first run keeps pushing long after its window fills.
    let engine = ScriptedEngine::new(vec![
        Script::new(Tail::Finish).push_every(Duration::ZERO, hosts("10.1.0", 6)),
        Script::new(Tail::Finish).push_every(TICK, hosts("10.2.0", 2)),
    ]);
    let coordinator = coordinator(engine.clone());

    let first = coordinator
        .find(FindRequest::new(vec!["HTTP".into()]).with_limit(2))
        .await
        .unwrap();
    let second = coordinator
        .find(FindRequest::new(vec!["HTTP".into()]).with_limit(5))
        .await
        .unwrap();

    assert_eq!(host_list(&first), vec!["10.1.0.1", "10.1.0.2"]);
    assert_eq!(host_list(&second), vec!["10.2.0.1", "10.2.0.2"]);
    assert_eq!(engine.starts(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_requests_are_isolated() {
    let engine = ScriptedEngine::new(vec![
        Script::new(Tail::Finish).push_every(TICK, hosts("10.3.0", 3)),
        Script::new(Tail::Finish).push_every(TICK, hosts("10.4.0", 3)),
    ]);
    let coordinator = coordinator(engine);

    let (a, b) = tokio::join!(
        coordinator.find(FindRequest::new(vec!["HTTP".into()]).with_limit(3)),
        coordinator.grab(GrabRequest::new(3)),
    );
    let (a, b) = (host_list(&a.unwrap()), host_list(&b.unwrap()));

    let a_prefix = &a[0][..6];
    assert!(a.iter().all(|h| h.starts_with(a_prefix)));
    assert!(b.iter().all(|h| !h.starts_with(a_prefix)));
    assert_eq!(coordinator.session().active_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_hung_engine_is_cancelled_at_ceiling() {
    let engine = ScriptedEngine::new(vec![
        Script::new(Tail::Hang).push_every(TICK, vec![unverified("10.0.5.1", 80)])
    ]);
    let coordinator = coordinator(engine);

    let started = Instant::now();
    let batch = coordinator
        .find(FindRequest::new(vec!["HTTP".into()]).with_limit(1))
        .await
        .unwrap();

    assert_eq!(batch.len(), 1);
    assert!(started.elapsed() <= Duration::from_secs(62));
}

#[tokio::test(start_paused = true)]
async fn test_uninitialized_session_is_unavailable() {
    let engine = ScriptedEngine::new(vec![]);
    let session = Arc::new(Session::new(engine.clone(), CollectionLimits::default()));
    let coordinator = RequestCoordinator::new(session);

    assert_eq!(
        coordinator.grab(GrabRequest::new(5)).await,
        Err(ServiceError::Unavailable)
    );
    assert_eq!(engine.starts(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stopped_session_is_unavailable() {
    let engine = ScriptedEngine::new(vec![]);
    let session = ready_session(engine.clone());
    let coordinator = RequestCoordinator::new(session.clone());

    session.stop();

    assert_eq!(
        coordinator.find(FindRequest::new(vec!["HTTP".into()])).await,
        Err(ServiceError::Unavailable)
    );
    assert_eq!(session.init(), Err(ServiceError::AlreadyInitialized));
    assert_eq!(engine.starts(), 0);
}
