//! Copyright (c) 2025, Kirky.X
//!
//! MIT License
//!
//! 单飞模式集成测试

#[path = "../common/mod.rs"]
mod common;

use common::{console_session, setup_logging, RecordingSink, ScriptedGateway};
use opscache::config::QueryCacheConfig;
use opscache::metrics::QueryEvent;
use opscache::{CacheKey, Operation, QueryCache, QueryStatus, SyncError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Barrier, Semaphore};

#[tokio::test]
async fn test_two_rapid_reads_share_one_fetch() {
    let gateway = Arc::new(
        ScriptedGateway::returning(json!([{ "id": "d1", "name": "Support" }]))
            .with_delay(Duration::from_millis(50)),
    );
    let (session, _sink) = console_session(gateway.clone());
    let params = json!({ "includeInactive": false });

    let (a, b) = tokio::join!(
        session.list("departments", &params),
        session.list("departments", &params)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(gateway.call_count(), 1);
    assert_eq!(a.status, QueryStatus::Success);
    assert_eq!(a.data, b.data);
    assert_eq!(
        session.cache().metrics().get("departments", QueryEvent::Joined),
        1
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_readers_across_tasks() {
    let gateway = Arc::new(
        ScriptedGateway::returning(json!({ "id": "c1" })).with_delay(Duration::from_millis(100)),
    );
    let (session, _sink) = console_session(gateway.clone());
    let session = Arc::new(session);
    let barrier = Arc::new(Barrier::new(16));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let session = session.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            session.get("campaign", "campaigns", "c1").await
        }));
    }

    for handle in handles {
        let state = handle.await.unwrap();
        assert_eq!(state.data, Some(json!({ "id": "c1" })));
    }
    assert_eq!(gateway.call_count(), 1);
}

#[tokio::test]
async fn test_failed_fetch_shared_and_notified_once() {
    let gateway = Arc::new(
        ScriptedGateway::new(|_, _, _| {
            Err(SyncError::Transport {
                status: Some(503),
                message: "upstream unavailable".to_string(),
            })
        })
        .with_delay(Duration::from_millis(50)),
    );
    let (session, sink) = console_session(gateway.clone());

    let params = json!({});
    let (a, b) = tokio::join!(
        session.list("crm-alerts", &params),
        session.list("crm-alerts", &params)
    );
    let (a, b) = (a.unwrap(), b.unwrap());

    assert_eq!(gateway.call_count(), 1);
    assert_eq!(a.status, QueryStatus::Error);
    assert_eq!(a.error, b.error);
    assert_eq!(
        sink.messages(),
        vec!["Something went wrong. Please try again.".to_string()]
    );
}

#[tokio::test]
async fn test_refetch_wins_over_older_fetch() {
    setup_logging();
    let cache = QueryCache::unbounded();
    let key = CacheKey::new("tickets");
    let calls = Arc::new(AtomicUsize::new(0));
    let (old_tx, old_rx) = oneshot::channel::<Value>();
    let old_rx = Arc::new(Mutex::new(Some(old_rx)));

    let fetcher = {
        let calls = calls.clone();
        move || {
            let first = calls.fetch_add(1, Ordering::SeqCst) == 0;
            let rx = if first { old_rx.lock().unwrap().take() } else { None };
            async move {
                match rx {
                    Some(rx) => Ok(rx.await.unwrap_or(Value::Null)),
                    None => Ok(json!(["new"])),
                }
            }
        }
    };

    let reader = {
        let cache = cache.clone();
        let key = key.clone();
        tokio::spawn(async move { cache.read(key, fetcher).await })
    };

    let mut watcher = cache.subscribe(&key);
    watcher
        .wait_for(|s| s.status == QueryStatus::Loading)
        .await
        .unwrap();

    let refreshed = cache.refetch(&key).await.unwrap();
    assert_eq!(refreshed.data, Some(json!(["new"])));

    old_tx.send(json!(["old"])).unwrap();
    reader.await.unwrap();

    let stored = cache.peek(&key).unwrap();
    assert_eq!(stored.status, QueryStatus::Success);
    assert_eq!(stored.data, Some(json!(["new"])));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(cache.metrics().get("tickets", QueryEvent::Superseded), 1);
}

#[tokio::test]
async fn test_mutation_during_fetch_prevents_stale_store() {
    let gate = Arc::new(Semaphore::new(0));
    let gateway = Arc::new(
        ScriptedGateway::new(|_, operation, _| match operation {
            Operation::List => Ok(json!(["before-create"])),
            _ => Ok(json!({ "id": "t9" })),
        })
        .with_read_gate(gate.clone()),
    );
    let (session, _sink) = console_session(gateway.clone());
    let session = Arc::new(session);
    let key = CacheKey::new("tickets");

    let reader = {
        let session = session.clone();
        tokio::spawn(async move { session.list("tickets", &json!({})).await })
    };
    let mut watcher = session.cache().subscribe(&key);
    watcher
        .wait_for(|s| s.status == QueryStatus::Loading)
        .await
        .unwrap();

    session
        .mutate("tickets.create", json!({ "title": "New" }))
        .await
        .unwrap();
    gate.add_permits(1);

    let returned = reader.await.unwrap().unwrap();
    assert_eq!(returned.data, Some(json!(["before-create"])));
    assert_eq!(session.cache().peek(&key).unwrap().status, QueryStatus::Idle);

    // 下一次读取重新请求
    gate.add_permits(1);
    session.list("tickets", &json!({})).await.unwrap();
    assert_eq!(gateway.calls_to("tickets"), 3);
}

#[tokio::test]
async fn test_observers_see_loading_then_success() {
    let cache = QueryCache::new(&QueryCacheConfig::default(), RecordingSink::new());
    let key = CacheKey::new("subscriptions");
    let mut first = cache.subscribe(&key);
    let mut second = cache.subscribe(&key);
    let (tx, rx) = oneshot::channel::<Value>();
    let rx = Arc::new(Mutex::new(Some(rx)));

    let reader = {
        let cache = cache.clone();
        let key = key.clone();
        tokio::spawn(async move {
            cache
                .read(key, move || {
                    let rx = rx.lock().unwrap().take();
                    async move {
                        match rx {
                            Some(rx) => Ok(rx.await.unwrap_or(Value::Null)),
                            None => Ok(Value::Null),
                        }
                    }
                })
                .await
        })
    };

    for watcher in [&mut first, &mut second] {
        watcher
            .wait_for(|s| s.status == QueryStatus::Loading)
            .await
            .unwrap();
    }
    tx.send(json!([{ "id": "s1" }])).unwrap();
    reader.await.unwrap();

    for watcher in [&mut first, &mut second] {
        let state = watcher
            .wait_for(|s| s.status == QueryStatus::Success)
            .await
            .unwrap()
            .clone();
        assert_eq!(state.data, Some(json!([{ "id": "s1" }])));
        assert_eq!(state.fetch_count, 1);
    }
}
