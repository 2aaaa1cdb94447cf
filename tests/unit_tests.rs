#[cfg(test)]
mod tests {
    use loop_bridge::{
        errors::BridgeError,
        model::{DelegationState, JoinOrdering},
        pool::BridgePoolInner,
        Config,
    };
    use std::{
        cell::RefCell,
        collections::HashSet,
        rc::Rc,
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
        time::{Duration, Instant},
    };
    use thiserror::Error;
    use tokio::sync::oneshot;

    #[derive(Debug, Error, PartialEq)]
    enum TestError {
        #[error("ValueError: {0}")]
        Value(String),
        #[error(transparent)]
        Bridge(#[from] BridgeError),
    }

    async fn resolve() -> &'static str {
        "Expected Value"
    }

    async fn reject() -> Result<(), TestError> {
        Err(TestError::Value("Expected Exception".into()))
    }

    #[tokio::test]
    async fn test_resolve_directly() {
        assert_eq!(resolve().await, "Expected Value");
    }

    #[tokio::test]
    async fn test_reject_directly() {
        let err = reject().await.unwrap_err();
        assert_eq!(err, TestError::Value("Expected Exception".into()));
        assert_eq!(err.to_string(), "ValueError: Expected Exception");
    }

    #[tokio::test]
    async fn test_bridge_resolves_after_delay() {
        println!("\n=== TEST: delegated work item with a delay ===");
        let pool = BridgePoolInner::new(2, None).unwrap();
        let delay = Duration::from_millis(100);

        let started = Instant::now();
        let result = pool
            .run(move || async move {
                tokio::time::sleep(delay).await;
                "Expected Result"
            })
            .await;

        assert_eq!(result, Ok("Expected Result"));
        assert!(started.elapsed() >= delay, "finished before the work item slept");
        println!("  ✓ settled after {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_bridge_is_transparent() {
        let pool = BridgePoolInner::new(2, None).unwrap();

        let value = pool.run(|| resolve()).await.unwrap();
        assert_eq!(value, resolve().await);

        let bridged = pool.try_run(|| reject()).await.unwrap_err();
        let direct = reject().await.unwrap_err();
        assert_eq!(bridged, direct);
    }

    #[tokio::test]
    async fn test_outer_loop_keeps_running() {
        println!("\n=== TEST: outer loop is not blocked ===");
        let pool = BridgePoolInner::new(1, None).unwrap();
        let ticks = Arc::new(AtomicUsize::new(0));

        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::Relaxed);
                }
            })
        };

        let result = pool
            .run(|| async {
                tokio::time::sleep(Duration::from_millis(300)).await;
                42
            })
            .await;
        ticker.abort();

        let seen = ticks.load(Ordering::Relaxed);
        println!("  outer ticks while waiting: {}", seen);
        assert_eq!(result, Ok(42));
        assert!(seen >= 5, "outer loop only ticked {} times", seen);
    }

    #[tokio::test]
    async fn test_concurrent_delegations_do_not_mix() {
        println!("\n=== TEST: two concurrent delegations ===");
        let pool = BridgePoolInner::new(2, None).unwrap();
        let outer_thread = std::thread::current().id();

        let handles: Vec<_> = ["left", "right"]
            .into_iter()
            .map(|label| {
                pool.spawn_with_context(move |ctx| async move {
                    ctx.sleep(Duration::from_millis(50)).await;
                    let thread = std::thread::current().id();
                    (label, ctx.id(), ctx.worker_name().to_string(), thread)
                })
            })
            .collect();
        let ids: Vec<u64> = handles.iter().map(|h| h.id()).collect();

        let results = pool.join_handles(handles, JoinOrdering::Ordered).await;
        let results: Vec<_> = results.into_iter().map(Result::unwrap).collect();

        assert_eq!(results[0].0, "left");
        assert_eq!(results[1].0, "right");
        assert_eq!(results[0].1, ids[0]);
        assert_eq!(results[1].1, ids[1]);
        assert_ne!(results[0].2, results[1].2, "both ran on the same worker");
        for (_, _, worker, thread) in &results {
            assert!(worker.starts_with("loop-bridge-"), "unexpected worker {}", worker);
            assert_ne!(*thread, outer_thread);
        }
    }

    #[tokio::test]
    async fn test_panic_is_reported_and_worker_survives() {
        let pool = BridgePoolInner::new(1, None).unwrap();

        let result: Result<(), _> = pool.run(|| async { panic!("Expected Panic") }).await;
        assert_eq!(result, Err(BridgeError::Panic("Expected Panic".into())));

        assert_eq!(pool.run(|| async { 7 }).await, Ok(7));
        pool.join_all().await;
        let metrics = pool.metrics();
        assert_eq!(metrics.failed_tasks, 1);
        assert_eq!(metrics.completed_tasks, 1);
    }

    #[tokio::test]
    async fn test_rejected_after_shutdown() {
        let pool = BridgePoolInner::new(2, None).unwrap();
        assert_eq!(pool.run(|| async { 1 }).await, Ok(1));

        pool.shutdown().await;
        assert!(pool.is_shutdown());

        let handle = pool.spawn(|| async { 2 });
        assert!(handle.is_settled());
        assert!(matches!(handle.await, Err(BridgeError::ResourceUnavailable(_))));

        let err = pool.try_run(|| async { Ok::<_, TestError>(3) }).await.unwrap_err();
        assert!(matches!(err, TestError::Bridge(BridgeError::ResourceUnavailable(_))));

        let metrics = pool.metrics();
        assert_eq!(metrics.rejected_tasks, 2);
        assert_eq!(metrics.active_tasks, 0);
    }

    struct Bomb;

    impl Drop for Bomb {
        fn drop(&mut self) {
            panic!("Expected Drop Panic");
        }
    }

    #[tokio::test]
    async fn test_unclaimed_outcome_panicking_on_drop_still_settles() {
        let pool = BridgePoolInner::new(1, None).unwrap();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let handle = pool.spawn(move || async move {
            let _ = release_rx.await;
            Bomb
        });
        drop(handle);
        release_tx.send(()).unwrap();

        assert!(pool.join_all_timeout(Duration::from_secs(5)).await);
        assert_eq!(pool.run(|| async { 5 }).await, Ok(5));

        let metrics = pool.metrics();
        assert_eq!(metrics.active_tasks, 0);
        assert_eq!(metrics.live_workers, 1);
        assert_eq!(metrics.completed_tasks, 2);
    }

    #[tokio::test]
    async fn test_shutdown_joins_worker_threads() {
        let pool = BridgePoolInner::new(3, None).unwrap();
        assert_eq!(pool.metrics().live_workers, 3);
        assert_eq!(pool.run(|| async { 1 }).await, Ok(1));

        pool.shutdown().await;
        let metrics = pool.metrics();
        assert_eq!(metrics.live_workers, 0);
        assert_eq!(metrics.idle_workers, 0);

        // a second shutdown has nothing left to join
        pool.shutdown().await;
        assert!(pool.is_shutdown());
    }

    #[cfg(target_os = "linux")]
    async fn wait_for_threads_named(prefix: &str, expected: usize) -> bool {
        for _ in 0..100 {
            let count = std::fs::read_dir("/proc/self/task")
                .unwrap()
                .filter_map(|entry| std::fs::read_to_string(entry.ok()?.path().join("comm")).ok())
                .filter(|comm| comm.starts_with(prefix))
                .count();
            if count == expected {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_no_worker_thread_outlives_shutdown() {
        let config = Config {
            num_threads: 4,
            thread_name: "joined-w".to_string(),
            ..Config::default()
        };
        let pool = BridgePoolInner::with_config(config).unwrap();
        assert!(wait_for_threads_named("joined-w", 4).await);

        assert_eq!(pool.run(|| async { "done" }).await, Ok("done"));
        pool.shutdown().await;

        assert!(wait_for_threads_named("joined-w", 0).await);
    }

    #[tokio::test]
    async fn test_full_queue_rejects_and_state_transitions() {
        println!("\n=== TEST: pool exhaustion ===");
        let pool = BridgePoolInner::new(1, Some(1)).unwrap();
        let (started_tx, started_rx) = oneshot::channel::<()>();
        let (release_tx, release_rx) = oneshot::channel::<()>();

        let mut first = pool.spawn(move || async move {
            let _ = started_tx.send(());
            let _ = release_rx.await;
            1
        });
        started_rx.await.unwrap();
        assert_eq!(first.state(), DelegationState::Pending);

        let second = pool.spawn(|| async { 2 });
        let third = pool.spawn(|| async { 3 });
        assert_eq!(second.state(), DelegationState::Pending);
        assert_eq!(third.state(), DelegationState::Settled);
        assert_eq!(
            third.await,
            Err(BridgeError::ResourceUnavailable("submission queue is full".into()))
        );

        release_tx.send(()).unwrap();
        assert_eq!((&mut first).await, Ok(1));
        assert_eq!(first.state(), DelegationState::Settled);
        assert_eq!(second.await, Ok(2));

        pool.join_all().await;
        let metrics = pool.metrics();
        assert_eq!(metrics.total_spawned, 2);
        assert_eq!(metrics.completed_tasks, 2);
        assert_eq!(metrics.rejected_tasks, 1);
        println!(
            "  ✓ rejected {} of {}",
            metrics.rejected_tasks,
            metrics.total_spawned + metrics.rejected_tasks
        );
    }

    #[tokio::test]
    async fn test_non_send_work_item() {
        let pool = BridgePoolInner::new(1, None).unwrap();

        let result = pool
            .spawn_with_context(|ctx| async move {
                let log = Rc::new(RefCell::new(Vec::new()));
                let inner = log.clone();
                ctx.spawn_local(async move { inner.borrow_mut().push("local") })
                    .await
                    .unwrap();
                log.borrow_mut().push("main");
                let joined = log.borrow().join(",");
                joined
            })
            .await;

        assert_eq!(result, Ok("local,main".to_string()));
    }

    #[tokio::test]
    async fn test_local_tasks_drained_before_settling() {
        let pool = BridgePoolInner::new(1, None).unwrap();
        let flag = Arc::new(AtomicBool::new(false));
        let seen = flag.clone();

        let result = pool
            .spawn_with_context(move |ctx| async move {
                let _ = ctx.spawn_local(async move {
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    seen.store(true, Ordering::SeqCst);
                });
                "main done"
            })
            .await;

        assert_eq!(result, Ok("main done"));
        assert!(flag.load(Ordering::SeqCst), "local task was not drained");
    }

    #[test]
    fn test_foreign_outer_executor() {
        let pool = BridgePoolInner::new(1, None).unwrap();
        let result = futures::executor::block_on(pool.run(|| async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            "Expected Result"
        }));
        assert_eq!(result, Ok("Expected Result"));
    }

    #[tokio::test]
    async fn test_join_orderings() {
        let pool = BridgePoolInner::new(4, None).unwrap();
        let spawn_all = || {
            (0..4u64)
                .map(|i| {
                    pool.spawn(move || async move {
                        tokio::time::sleep(Duration::from_millis(10 * (4 - i))).await;
                        i
                    })
                })
                .collect::<Vec<_>>()
        };

        let ordered = pool.join_handles(spawn_all(), JoinOrdering::Ordered).await;
        let ordered: Vec<u64> = ordered.into_iter().map(Result::unwrap).collect();
        assert_eq!(ordered, vec![0, 1, 2, 3]);

        let unordered = pool.join_handles(spawn_all(), JoinOrdering::UnOrdered).await;
        let unordered: HashSet<u64> = unordered.into_iter().map(Result::unwrap).collect();
        assert_eq!(unordered, (0..4).collect::<HashSet<u64>>());

        assert!(pool.join_handles::<u64>(Vec::new(), JoinOrdering::Ordered).await.is_empty());
    }

    #[tokio::test]
    async fn test_metrics_after_join_all() {
        let pool = BridgePoolInner::new(4, None).unwrap();
        for i in 0..10 {
            drop(pool.spawn(move || async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                i
            }));
        }

        pool.join_all().await;
        let metrics = pool.metrics();
        assert_eq!(metrics.active_tasks, 0);
        assert_eq!(metrics.queued_tasks, 0);
        assert_eq!(metrics.total_spawned, 10);
        assert_eq!(metrics.completed_tasks, 10);
        assert_eq!(metrics.success_rate(), 1.0);
    }

    #[tokio::test]
    async fn test_monitoring_releases_pool() {
        let pool = BridgePoolInner::new(2, None).unwrap();
        let initial_count = Arc::strong_count(&pool);
        let calls = Arc::new(AtomicUsize::new(0));

        let token = {
            let calls = calls.clone();
            pool.start_monitoring(Duration::from_millis(10), move |_| {
                calls.fetch_add(1, Ordering::Relaxed);
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(Arc::strong_count(&pool), initial_count + 1);

        BridgePoolInner::stop_monitoring(token);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(Arc::strong_count(&pool), initial_count, "monitor kept the pool alive");
        assert!(calls.load(Ordering::Relaxed) > 0);
    }

    #[tokio::test]
    async fn test_monitoring_stops_on_shutdown() {
        let pool = BridgePoolInner::new(1, None).unwrap();
        let initial_count = Arc::strong_count(&pool);
        let _token = pool.start_monitoring(Duration::from_millis(10), |_| {});

        assert!(pool.shutdown_timeout(Duration::from_secs(1)).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(Arc::strong_count(&pool), initial_count);
    }

    #[test]
    fn test_invalid_config() {
        let config = Config {
            num_threads: 0,
            ..Config::default()
        };
        assert!(matches!(
            BridgePoolInner::with_config(config),
            Err(BridgeError::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_config_file_names_workers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pool.toml");
        std::fs::write(&path, "num_threads = 1\nmax_pending = 4\nthread_name = \"cfg-worker\"\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.max_pending, Some(4));
        let pool = BridgePoolInner::with_config(config).unwrap();

        let worker = pool
            .spawn_with_context(|ctx| async move { ctx.worker_name().to_string() })
            .await
            .unwrap();
        assert_eq!(worker, "cfg-worker-0");
    }
}
