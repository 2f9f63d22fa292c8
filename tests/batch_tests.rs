#[cfg(test)]
mod tests {
    use async_lanes::{
        batch::{run_all, try_run_all, Batch},
        errors::ExecError,
    };
    use futures::future::{BoxFuture, FutureExt};
    use std::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc,
        },
        time::{Duration, Instant},
    };

    fn tracked(running: &Arc<AtomicUsize>, max_seen: &Arc<AtomicUsize>, pause: Duration) -> BoxFuture<'static, ()> {
        let running = running.clone();
        let max_seen = max_seen.clone();
        async move {
            let now = running.fetch_add(1, Ordering::SeqCst) + 1;
            max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(pause).await;
            running.fetch_sub(1, Ordering::SeqCst);
        }
        .boxed()
    }

    fn late_side_effect(flag: &Arc<AtomicBool>, after: Duration) -> BoxFuture<'static, ()> {
        let flag = flag.clone();
        async move {
            tokio::time::sleep(after).await;
            flag.store(true, Ordering::SeqCst);
        }
        .boxed()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_cap_bounds_concurrency() {
        println!("\n=== TEST: Batch concurrency cap ===");
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..20)
            .map(|_| tracked(&running, &max_seen, Duration::from_millis(5)))
            .collect();
        let results = run_all(tasks, 4, None).await;

        assert_eq!(results.map(|r| r.len()), Ok(20));
        let max = max_seen.load(Ordering::SeqCst);
        assert!(max >= 1 && max <= 4, "saw {} tasks at once with a cap of 4", max);
        println!("  ✓ Peak concurrency: {}", max);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_zero_cap_runs_one_at_a_time() {
        let running = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..5)
            .map(|_| tracked(&running, &max_seen, Duration::from_millis(2)))
            .collect();
        assert_eq!(run_all(tasks, 0, None).await.map(|r| r.len()), Ok(5));
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_batch_returns_immediately() {
        let started = Instant::now();
        let results = run_all(Vec::<BoxFuture<'static, ()>>::new(), 4, Some(Duration::from_millis(1))).await;
        assert_eq!(results, Ok(Vec::new()));
        assert!(started.elapsed() < Duration::from_millis(50));

        let batch = Batch::new(Vec::<BoxFuture<'static, u8>>::new());
        assert!(batch.is_empty());
        assert_eq!(batch.run().await, Ok(Vec::new()));
    }

    #[tokio::test]
    async fn test_results_in_submission_order() {
        let tasks: Vec<BoxFuture<'static, u64>> = (0..8u64)
            .map(|i| {
                async move {
                    tokio::time::sleep(Duration::from_millis(2 * (8 - i))).await;
                    i
                }
                .boxed()
            })
            .collect();

        let results = Batch::new(tasks)
            .max_concurrency(8)
            .timeout(Duration::from_secs(5))
            .run()
            .await;
        assert_eq!(results, Ok((0..8).collect::<Vec<_>>()));
    }

    #[tokio::test]
    async fn test_timeout_cancels_slow_tasks() {
        println!("\n=== TEST: Batch deadline ===");
        let flag = Arc::new(AtomicBool::new(false));
        let started = Instant::now();

        let tasks = vec![
            async {}.boxed(),
            late_side_effect(&flag, Duration::from_millis(300)),
        ];
        let results = run_all(tasks, 2, Some(Duration::from_millis(50))).await;

        assert_eq!(results, Err(ExecError::Timeout(Duration::from_millis(50))));
        assert!(started.elapsed() < Duration::from_millis(250), "batch must return at the deadline");

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!flag.load(Ordering::SeqCst), "slow task kept running after the batch returned");
        println!("  ✓ Timed out and cancelled the slow task");
    }

    #[tokio::test]
    async fn test_first_failure_cancels_siblings() {
        let flag = Arc::new(AtomicBool::new(false));

        let tasks = vec![
            async {
                tokio::time::sleep(Duration::from_millis(10)).await;
                panic!("boom");
            }
            .boxed(),
            late_side_effect(&flag, Duration::from_millis(300)),
        ];
        let results = run_all(tasks, 2, None).await;
        assert_eq!(results, Err(ExecError::TaskFailed("boom".into())));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_try_run_reports_returned_error() {
        let tasks: Vec<BoxFuture<'static, Result<u32, String>>> = vec![
            async { Ok(1) }.boxed(),
            async { Err("bad input".to_owned()) }.boxed(),
            async { Ok(3) }.boxed(),
        ];
        let results = try_run_all(tasks, 1, None).await;
        assert_eq!(results, Err(ExecError::TaskFailed("bad input".into())));

        let ok: Vec<BoxFuture<'static, Result<u32, std::io::Error>>> =
            vec![async { Ok(1) }.boxed(), async { Ok(2) }.boxed()];
        assert_eq!(Batch::new(ok).try_run().await, Ok(vec![1, 2]));
    }

    #[tokio::test]
    async fn test_dropped_batch_tears_down_pool() {
        let flag = Arc::new(AtomicBool::new(false));

        let run = Batch::new(vec![late_side_effect(&flag, Duration::from_millis(200))]).run();
        let waited = tokio::time::timeout(Duration::from_millis(30), run).await;
        assert!(waited.is_err());

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!flag.load(Ordering::SeqCst), "batch task outlived the dropped call");
    }
}
