#[cfg(test)]
mod tests {
    use async_lanes::{
        batch::Batch,
        errors::ExecError,
        Config,
        Executors,
    };
    use std::{
        future::Future,
        time::{Duration, Instant},
    };

    async fn measure<F, Fut, T>(name: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let start = Instant::now();
        let result = f().await;
        let elapsed = start.elapsed();
        println!("✓ {}: {:?}", name, elapsed);
        result
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_1_many_lanes() {
        println!("\n=== LOAD TEST 1: 100 lanes x 100 tasks ===");
        let executors = Executors::new(Config::io_bound());

        let handles: Vec<_> = measure("submit 10k lane tasks", || async {
            (0..10_000)
                .map(|i| {
                    executors.lanes().submit(&format!("lane-{}", i % 100), async move {
                        tokio::time::sleep(Duration::from_micros(100)).await;
                        i
                    })
                })
                .collect()
        })
        .await;

        let results = measure("await 10k lane tasks", || futures::future::join_all(handles)).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 10_000);
        assert_eq!(executors.lanes().len(), 100);

        let report = measure("shutdown 100 lanes", || executors.shutdown_all()).await;
        assert_eq!(report.lanes_drained, 100);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_2_shared_pool() {
        println!("\n=== LOAD TEST 2: 10k tasks on the shared pool ===");
        let executors = Executors::new(Config::default());

        let handles = executors.submit_many_to_pool((0..10_000).map(|x| async move {
            tokio::time::sleep(Duration::from_micros(100)).await;
            x * 2
        }));
        let results = measure("10k pool tasks @ 100μs", || futures::future::join_all(handles)).await;

        assert_eq!(results.len(), 10_000);
        let metrics = executors.pool_metrics().expect("pool in use");
        println!("  Completed: {}/{}", metrics.completed_tasks, results.len());
        println!("  Utilization: {:.1}%", metrics.utilization() * 100.0);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_3_blocking_lanes() {
        println!("\n=== LOAD TEST 3: Blocking tasks across lanes ===");
        let executors = Executors::new(Config::cpu_bound());

        let handles: Vec<_> = (0..400)
            .map(|i| {
                executors.lanes().submit_blocking(&format!("blocking-{}", i % 16), move || {
                    std::thread::sleep(Duration::from_millis(1));
                    i * i
                })
            })
            .collect();

        let results = measure("400 blocking lane tasks", || futures::future::join_all(handles)).await;
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 400);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_4_large_batch() {
        println!("\n=== LOAD TEST 4: 20k task batch, cap 200 ===");
        let results = measure("20k batch", || {
            Batch::new((0..20_000).map(|x| async move {
                tokio::time::sleep(Duration::from_micros(50)).await;
                x % 1000
            }))
            .max_concurrency(200)
            .timeout(Duration::from_secs(60))
            .run()
        })
        .await;

        assert_eq!(results.map(|r| r.len()), Ok(20_000));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_5_stress_with_panics() {
        println!("\n=== LOAD TEST 5: Lanes under panics ===");

        // Silence panic output in this test
        std::panic::set_hook(Box::new(|_| {}));

        let executors = Executors::new(Config::default());
        let handles: Vec<_> = (0..1_000)
            .map(|x| {
                executors.lanes().submit(&format!("stress-{}", x % 10), async move {
                    if x % 10 == 0 {
                        panic!("Intentional panic at {}", x);
                    }
                    tokio::time::sleep(Duration::from_micros(100)).await;
                    x
                })
            })
            .collect();

        let results = measure("1k lane tasks (10% panic)", || futures::future::join_all(handles)).await;
        let successful = results.iter().filter(|r| r.is_ok()).count();
        let panicked = results
            .iter()
            .filter(|r| matches!(r, Err(ExecError::TaskFailed(_))))
            .count();

        println!("  Successful: {}", successful);
        println!("  Panics caught: {}", panicked);

        let _ = std::panic::take_hook();

        assert_eq!(successful, 900);
        assert_eq!(panicked, 100);
        assert_eq!(executors.shutdown_all().await.lanes_drained, 10);
    }
}
