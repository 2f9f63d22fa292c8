use async_lanes::{Batch, Config, Executors};
use tokio::runtime::Builder;
use tokio::time::Duration;
use std::time::Instant;
use tracing_subscriber::EnvFilter;


fn main(){
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let rt = Builder::new_multi_thread()
    .worker_threads(4)
    .enable_all()
    .build()
    .expect("failed to build tokio runtime");

    rt.block_on(async{
        let now = Instant::now();
        let executors = Executors::new(Config::default());

        let (_, report) = executors.run_until_exit(async {
            for i in 0..1_000 {
                let _ = executors.lanes().submit(&format!("session-{}", i % 8), async move {
                    let _a = i;
                });
            }

            let handles = executors.submit_many_to_pool((0..1_000).map(|i| async move { i * 2 }));
            for handle in handles {
                let _ = handle.await;
            }

            let batch = Batch::new((0..64).map(|i| async move {
                tokio::time::sleep(Duration::from_millis(1)).await;
                i
            }))
            .max_concurrency(8)
            .timeout(Duration::from_secs(5));
            match batch.run().await {
                Ok(results) => println!("batch finished: {} results", results.len()),
                Err(e) => println!("batch failed: {}", e),
            }
        })
        .await;

        println!("shutdown: {:?}", report);
        println!("elapsed: {:?}",now.elapsed());
    });
}
