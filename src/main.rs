use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use slave_worker::worker::{post_process, transform};
use slave_worker::{OutstandingJobs, Worker, WorkerConfig};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let name = std::env::var("SLAVE_WORKER_NAME").unwrap_or_else(|_| "doubler".to_string());
    let job_count: u64 = std::env::var("SLAVE_WORKER_JOBS")
        .unwrap_or_else(|_| "10".to_string())
        .parse()
        .unwrap_or(10);

    let outstanding = Arc::new(OutstandingJobs::new());
    let sum = Arc::new(AtomicU64::new(0));

    let worker: Worker<u64, u64> =
        Worker::new(WorkerConfig::new(name).with_type_tag(b"demo".to_vec()))
            .with_owner(&outstanding);

    let sum_in = Arc::clone(&sum);
    worker.set_work(
        Some(transform(|x: u64| x * 2)),
        Some(post_process(move |y: u64| {
            sum_in.fetch_add(y, Ordering::SeqCst);
        })),
    );
    if let Err(err) = worker.open() {
        if err.is_config() {
            tracing::error!("Worker has no transform configured");
        }
        return Err(err.into());
    }

    for job in 1..=job_count {
        outstanding.add(1);
        worker.submit(job)?;
    }
    outstanding.wait();
    worker.close()?;

    let status = worker.status();
    tracing::info!(
        jobs = status.jobs_completed,
        sum = sum.load(Ordering::SeqCst),
        "Done"
    );
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
