use anyhow::{Context, anyhow};
use tracing::{info, warn};

use conflux_core::{Task, sleep};
use conflux_exec::{
    ActionTimeout, ParallelQueue, QueueConfig, SerialExecutor, TimeoutConfig, ignore_error,
    parallel_with_errors,
};
use conflux_observe::{LoggerConfig, logger_init};

type Job<T> = Task<T, anyhow::Error>;

fn fetch(name: &'static str, ms: u64) -> Job<String> {
    Task::named(name, move || async move {
        sleep(ms).await;
        if name == "mirror-b" {
            return Err(anyhow!("offline"));
        }
        Ok(format!("{name} answered after {ms}ms"))
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1) Logger
    let cfg = LoggerConfig::from_env()?;
    logger_init(&cfg)?;
    info!(format = %cfg.format, "logger initialized");

    // 2) Fan out to every mirror, keep whatever answered
    let res = parallel_with_errors(vec![
        fetch("mirror-a", 40),
        fetch("mirror-b", 10),
        fetch("mirror-c", 25),
    ])
    .await;
    for (idx, answer) in res.data.iter().enumerate() {
        match answer {
            Some(text) => info!(idx, %text, "mirror answered"),
            None => warn!(idx, "mirror failed"),
        }
    }
    if let Some(err) = res.first_err() {
        warn!(error = %err, "at least one mirror failed");
    }

    // 3) Bounded queue collating per-chunk checksums
    let queue: ParallelQueue<u64, anyhow::Error> = ParallelQueue::new();
    for chunk in 0..8u64 {
        queue.collate(
            format!("chunk-{chunk}"),
            Task::new(move || async move {
                sleep(5 * (8 - chunk)).await;
                Ok(chunk.wrapping_mul(0x9E37_79B9))
            }),
        );
    }
    let sums = queue.run_with(&QueueConfig { concurrency: 3 }).await?;
    info!(chunks = sums.len(), "checksums collated");

    // 4) Serialized writes
    let journal = SerialExecutor::new();
    let mut pending = Vec::new();
    for step in ["open", "write", "fsync", "close"] {
        pending.push(journal.run(Task::<_, anyhow::Error>::named(step, move || async move {
            sleep(3).await;
            Ok(step)
        })));
    }
    info!(busy = journal.is_busy(), "journal steps queued");
    for step in pending {
        let done = step.await?;
        info!(step = done, "journal step done");
    }
    journal.stop().await.context("journal did not stop cleanly")?;

    // 5) Deadline with a tolerated failure
    let timeout = ActionTimeout::new(&TimeoutConfig::new(20).with_message("upload timed out"))
        .with_on_timeout(|| async { warn!("upload abandoned, cleaning up") });
    let upload = timeout.run(Task::<(), anyhow::Error>::new(|| async {
        sleep(100).await;
        Ok(())
    }));
    match ignore_error(upload, &["upload timed out"]).await? {
        Some(()) => info!("upload finished"),
        None => info!("upload skipped after timeout"),
    }

    Ok(())
}
