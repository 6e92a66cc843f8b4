use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use conflux_core::Task;
use tracing::{debug, instrument, trace};

use crate::{config::QueueConfig, parallel::parallel};

/// Results of keyed entries, indexed by key.
pub type ResultMap<T> = HashMap<String, T>;

struct Entry<T, E> {
    key: Option<String>,
    task: Task<T, E>,
}

struct QueueState<T, E> {
    entries: VecDeque<Entry<T, E>>,
    results: ResultMap<T>,
}

/// FIFO work queue drained by a fixed number of worker loops.
///
/// Entries added with [`collate`](Self::collate) store their value under a key;
/// values of entries added with [`add`](Self::add) are dropped. Each worker pops
/// one entry at a time, so dequeue order is FIFO while completion order is not.
pub struct ParallelQueue<T, E> {
    inner: Arc<Mutex<QueueState<T, E>>>,
}

impl<T, E> ParallelQueue<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueState {
                entries: VecDeque::new(),
                results: HashMap::new(),
            })),
        }
    }

    /// Appends an entry whose value is discarded.
    pub fn add(&self, task: Task<T, E>) {
        lock(&self.inner).entries.push_back(Entry { key: None, task });
    }

    /// Appends an entry whose value is stored under `key`. Last write wins.
    pub fn collate(&self, key: impl Into<String>, task: Task<T, E>) {
        lock(&self.inner).entries.push_back(Entry {
            key: Some(key.into()),
            task,
        });
    }

    /// Entries not yet popped by a worker.
    pub fn len(&self) -> usize {
        lock(&self.inner).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).entries.is_empty()
    }

    pub async fn run_with(&self, cfg: &QueueConfig) -> Result<ResultMap<T>, E> {
        self.run(cfg.concurrency).await
    }

    /// Drains the queue with `concurrency` worker loops.
    ///
    /// A failing entry ends its worker and the error is returned once every
    /// worker has exited; entries no worker reached remain queued. Workers that
    /// already started keep draining if the returned future is dropped.
    #[instrument(level = "debug", skip(self), fields(pending = self.len()))]
    pub async fn run(&self, concurrency: usize) -> Result<ResultMap<T>, E> {
        let workers = (0..concurrency.max(1)).map(|worker| {
            let inner = Arc::clone(&self.inner);
            Task::named("queue-worker", move || drain(inner, worker))
        });
        parallel(workers).await?;

        let results = std::mem::take(&mut lock(&self.inner).results);
        debug!(collated = results.len(), "queue drained");
        Ok(results)
    }
}

impl<T, E> Default for ParallelQueue<T, E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

async fn drain<T, E>(inner: Arc<Mutex<QueueState<T, E>>>, worker: usize) -> Result<(), E>
where
    T: Send + 'static,
    E: Send + 'static,
{
    loop {
        let next = lock(&inner).entries.pop_front();
        let Some(Entry { key, task }) = next else {
            break;
        };

        trace!(worker, task = task.name(), key = key.as_deref(), "entry popped");
        let value = task.run().await?;

        if let Some(key) = key {
            lock(&inner).results.insert(key, value);
        }
    }
    trace!(worker, "worker exited");
    Ok(())
}

fn lock<S>(m: &Mutex<S>) -> MutexGuard<'_, S> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use anyhow::anyhow;
    use conflux_core::sleep;

    use super::*;

    type Queue = ParallelQueue<u64, anyhow::Error>;

    #[tokio::test(start_paused = true)]
    async fn collates_every_keyed_entry() {
        let queue = Queue::new();
        for (i, ms) in [30u64, 5, 20, 1, 10].into_iter().enumerate() {
            queue.collate(
                format!("k{i}"),
                Task::new(move || async move {
                    sleep(ms).await;
                    Ok(ms * 2)
                }),
            );
        }

        let results = queue.run(2).await.unwrap();

        assert_eq!(results.len(), 5);
        assert_eq!(results["k0"], 60);
        assert_eq!(results["k1"], 10);
        assert_eq!(results["k2"], 40);
        assert_eq!(results["k3"], 2);
        assert_eq!(results["k4"], 20);
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unkeyed_results_are_discarded() {
        let queue = Queue::new();
        let ran = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let ran = Arc::clone(&ran);
            queue.add(Task::new(move || async move {
                ran.fetch_add(1, Ordering::SeqCst);
                Ok(1)
            }));
        }
        queue.collate("only", Task::new(|| async { Ok(42) }));

        let results = queue.run_with(&QueueConfig::default()).await.unwrap();

        assert_eq!(ran.load(Ordering::SeqCst), 3);
        assert_eq!(results.len(), 1);
        assert_eq!(results["only"], 42);
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_concurrency() {
        let queue = Queue::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..10u64 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            queue.add(Task::new(move || async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(5 + i).await;
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(i)
            }));
        }

        queue.run(3).await.unwrap();
        assert_eq!(peak.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn single_worker_dequeues_in_fifo_order() {
        let queue = Queue::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5u64 {
            let log = Arc::clone(&log);
            queue.add(Task::new(move || async move {
                sleep(10 - i).await;
                log.lock().unwrap().push(i);
                Ok(i)
            }));
        }

        queue.run(1).await.unwrap();
        assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_surfaces_and_leaves_unpopped_entries() {
        let queue = Queue::new();
        queue.collate("a", Task::new(|| async { Ok(1) }));
        queue.add(Task::new(|| async { Err(anyhow!("entry failed")) }));
        queue.collate("c", Task::new(|| async { Ok(3) }));
        queue.collate("d", Task::new(|| async { Ok(4) }));

        let err = queue.run(1).await.unwrap_err();

        assert_eq!(err.to_string(), "entry failed");
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn last_write_wins_for_duplicate_keys() {
        let queue = Queue::new();
        queue.collate("dup", Task::new(|| async { Ok(1) }));
        queue.collate("dup", Task::new(|| async { Ok(2) }));

        let results = queue.run(1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results["dup"], 2);
    }

    #[tokio::test]
    async fn zero_concurrency_runs_one_worker() {
        let queue = Queue::new();
        queue.collate("x", Task::new(|| async { Ok(7) }));

        let results = queue.run(0).await.unwrap();
        assert_eq!(results["x"], 7);
    }

    #[tokio::test]
    async fn empty_queue_returns_empty_map() {
        let queue = Queue::default();
        assert!(queue.run(4).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn workers_keep_draining_after_caller_stops_waiting() {
        let queue = Queue::new();
        for (key, ms) in [("a", 20u64), ("b", 20), ("c", 20)] {
            queue.collate(
                key,
                Task::new(move || async move {
                    sleep(ms).await;
                    Ok(ms)
                }),
            );
        }

        let res = tokio::time::timeout(Duration::from_millis(30), queue.run(1)).await;
        assert!(res.is_err());

        sleep(100).await;
        assert!(queue.is_empty());

        let results = queue.run(1).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results["c"], 20);
    }
}
