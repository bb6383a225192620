//! Bounded worker pool draining a FIFO queue
//!
//! A fixed number of workers pop from a shared queue and send each result over
//! a channel as soon as it completes. A freed worker immediately takes the next
//! item, so there is never more than `parallelism` work in flight and no
//! batch-then-wait barrier. Before every pop a worker consults a
//! [`StopSignal`]; once it fires, queued items stay queued and in-flight items
//! finish normally.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Cooperative cancellation checked before each dequeue
#[async_trait]
pub trait StopSignal: Send + Sync {
    async fn should_stop(&self) -> bool;
}

/// Signal that never fires
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverStop;

#[async_trait]
impl StopSignal for NeverStop {
    async fn should_stop(&self) -> bool {
        false
    }
}

pub struct WorkerPool;

impl WorkerPool {
    /// Start `parallelism` workers over `items`. `work` runs once per item.
    pub fn spawn<T, R, F, Fut>(
        items: Vec<T>,
        parallelism: usize,
        stop: Arc<dyn StopSignal>,
        work: F,
    ) -> PoolHandle<T, R>
    where
        T: Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        let workers_count = parallelism.max(1).min(items.len().max(1));
        let queue = Arc::new(Mutex::new(VecDeque::from(items)));
        let work = Arc::new(work);
        let (tx, rx) = mpsc::unbounded_channel();
        let mut workers = JoinSet::new();

        for worker_id in 0..workers_count {
            let queue = queue.clone();
            let work = work.clone();
            let stop = stop.clone();
            let tx = tx.clone();
            workers.spawn(async move {
                let mut processed = 0usize;
                loop {
                    if stop.should_stop().await {
                        debug!(worker_id, "stop signal received");
                        break;
                    }
                    let Some(item) = queue.lock().await.pop_front() else {
                        break;
                    };
                    let result = (*work)(item).await;
                    processed += 1;
                    if tx.send(result).is_err() {
                        break;
                    }
                }
                debug!(worker_id, processed, "worker finished");
            });
        }
        debug!(workers = workers_count, "worker pool started");

        PoolHandle {
            results: rx,
            queue,
            workers,
        }
    }
}

/// Consumer side of a running pool
pub struct PoolHandle<T, R> {
    results: mpsc::UnboundedReceiver<R>,
    queue: Arc<Mutex<VecDeque<T>>>,
    workers: JoinSet<()>,
}

impl<T, R> PoolHandle<T, R> {
    /// Next completed result; `None` once every worker has exited
    pub async fn next(&mut self) -> Option<R> {
        self.results.recv().await
    }

    /// Wait for the workers and hand back whatever was never dequeued
    pub async fn finish(mut self) -> Vec<T> {
        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                error!("worker task failed: {}", e);
            }
        }
        self.queue.lock().await.drain(..).collect()
    }
}
