use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::task::JoinHandle;

use crate::error::Result;

use super::RateLimitedQueue;

/// One unit of work pulled off a queue. The item is moved in so that any
/// guard it carries is dropped once the work has finished.
#[async_trait]
pub trait Job<T>: Send + Sync + 'static {
    async fn run(&self, item: T) -> Result<()>;
}

/// Fixed set of workers draining one queue.
pub struct WorkerPool {
    name: &'static str,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn<T, J>(
        name: &'static str,
        size: usize,
        queue: Arc<RateLimitedQueue<T>>,
        job: Arc<J>,
    ) -> Self
    where
        T: Send + 'static,
        J: Job<T>,
    {
        let handles = (0..size)
            .map(|worker| {
                let queue = Arc::clone(&queue);
                let job = Arc::clone(&job);
                tokio::spawn(async move {
                    while let Some(item) = queue.get().await {
                        match AssertUnwindSafe(job.run(item)).catch_unwind().await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => tracing::warn!(pool = name, worker, "{}", e),
                            Err(_) => tracing::error!(pool = name, worker, "job panicked"),
                        }
                    }
                    tracing::debug!(pool = name, worker, "queue closed, worker exiting");
                })
            })
            .collect();

        tracing::debug!(pool = name, size, "worker pool started");
        Self { name, handles }
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Stops every worker. Work in progress is abandoned; its markers are
    /// released as the tasks are dropped.
    pub fn shutdown(&self) {
        for handle in &self.handles {
            handle.abort();
        }
        tracing::debug!(pool = self.name, "worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
