//! Batch scheduler with a shared concurrency gate.
//!
//! One [`Scheduler`] is created per sync pass and passed to every
//! scheduling call. Work is dispatched in fixed-size batches; batch *k+1*
//! starts only after every task of batch *k* has finished. Inside a batch
//! tasks run concurrently on the current task, and the I/O they do is
//! admitted through a gate of `workers` slots shared by the whole pass.
//!
//! Container tasks hold a slot only while listing, never while waiting on
//! their children, so nested batches cannot starve the gate.

use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_WORKERS: usize = 10;

/// Structured group of tasks: submit any number, then join them all.
/// Results come back in completion order.
pub struct TaskGroup<Fut> {
    tasks: FuturesUnordered<Fut>,
}

impl<Fut: Future> TaskGroup<Fut> {
    pub fn new() -> Self {
        Self {
            tasks: FuturesUnordered::new(),
        }
    }

    pub fn submit(&mut self, task: Fut) {
        self.tasks.push(task);
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub async fn join_all(mut self) -> Vec<Fut::Output> {
        let mut results = Vec::with_capacity(self.tasks.len());
        while let Some(result) = self.tasks.next().await {
            results.push(result);
        }
        results
    }
}

impl<Fut: Future> Default for TaskGroup<Fut> {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
pub struct Scheduler {
    gate: Arc<Semaphore>,
    workers: usize,
    shutdown: CancellationToken,
}

impl Scheduler {
    pub fn new(workers: usize, shutdown: CancellationToken) -> Self {
        let workers = workers.max(1);
        Self {
            gate: Arc::new(Semaphore::new(workers)),
            workers,
            shutdown,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Whether shutdown was requested; no new batch starts after that.
    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Run `task` while holding one gate slot. The slot is released when
    /// the task completes or fails.
    pub async fn gated<F: Future>(&self, task: F) -> F::Output {
        // acquire only fails on a closed semaphore; this one is never closed
        let _permit = self.gate.acquire().await.ok();
        task.await
    }

    /// Dispatch `items` in batches of `batch_size`, awaiting each batch
    /// before starting the next. Stops dispatching once shutdown is
    /// requested and returns the results collected so far.
    pub async fn run_batched<I, F, Fut>(
        &self,
        items: I,
        batch_size: usize,
        mut dispatch: F,
    ) -> Vec<Fut::Output>
    where
        I: IntoIterator,
        F: FnMut(I::Item) -> Fut,
        Fut: Future,
    {
        let batch_size = batch_size.max(1);
        let mut items = items.into_iter().peekable();
        let mut results = Vec::new();

        while items.peek().is_some() {
            if self.is_cancelled() {
                tracing::info!("Shutdown requested, not starting further batches");
                break;
            }
            let mut group = TaskGroup::new();
            for item in items.by_ref().take(batch_size) {
                group.submit(dispatch(item));
            }
            tracing::debug!("Executing {} tasks in current batch", group.len());
            results.extend(group.join_all().await);
            tracing::debug!("Batch completed, moving to the next");
        }

        results
    }
}
