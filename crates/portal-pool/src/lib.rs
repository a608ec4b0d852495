//! Bounded worker pool for deferred storage work.
//!
//! Callers hand the pool a future (typically a batched soft-delete) and
//! return immediately; a fixed set of workers drains a bounded queue and
//! executes the actions off the request path. There is no retry and no
//! result channel back to the submitter: a failed action is logged and
//! discarded.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tracing::{error, warn};

type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// A deferred unit of work. The submitter's data travels inside the
/// future's captures.
struct Task {
    action: TaskFuture,
}

/// A fixed-size pool of workers draining a bounded task queue.
///
/// The queue capacity equals the worker count, so [`add_task`] exerts
/// backpressure once every worker is busy and the buffer is full.
///
/// [`add_task`]: TaskPool::add_task
pub struct TaskPool {
    tasks: mpsc::Sender<Task>,
    queue: Mutex<Option<mpsc::Receiver<Task>>>,
    done: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    active: AtomicBool,
    workers: usize,
}

impl TaskPool {
    /// Creates a pool sized to the number of available CPU cores.
    pub fn new() -> Self {
        Self::with_workers(num_cpus::get())
    }

    /// Creates a pool with an explicit worker count (at least one).
    pub fn with_workers(workers: usize) -> Self {
        let workers = workers.max(1);
        let (tasks, queue) = mpsc::channel(workers);
        let (done, done_rx) = watch::channel(false);

        Self {
            tasks,
            queue: Mutex::new(Some(queue)),
            done,
            done_rx,
            active: AtomicBool::new(true),
            workers,
        }
    }

    /// Number of workers this pool runs.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawns the workers. Call once from within a tokio runtime; a
    /// second call warns and does nothing.
    pub fn run(&self) {
        let Some(queue) = self.queue.lock().take() else {
            warn!("task pool is already running");
            return;
        };

        let queue = Arc::new(tokio::sync::Mutex::new(queue));

        for _ in 0..self.workers {
            let queue = Arc::clone(&queue);
            let mut done = self.done_rx.clone();

            tokio::spawn(async move {
                loop {
                    let mut receiver = queue.lock().await;
                    let task = tokio::select! {
                        _ = done.changed() => break,
                        task = receiver.recv() => task,
                    };
                    drop(receiver);

                    let Some(task) = task else { break };

                    if let Err(err) = task.action.await {
                        error!(error = %err, "pool task failed");
                    }
                }
            });
        }
    }

    /// Enqueues `action` for deferred execution.
    ///
    /// Blocks (asynchronously) while the queue is full. After [`stop`] the
    /// task is dropped with a warning — the workers are gone and nothing
    /// will ever drain the queue.
    ///
    /// [`stop`]: TaskPool::stop
    pub async fn add_task<F>(&self, action: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let task = Task {
            action: Box::pin(action),
        };

        if self.tasks.send(task).await.is_err() {
            warn!("task pool is stopped, dropping task");
        }
    }

    /// Signals every worker to exit. Idempotent: only the first call
    /// broadcasts the shutdown.
    ///
    /// Tasks already queued but not yet picked up are not guaranteed to
    /// execute.
    pub fn stop(&self) {
        if self.active.swap(false, Ordering::SeqCst) {
            let _ = self.done.send(true);
        }
    }
}

impl Default for TaskPool {
    fn default() -> Self {
        Self::new()
    }
}
