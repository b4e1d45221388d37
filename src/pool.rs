// src/pool.rs
//! Fixed-size async worker pool.
//!
//! `N` long-lived workers pull boxed futures from one bounded queue and push
//! any `Some` output onto the result channel. Two shutdown paths exist:
//! `stop` closes the intake and lets workers drain what was already accepted,
//! `cancel` additionally abandons queued work and drops late results.

use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub type Task<T> = BoxFuture<'static, Option<T>>;

pub struct WorkerPool<T> {
    workers: usize,
    tasks_tx: Mutex<Option<mpsc::Sender<Task<T>>>>,
    tasks_rx: Arc<tokio::sync::Mutex<mpsc::Receiver<Task<T>>>>,
    results_tx: Mutex<Option<mpsc::UnboundedSender<T>>>,
    results_rx: Mutex<Option<mpsc::UnboundedReceiver<T>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    started: Mutex<bool>,
    closing: CancellationToken,
    cancel: CancellationToken,
}

impl<T> std::fmt::Debug for WorkerPool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("closing", &self.closing.is_cancelled())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

fn guard<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(workers: usize, queue_size: usize) -> Self {
        Self::with_cancellation(workers, queue_size, &CancellationToken::new())
    }

    /// A pool that is also cancelled whenever `parent` is.
    pub fn with_cancellation(workers: usize, queue_size: usize, parent: &CancellationToken) -> Self {
        let (tasks_tx, tasks_rx) = mpsc::channel(queue_size.max(1));
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let cancel = parent.child_token();

        Self {
            workers: workers.max(1),
            tasks_tx: Mutex::new(Some(tasks_tx)),
            tasks_rx: Arc::new(tokio::sync::Mutex::new(tasks_rx)),
            results_tx: Mutex::new(Some(results_tx)),
            results_rx: Mutex::new(Some(results_rx)),
            handles: Mutex::new(Vec::new()),
            started: Mutex::new(false),
            closing: cancel.child_token(),
            cancel,
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Spawns the workers. Calling it again is a no-op.
    pub fn start(&self) {
        let mut started = guard(&self.started);
        if *started {
            return;
        }
        let Some(results) = guard(&self.results_tx).clone() else {
            return;
        };

        let mut handles = guard(&self.handles);
        for _ in 0..self.workers {
            let queue = self.tasks_rx.clone();
            let results = results.clone();
            let cancel = self.cancel.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => None,
                        task = async { queue.lock().await.recv().await } => task,
                    };
                    let Some(task) = next else { break };

                    if let Some(result) = task.await {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let _ = results.send(result);
                    }
                }
            }));
        }
        *started = true;
    }

    /// Queues a task, waiting while the queue is full. Returns `false`
    /// without running anything once the pool is stopping or cancelled.
    pub async fn add_task<F>(&self, task: F) -> bool
    where
        F: Future<Output = Option<T>> + Send + 'static,
    {
        if self.closing.is_cancelled() {
            return false;
        }
        let Some(sender) = guard(&self.tasks_tx).clone() else {
            return false;
        };

        let task: Task<T> = Box::pin(task);
        tokio::select! {
            biased;
            _ = self.closing.cancelled() => false,
            sent = sender.send(task) => sent.is_ok(),
        }
    }

    /// Hands out the result channel; only the first caller receives it.
    pub fn results(&self) -> Option<mpsc::UnboundedReceiver<T>> {
        guard(&self.results_rx).take()
    }

    /// Abandons queued tasks. Tasks already running finish, but their
    /// results are dropped.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Closes the intake, waits for every worker to finish, then closes the
    /// result channel.
    pub async fn stop(&self) {
        self.closing.cancel();
        guard(&self.tasks_tx).take();

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *guard(&self.handles));
        for handle in handles {
            let _ = handle.await;
        }

        guard(&self.results_tx).take();
    }

    /// Stops the pool and returns every result nobody consumed yet.
    pub async fn stop_and_drain(&self) -> Vec<T> {
        self.stop().await;

        let mut drained = Vec::new();
        if let Some(mut results) = self.results() {
            while let Some(result) = results.recv().await {
                drained.push(result);
            }
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_every_task_runs_exactly_once() {
        let pool = WorkerPool::new(4, 8);
        pool.start();
        let counter = Arc::new(AtomicUsize::new(0));

        for i in 0..100usize {
            let counter = counter.clone();
            assert!(
                pool.add_task(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Some(i)
                })
                .await
            );
        }

        let mut results = pool.stop_and_drain().await;
        assert_eq!(counter.load(Ordering::SeqCst), 100);

        results.sort_unstable();
        assert_eq!(results, (0..100).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_none_results_are_not_emitted() {
        let pool: WorkerPool<u32> = WorkerPool::new(2, 4);
        pool.start();
        pool.add_task(async { None }).await;
        pool.add_task(async { Some(7) }).await;

        assert_eq!(pool.stop_and_drain().await, vec![7]);
    }

    #[tokio::test]
    async fn test_submission_after_stop_is_a_noop() {
        let pool: WorkerPool<()> = WorkerPool::new(2, 4);
        pool.start();
        pool.stop().await;

        let ran = Arc::new(AtomicUsize::new(0));
        let flag = ran.clone();
        let accepted = pool
            .add_task(async move {
                flag.fetch_add(1, Ordering::SeqCst);
                Some(())
            })
            .await;

        assert!(!accepted);
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let pool: WorkerPool<()> = WorkerPool::new(3, 4);
        pool.start();
        pool.start();
        assert_eq!(guard(&pool.handles).len(), 3);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_cancel_releases_blocked_submitter() {
        let pool: Arc<WorkerPool<()>> = Arc::new(WorkerPool::new(1, 1));
        // Not started, so the single queue slot stays occupied.
        assert!(pool.add_task(async { None }).await);

        let canceller = pool.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let accepted = tokio::time::timeout(Duration::from_secs(2), pool.add_task(async { None }))
            .await
            .expect("submitter stayed blocked after cancel");
        assert!(!accepted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_drops_pending_work() {
        let pool = WorkerPool::new(1, 8);
        pool.start();
        let ran = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let ran = ran.clone();
            pool.add_task(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                ran.fetch_add(1, Ordering::SeqCst);
                Some(1u8)
            })
            .await;
        }

        pool.cancel();
        let results = pool.stop_and_drain().await;

        assert!(results.is_empty());
        assert!(ran.load(Ordering::SeqCst) <= 1);
    }

    #[tokio::test]
    async fn test_parent_token_cancels_pool() {
        let parent = CancellationToken::new();
        let pool: WorkerPool<()> = WorkerPool::with_cancellation(2, 2, &parent);
        pool.start();
        parent.cancel();

        assert!(pool.is_cancelled());
        assert!(!pool.add_task(async { Some(()) }).await);
        pool.stop().await;
    }

    #[tokio::test]
    async fn test_results_channel_is_handed_out_once() {
        let pool: WorkerPool<u8> = WorkerPool::new(1, 1);
        assert!(pool.results().is_some());
        assert!(pool.results().is_none());
        assert!(pool.stop_and_drain().await.is_empty());
    }
}
