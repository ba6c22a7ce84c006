//! Bounded worker pool draining a lock-free task queue.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam::queue::SegQueue;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

type Task = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A fixed number of `tokio::spawn`ed tasks pulling fire-and-forget
/// work from a shared `SegQueue`. Mirrors a classic mutex/condvar
/// worker pool's FIFO-plus-graceful-shutdown contract without blocking
/// an OS thread per idle worker.
pub struct WorkerPool {
    queue: Arc<SegQueue<Task>>,
    notify: Arc<Notify>,
    stopping: Arc<AtomicBool>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawns `worker_count` tasks (defaulting to hardware parallelism
    /// when zero is passed).
    pub fn start(worker_count: usize) -> Self {
        let worker_count = if worker_count == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4)
        } else {
            worker_count
        };

        let queue: Arc<SegQueue<Task>> = Arc::new(SegQueue::new());
        let notify = Arc::new(Notify::new());
        let stopping = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(worker_count);

        for _ in 0..worker_count {
            let queue = queue.clone();
            let notify = notify.clone();
            let stopping = stopping.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    match queue.pop() {
                        Some(task) => task.await,
                        None => {
                            if stopping.load(Ordering::Acquire) {
                                break;
                            }
                            notify.notified().await;
                        }
                    }
                }
            }));
        }

        Self {
            queue,
            notify,
            stopping,
            handles,
        }
    }

    /// Enqueues a fire-and-forget synchronous task and wakes one worker.
    pub fn enqueue(&self, task: impl FnOnce() + Send + 'static) {
        self.enqueue_async(async move { task() });
    }

    /// Enqueues a fire-and-forget asynchronous task and wakes one worker.
    pub fn enqueue_async(&self, task: impl Future<Output = ()> + Send + 'static) {
        self.queue.push(Box::pin(task));
        self.notify.notify_one();
    }

    /// Flags shutdown, wakes all workers so they observe the flag, and
    /// joins them once the queue has been drained.
    pub async fn shutdown(self) {
        self.stopping.store(true, Ordering::Release);
        self.notify.notify_waiters();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}
