//! `BlockingTaskBridge`: offload blocking work from fibers to OS threads.
//!
//! Fibers enqueue closures into a bounded `FiberQueue`; a fixed set of
//! worker threads (`fio-bridge-N`) pop and run them. A full queue suspends
//! the submitting fiber, which is the only backpressure there is.
//!
//! A panicking task is caught and logged; the worker keeps going.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use tokio::sync::oneshot;

use fiberio_core::error::panic_message;
use fiberio_core::{kdebug, kerror, NetError, NetResult};

use crate::config::{resolve_thread_count, RuntimeConfig};
use crate::queue::{FiberQueue, TryPushError};

/// Unit of work executed by a bridge worker.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

struct BridgeInner {
    queue: FiberQueue<Task>,
    completed: AtomicU64,
    panicked: AtomicU64,
}

pub struct BlockingTaskBridge {
    inner: Arc<BridgeInner>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    threads: usize,
}

impl BlockingTaskBridge {
    /// Start `num_threads` workers (0 = hardware concurrency) over a queue
    /// holding at most `queue_size` pending tasks.
    pub fn new(num_threads: usize, queue_size: usize) -> NetResult<Self> {
        if queue_size == 0 {
            return Err(NetError::invalid_argument("queue_size must be > 0"));
        }
        let n = resolve_thread_count(num_threads);
        let inner = Arc::new(BridgeInner {
            queue: FiberQueue::new(queue_size),
            completed: AtomicU64::new(0),
            panicked: AtomicU64::new(0),
        });

        let mut workers = Vec::with_capacity(n);
        for worker_id in 0..n {
            let shared = Arc::clone(&inner);
            let spawned = thread::Builder::new()
                .name(format!("fio-bridge-{}", worker_id))
                .spawn(move || worker_loop(shared, worker_id));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    inner.queue.close();
                    for w in workers {
                        let _ = w.join();
                    }
                    return Err(e.into());
                }
            }
        }

        kdebug!("blocking bridge started: {} workers, queue {}", n, queue_size);

        Ok(Self {
            inner,
            workers: Mutex::new(workers),
            threads: n,
        })
    }

    pub fn from_config(config: &RuntimeConfig) -> NetResult<Self> {
        Self::new(config.bridge_threads, config.bridge_queue_size)
    }

    /// Enqueue `f`, suspending the calling fiber while the queue is full.
    pub async fn submit<F>(&self, f: F) -> NetResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner
            .queue
            .push(Box::new(f))
            .await
            .map_err(|_| NetError::QueueClosed)
    }

    /// Enqueue `f` without waiting. A full queue hands the closure back.
    pub fn try_submit<F>(&self, f: F) -> Result<(), TryPushError<Task>>
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.queue.try_push(Box::new(f))
    }

    /// Run `f` on a worker and await its result.
    pub async fn run<F, T>(&self, f: F) -> NetResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        self.submit(move || {
            let result = catch_unwind(AssertUnwindSafe(f))
                .map_err(|payload| NetError::TaskPanicked(panic_message(&*payload)));
            let _ = tx.send(result);
        })
        .await?;
        // Dropped without sending: the queue was torn down under us.
        rx.await.map_err(|_| NetError::QueueClosed)?
    }

    #[inline]
    pub fn thread_count(&self) -> usize {
        self.threads
    }

    /// Tasks waiting for a worker.
    #[inline]
    pub fn queued(&self) -> usize {
        self.inner.queue.len()
    }

    pub fn completed(&self) -> u64 {
        self.inner.completed.load(Ordering::Relaxed)
    }

    pub fn panicked(&self) -> u64 {
        self.inner.panicked.load(Ordering::Relaxed)
    }

    /// Refuse new work, let workers drain the queue, join them.
    ///
    /// Blocks the calling thread; call it from outside any context.
    pub fn shutdown(&self) {
        self.inner.queue.close();
        let workers: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for w in workers {
            if w.join().is_err() {
                kerror!("bridge worker exited by panic");
            }
        }
    }
}

impl Drop for BlockingTaskBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Worker thread main loop.
fn worker_loop(inner: Arc<BridgeInner>, worker_id: usize) {
    while let Some(task) = inner.queue.pop_blocking() {
        match catch_unwind(AssertUnwindSafe(task)) {
            Ok(()) => {
                inner.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(payload) => {
                inner.panicked.fetch_add(1, Ordering::Relaxed);
                kerror!(
                    "bridge worker {}: task panicked: {}",
                    worker_id,
                    panic_message(&*payload)
                );
            }
        }
    }
    kdebug!("bridge worker {} exiting", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_zero_queue_rejected() {
        assert!(matches!(
            BlockingTaskBridge::new(1, 0),
            Err(NetError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_worker_names() {
        let bridge = BlockingTaskBridge::new(2, 4).unwrap();
        assert_eq!(bridge.thread_count(), 2);
        let (tx, rx) = mpsc::channel();
        bridge
            .try_submit(move || {
                let _ = tx.send(thread::current().name().map(str::to_string));
            })
            .unwrap();
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap().unwrap();
        assert!(name.starts_with("fio-bridge-"), "got {}", name);
    }

    #[tokio::test]
    async fn test_run_returns_value() {
        let bridge = BlockingTaskBridge::new(2, 8).unwrap();
        let v = bridge.run(|| 6 * 7).await.unwrap();
        assert_eq!(v, 42);
    }

    #[tokio::test]
    async fn test_panic_does_not_kill_worker() {
        let bridge = BlockingTaskBridge::new(1, 4).unwrap();

        let r: NetResult<()> = bridge.run(|| panic!("bad task")).await;
        assert_eq!(r, Err(NetError::TaskPanicked("bad task".to_string())));

        bridge.submit(|| panic!("fire and forget")).await.unwrap();

        // Same single worker still serves work afterwards.
        assert_eq!(bridge.run(|| "alive").await.unwrap(), "alive");
        assert_eq!(bridge.panicked(), 1);
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let bridge = BlockingTaskBridge::new(1, 2).unwrap();

        // Occupy the only worker until the gate opens.
        let (started_tx, started_rx) = mpsc::channel();
        let (gate_tx, gate_rx) = mpsc::channel::<()>();
        bridge
            .submit(move || {
                let _ = started_tx.send(());
                let _ = gate_rx.recv();
            })
            .await
            .unwrap();
        started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        bridge.submit(|| {}).await.unwrap();
        bridge.submit(|| {}).await.unwrap();
        assert_eq!(bridge.queued(), 2);

        let blocked = tokio::time::timeout(Duration::from_millis(50), bridge.submit(|| {})).await;
        assert!(blocked.is_err(), "submit into a full queue must suspend");

        gate_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), bridge.submit(|| {}))
            .await
            .expect("queue never drained")
            .unwrap();
    }

    #[test]
    fn test_shutdown_drains_queue() {
        let bridge = BlockingTaskBridge::new(1, 16).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let done = Arc::clone(&done);
            let mut task: Task = Box::new(move || {
                done.fetch_add(1, Ordering::SeqCst);
            });
            loop {
                match bridge.inner.queue.try_push(task) {
                    Ok(()) => break,
                    Err(e) => {
                        task = e.into_inner();
                        thread::yield_now();
                    }
                }
            }
        }
        bridge.shutdown();
        assert_eq!(done.load(Ordering::SeqCst), 10);
        assert_eq!(bridge.completed(), 10);
    }

    #[tokio::test]
    async fn test_submit_after_shutdown() {
        let bridge = BlockingTaskBridge::new(1, 2).unwrap();
        bridge.shutdown();
        assert_eq!(bridge.submit(|| {}).await, Err(NetError::QueueClosed));
        assert_eq!(bridge.run(|| 1).await, Err(NetError::QueueClosed));
    }
}
