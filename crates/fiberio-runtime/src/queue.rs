//! `FiberQueue`: bounded MPMC queue between fibers and OS threads.
//!
//! Producers are fibers: `push` suspends the fiber (never the context
//! thread) while the queue is full. Consumers are OS threads: `pop_blocking`
//! parks the thread on a condvar while the queue is empty.
//!
//! Storage is a lock-free `ArrayQueue`. The mutex only guards the
//! empty-check-then-wait sequence on the consumer side so a push cannot
//! slip between a consumer's check and its wait.

use std::fmt;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};

use crossbeam_queue::ArrayQueue;
use tokio::sync::Notify;

/// Returned by `try_push`; hands the item back.
#[derive(PartialEq, Eq)]
pub enum TryPushError<T> {
    Full(T),
    Closed(T),
}

impl<T> TryPushError<T> {
    pub fn into_inner(self) -> T {
        match self {
            TryPushError::Full(t) | TryPushError::Closed(t) => t,
        }
    }
}

impl<T> fmt::Debug for TryPushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TryPushError::Full(_) => write!(f, "Full(..)"),
            TryPushError::Closed(_) => write!(f, "Closed(..)"),
        }
    }
}

/// Returned by `push` when the queue was closed; hands the item back.
#[derive(PartialEq, Eq)]
pub struct PushError<T>(pub T);

impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PushError(..)")
    }
}

impl<T> fmt::Display for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "queue closed")
    }
}

pub struct FiberQueue<T> {
    items: ArrayQueue<T>,
    closed: AtomicBool,
    /// Fibers waiting for a free slot.
    space: Notify,
    /// Consumer-side park lock.
    lock: Mutex<()>,
    ready: Condvar,
}

impl<T> FiberQueue<T> {
    /// # Panics
    ///
    /// If `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        Self {
            items: ArrayQueue::new(capacity),
            closed: AtomicBool::new(false),
            space: Notify::new(),
            lock: Mutex::new(()),
            ready: Condvar::new(),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.items.capacity()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Enqueue without waiting.
    pub fn try_push(&self, item: T) -> Result<(), TryPushError<T>> {
        if self.is_closed() {
            return Err(TryPushError::Closed(item));
        }
        match self.items.push(item) {
            Ok(()) => {
                self.wake_consumer();
                Ok(())
            }
            Err(item) => Err(TryPushError::Full(item)),
        }
    }

    /// Enqueue, suspending the calling fiber while the queue is full.
    pub async fn push(&self, mut item: T) -> Result<(), PushError<T>> {
        loop {
            if self.is_closed() {
                return Err(PushError(item));
            }

            // Register interest before trying, so a pop between the failed
            // push and the await still wakes us.
            let mut notified = pin!(self.space.notified());
            notified.as_mut().enable();

            match self.items.push(item) {
                Ok(()) => {
                    self.wake_consumer();
                    return Ok(());
                }
                Err(back) => item = back,
            }

            if self.is_closed() {
                return Err(PushError(item));
            }
            notified.await;
        }
    }

    /// Dequeue without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.items.pop()?;
        self.space.notify_one();
        Some(item)
    }

    /// Dequeue, parking the calling OS thread while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub fn pop_blocking(&self) -> Option<T> {
        if let Some(item) = self.try_pop() {
            return Some(item);
        }
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(item) = self.items.pop() {
                drop(guard);
                self.space.notify_one();
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }
            guard = self.ready.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Refuse further pushes and wake everyone. Queued items stay poppable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.space.notify_waiters();
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ready.notify_all();
    }

    fn wake_consumer(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.ready.notify_one();
    }
}

impl<T> fmt::Debug for FiberQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FiberQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}
