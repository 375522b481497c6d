//! `ExecutionContext`: one OS thread driving a single-threaded event loop.
//!
//! Fibers are tokio tasks spawned onto the context's `current_thread`
//! runtime. Everything spawned on one context runs on that context's
//! thread, interleaved only at `.await` points, so a component that keeps
//! all of its state-touching work on one context needs no further locking
//! against itself.
//!
//! A context lives until `stop()` is called or its last handle is dropped.
//! Tasks still pending at that point are cancelled.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};

use tokio::runtime::{Builder, EnterGuard, Handle};
use tokio::sync::mpsc;
use tokio::task::JoinError;

use fiberio_core::error::panic_message;
use fiberio_core::{kdebug, kerror, NetError, NetResult};

/// Messages consumed by the context thread's loop.
enum Command {
    /// Run a closure on the context thread.
    Run(Box<dyn FnOnce() + Send + 'static>),
    /// Leave the loop; pending tasks are cancelled.
    Stop,
}

struct ContextInner {
    index: usize,
    name: String,
    handle: Handle,
    commands: mpsc::UnboundedSender<Command>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: ThreadId,
    stopped: AtomicBool,
}

/// Handle to an execution context. Cheap to clone.
#[derive(Clone)]
pub struct ExecutionContext {
    inner: Arc<ContextInner>,
}

impl ExecutionContext {
    /// Start a context thread named `fio-context-<index>`.
    pub fn new(index: usize) -> NetResult<Self> {
        let name = format!("fio-context-{}", index);

        let rt = Builder::new_current_thread()
            .enable_all()
            .thread_name(name.clone())
            .build()?;
        let handle = rt.handle().clone();
        let (tx, rx) = mpsc::unbounded_channel();

        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || context_loop(rt, rx))?;
        let thread_id = thread.thread().id();

        kdebug!("{} started", name);

        Ok(Self {
            inner: Arc::new(ContextInner {
                index,
                name,
                handle,
                commands: tx,
                thread: Mutex::new(Some(thread)),
                thread_id,
                stopped: AtomicBool::new(false),
            }),
        })
    }

    /// Position of this context in its pool.
    #[inline]
    pub fn index(&self) -> usize {
        self.inner.index
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Runtime handle backing this context.
    #[inline]
    pub fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    /// True when the caller is running on this context's thread.
    #[inline]
    pub fn in_context_thread(&self) -> bool {
        thread::current().id() == self.inner.thread_id
    }

    #[inline]
    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::Acquire)
    }

    /// Spawn a fiber on this context.
    pub fn spawn<F>(&self, fut: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.handle.spawn(fut)
    }

    /// Queue a plain closure to run on the context thread.
    pub fn post<F>(&self, f: F) -> NetResult<()>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.is_stopped() {
            return Err(NetError::ContextStopped);
        }
        self.inner
            .commands
            .send(Command::Run(Box::new(f)))
            .map_err(|_| NetError::ContextStopped)
    }

    /// Run `fut` on this context and await its output from anywhere.
    ///
    /// A panic inside `fut` comes back as `TaskPanicked`.
    pub async fn await_on<F, T>(&self, fut: F) -> NetResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.is_stopped() {
            return Err(NetError::ContextStopped);
        }
        self.inner.handle.spawn(fut).await.map_err(join_error)
    }

    /// Run `fut` on this context, blocking the calling OS thread until done.
    ///
    /// Must not be called from this context's own thread.
    pub fn run_sync<F, T>(&self, fut: F) -> NetResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        if self.in_context_thread() {
            return Err(NetError::invalid_argument(
                "run_sync called on its own context thread",
            ));
        }
        if self.is_stopped() {
            return Err(NetError::ContextStopped);
        }

        let (tx, rx) = std::sync::mpsc::sync_channel(1);
        self.inner.handle.spawn(async move {
            let _ = tx.send(fut.await);
        });
        // Sender dropped without a value: the task was cancelled or panicked.
        rx.recv().map_err(|_| NetError::ContextStopped)
    }

    /// Make this context's runtime current for the calling thread.
    ///
    /// Needed to create tokio I/O objects (sockets, timers) that must be
    /// registered with this context's reactor.
    pub fn enter(&self) -> EnterGuard<'_> {
        self.inner.handle.enter()
    }

    /// Ask the context thread to leave its loop. Idempotent.
    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::AcqRel) {
            let _ = self.inner.commands.send(Command::Stop);
        }
    }

    /// Wait for the context thread to exit. No-op from the context thread.
    pub fn join(&self) {
        if self.in_context_thread() {
            return;
        }
        let thread = self
            .inner
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                kerror!("{} exited by panic", self.inner.name);
            }
        }
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("name", &self.inner.name)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if !self.stopped.swap(true, Ordering::AcqRel) {
            let _ = self.commands.send(Command::Stop);
        }
        if thread::current().id() == self.thread_id {
            return;
        }
        let thread = self.thread.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(thread) = thread {
            let _ = thread.join();
        }
    }
}

fn join_error(e: JoinError) -> NetError {
    if e.is_panic() {
        NetError::TaskPanicked(panic_message(&*e.into_panic()))
    } else {
        NetError::ContextStopped
    }
}

/// Context thread main loop.
fn context_loop(rt: tokio::runtime::Runtime, mut rx: mpsc::UnboundedReceiver<Command>) {
    rt.block_on(async move {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Run(f) => f(),
                Command::Stop => break,
            }
        }
    });
    kdebug!("context loop exited");
    // Dropping `rt` cancels whatever fibers are still pending.
}
