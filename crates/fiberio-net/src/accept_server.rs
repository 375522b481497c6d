//! # AcceptServer
//!
//! Listening socket plus an accept-loop fiber. Every accepted connection is
//! handed to a `ConnectionHandler` built by a caller-supplied factory and
//! serviced on a context drawn round-robin from the pool.
//!
//! ```ignore
//! let pool = Arc::new(ExecutionContextPool::new(4)?);
//! let server = AcceptServer::new(8080, &pool, |_ctx| EchoHandler)?;
//! server.run();
//! server.wait();
//! ```
//!
//! Stopping (explicit `stop()`, SIGINT/SIGTERM, a factory panic or an
//! accept error) closes the listener, shuts down every live connection and
//! waits for every handler fiber to finish before the server reports
//! stopped. If the listener's context is stopped first, the accept loop is
//! dropped with it and the server reports stopped without draining.

use std::future::Future;
use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::Notify;

use fiberio_core::error::panic_message;
use fiberio_core::{kdebug, kerror, kinfo, kwarn, NetResult, ShutdownFlag};
use fiberio_runtime::{ExecutionContext, ExecutionContextPool, TerminationSignals};

use crate::registry::Registry;

/// Listen backlog.
pub const MAX_BACKLOG_PENDING_CONNECTIONS: u32 = 64;

/// Services one accepted connection.
///
/// The returned future runs as its own fiber on the context the handler was
/// built for. When it resolves the connection is closed and unregistered.
pub trait ConnectionHandler: Send + 'static {
    fn handle(&mut self, stream: TcpStream) -> impl Future<Output = io::Result<()>> + Send;
}

#[derive(Debug, Clone)]
pub struct AcceptServerOptions {
    /// Stop on SIGINT/SIGTERM. Handlers are installed by the constructor.
    pub handle_signals: bool,
}

impl Default for AcceptServerOptions {
    fn default() -> Self {
        Self { handle_signals: true }
    }
}

/// One-shot "server stopped" latch, waitable from threads and fibers.
struct StoppedLatch {
    done: Mutex<bool>,
    cv: Condvar,
    notify: Notify,
}

impl StoppedLatch {
    fn new() -> Self {
        Self {
            done: Mutex::new(false),
            cv: Condvar::new(),
            notify: Notify::new(),
        }
    }

    fn set(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        *done = true;
        self.cv.notify_all();
        self.notify.notify_waiters();
    }

    fn is_set(&self) -> bool {
        *self.done.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_blocking(&self) {
        let mut done = self.done.lock().unwrap_or_else(PoisonError::into_inner);
        while !*done {
            done = self.cv.wait(done).unwrap_or_else(PoisonError::into_inner);
        }
    }

    async fn wait(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.is_set() {
                return;
            }
            notified.await;
        }
    }
}

struct ServerInner {
    port: u16,
    registry: Arc<Registry>,
    shutdown: ShutdownFlag,
    stop_requested: Notify,
    started: AtomicBool,
    stopped: StoppedLatch,
}

impl ServerInner {
    fn request_stop(&self) {
        if self.shutdown.raise() {
            kdebug!("server on port {} asked to stop", self.port);
        }
        self.stop_requested.notify_one();
    }
}

/// Owned by the accept loop. Marks the server stopped when the loop ends,
/// or when the loop is dropped unfinished because its context went away.
struct StoppedOnExit(Arc<ServerInner>);

impl Drop for StoppedOnExit {
    fn drop(&mut self) {
        let inner = &self.0;
        inner.shutdown.raise();
        inner.registry.close_all();
        inner.stopped.set();
    }
}

pub struct AcceptServer<F> {
    inner: Arc<ServerInner>,
    pool: Arc<ExecutionContextPool>,
    listener_ctx: ExecutionContext,
    listener: Mutex<Option<TcpListener>>,
    factory: Arc<F>,
}

impl<F, H> AcceptServer<F>
where
    F: Fn(&ExecutionContext) -> H + Send + Sync + 'static,
    H: ConnectionHandler,
{
    /// Bind `0.0.0.0:port` (0 = pick a free port) on a context from `pool`.
    pub fn new(port: u16, pool: &Arc<ExecutionContextPool>, factory: F) -> NetResult<Self> {
        Self::with_options(port, pool, factory, AcceptServerOptions::default())
    }

    pub fn with_options(
        port: u16,
        pool: &Arc<ExecutionContextPool>,
        factory: F,
        options: AcceptServerOptions,
    ) -> NetResult<Self> {
        let listener_ctx = pool.next_context();
        let (listener, signals) = {
            let _enter = listener_ctx.enter();
            let listener = bind_listener(port)?;
            let signals = if options.handle_signals {
                match TerminationSignals::install() {
                    Ok(signals) => Some(signals),
                    Err(e) => {
                        kwarn!("signal handlers not installed: {}", e);
                        None
                    }
                }
            } else {
                None
            };
            (listener, signals)
        };
        let port = listener.local_addr()?.port();
        kinfo!("listening on port {}", port);

        let inner = Arc::new(ServerInner {
            port,
            registry: Arc::new(Registry::new()),
            shutdown: ShutdownFlag::new(),
            stop_requested: Notify::new(),
            started: AtomicBool::new(false),
            stopped: StoppedLatch::new(),
        });

        if let Some(mut signals) = signals {
            let inner = Arc::clone(&inner);
            listener_ctx.spawn(async move {
                tokio::select! {
                    _ = signals.recv() => inner.request_stop(),
                    _ = inner.stopped.wait() => {}
                }
            });
        }

        Ok(Self {
            inner,
            pool: Arc::clone(pool),
            listener_ctx,
            listener: Mutex::new(Some(listener)),
            factory: Arc::new(factory),
        })
    }

    /// Bound port, as read back from the socket.
    #[inline]
    pub fn port(&self) -> u16 {
        self.inner.port
    }

    /// Start the accept loop. Only the first call has an effect.
    pub fn run(&self) {
        if self.inner.started.swap(true, Ordering::AcqRel) {
            kwarn!("AcceptServer::run called twice");
            return;
        }
        let listener = self
            .listener
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(listener) = listener else {
            self.inner.stopped.set();
            return;
        };

        self.listener_ctx.spawn(accept_loop(
            StoppedOnExit(Arc::clone(&self.inner)),
            listener,
            Arc::clone(&self.pool),
            Arc::clone(&self.factory),
        ));
    }

    /// Ask the server to stop. Returns immediately; use `wait` to block.
    pub fn stop(&self) {
        self.inner.request_stop();
        if !self.inner.started.swap(true, Ordering::AcqRel) {
            // Never ran: nothing to drain.
            self.listener
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            self.inner.stopped.set();
        }
    }

    /// Block the calling OS thread until the server has fully stopped.
    pub fn wait(&self) {
        self.inner.stopped.wait_blocking();
    }

    /// Suspend the calling fiber until the server has fully stopped.
    pub async fn wait_async(&self) {
        self.inner.stopped.wait().await;
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.is_set()
    }

    /// Stop was requested (by `stop`, a signal or the loop itself); the
    /// server may still be draining.
    pub fn is_stopping(&self) -> bool {
        self.inner.shutdown.is_raised()
    }

    /// Live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.registry.len()
    }
}

impl<F> Drop for AcceptServer<F> {
    fn drop(&mut self) {
        self.inner.request_stop();
        if !self.inner.started.swap(true, Ordering::AcqRel) {
            self.inner.stopped.set();
            return;
        }
        if self.pool.iter().any(|ctx| ctx.in_context_thread()) {
            kwarn!("AcceptServer dropped on an execution context; not waiting for drain");
            return;
        }
        self.inner.stopped.wait_blocking();
    }
}

/// Create, configure, bind and listen. Must run inside a runtime.
fn bind_listener(port: u16) -> io::Result<TcpListener> {
    let socket = TcpSocket::new_v4()?;
    socket.set_reuseaddr(true)?;
    socket.bind(([0, 0, 0, 0], port).into())?;
    socket.listen(MAX_BACKLOG_PENDING_CONNECTIONS)
}

async fn accept_loop<F, H>(
    exit: StoppedOnExit,
    listener: TcpListener,
    pool: Arc<ExecutionContextPool>,
    factory: Arc<F>,
) where
    F: Fn(&ExecutionContext) -> H + Send + Sync + 'static,
    H: ConnectionHandler,
{
    let inner = Arc::clone(&exit.0);
    kdebug!("accept loop started on port {}", inner.port);

    while !inner.shutdown.is_raised() {
        let ctx = pool.next_context();
        let handler = match catch_unwind(AssertUnwindSafe(|| (*factory)(&ctx))) {
            Ok(h) => h,
            Err(payload) => {
                kerror!("connection factory panicked: {}", panic_message(&*payload));
                break;
            }
        };

        let accepted = tokio::select! {
            _ = inner.stop_requested.notified() => break,
            r = listener.accept() => r,
        };
        let (stream, peer) = match accepted {
            Ok(pair) => pair,
            Err(e) => {
                if !inner.shutdown.is_raised() {
                    kerror!("accept failed: {}", e);
                }
                break;
            }
        };

        // Detach from this context's reactor; the handler context re-registers.
        let (stream, closer) = match stream.into_std().and_then(|s| {
            let closer = s.try_clone()?;
            Ok((s, closer))
        }) {
            Ok(pair) => pair,
            Err(e) => {
                kwarn!("dropping connection from {}: {}", peer, e);
                continue;
            }
        };

        let guard = inner.registry.insert(closer, Some(peer));
        kdebug!("accepted {} from {} on {}", guard.id(), peer, ctx.name());

        ctx.spawn(async move {
            let guard = guard;
            let id = guard.id();
            let stream = match TcpStream::from_std(stream) {
                Ok(s) => s,
                Err(e) => {
                    kwarn!("{}: cannot register socket: {}", id, e);
                    return;
                }
            };
            let mut handler = handler;
            let served = tokio::spawn(async move { handler.handle(stream).await });
            match served.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => kdebug!("{} ended with error: {}", id, e),
                Err(e) if e.is_panic() => {
                    kerror!("{} handler panicked: {}", id, panic_message(&*e.into_panic()))
                }
                Err(_) => kdebug!("{} cancelled", id),
            }
            drop(guard);
        });
    }

    drop(listener);
    let live = inner.registry.len();
    if live > 0 {
        kdebug!("force-closing {} live connections", live);
    }
    inner.registry.close_all();
    inner.registry.wait_empty().await;
    kinfo!("server on port {} stopped", inner.port);
    drop(exit);
}
