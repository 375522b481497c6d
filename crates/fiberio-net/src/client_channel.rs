//! # ClientChannel
//!
//! One outbound logical connection pinned to an execution context.
//!
//! `connect` runs a resolve-connect-retry loop bounded by the caller's
//! timeout. Once connected, any failed socket operation hands the error to
//! `handle_error_status`, which starts a background reconnect fiber running
//! the same loop with a 30s budget per round until the channel is healthy
//! again or shut down.
//!
//! All socket and status mutation happens on fibers of the owning context.
//! Explicit connects and background reconnects share one guard so they
//! never overlap.

use std::net::Shutdown;
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::time::{sleep_until, timeout_at, Instant};

use fiberio_core::{kdebug, kinfo, ktrace, kwarn, NetError, NetResult, ShutdownFlag};
use fiberio_runtime::ExecutionContext;

use crate::backoff::ReconnectBackoff;

/// Default budget of one background reconnect round.
pub const RECONNECT_DEADLINE: Duration = Duration::from_secs(30);

/// Below this remaining budget a round gives up instead of sleeping.
const MIN_REMAINING: Duration = Duration::from_millis(2);

#[derive(Debug, Clone)]
pub struct ClientChannelOptions {
    /// Budget of each background reconnect round. A round that runs out
    /// while the channel is still failing is followed by another one.
    pub reconnect_deadline: Duration,
}

impl Default for ClientChannelOptions {
    fn default() -> Self {
        Self { reconnect_deadline: RECONNECT_DEADLINE }
    }
}

/// Guard flag shared by `connect` and the reconnect fiber.
struct ReconnectState {
    active: Mutex<bool>,
    idle: Condvar,
    idle_notify: Notify,
}

impl ReconnectState {
    fn new() -> Self {
        Self {
            active: Mutex::new(false),
            idle: Condvar::new(),
            idle_notify: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the guard. False if someone else holds it.
    fn try_begin(&self) -> bool {
        let mut active = self.lock();
        if *active {
            return false;
        }
        *active = true;
        true
    }

    fn finish(&self) {
        let mut active = self.lock();
        *active = false;
        self.idle.notify_all();
        self.idle_notify.notify_waiters();
    }

    fn is_active(&self) -> bool {
        *self.lock()
    }

    fn wait_idle_blocking(&self) {
        let mut active = self.lock();
        while *active {
            active = self.idle.wait(active).unwrap_or_else(PoisonError::into_inner);
        }
    }

    async fn wait_idle(&self) {
        loop {
            let mut notified = pin!(self.idle_notify.notified());
            notified.as_mut().enable();
            if !self.is_active() {
                return;
            }
            notified.await;
        }
    }
}

/// Releases the reconnect guard when dropped, including on cancellation.
struct ReconnectRelease(Arc<ChannelInner>);

impl Drop for ReconnectRelease {
    fn drop(&mut self) {
        self.0.reconnect.finish();
    }
}

struct ChannelInner {
    hostname: String,
    service: String,
    context: ExecutionContext,
    status: Mutex<NetResult<()>>,
    reader: AsyncMutex<Option<OwnedReadHalf>>,
    writer: AsyncMutex<Option<OwnedWriteHalf>>,
    /// Duplicate of the live socket, for force-close from any thread.
    closer: Mutex<Option<std::net::TcpStream>>,
    shutting_down: ShutdownFlag,
    /// Wakes backoff sleeps on shutdown.
    wake: Notify,
    reconnect: ReconnectState,
    reconnects: AtomicU64,
    options: ClientChannelOptions,
}

impl ChannelInner {
    fn status(&self) -> NetResult<()> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_status(&self, status: NetResult<()>) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    fn target(&self) -> String {
        format!("{}:{}", self.hostname, self.service)
    }

    fn force_close(&self) {
        let closer = self.closer.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(sock) = closer {
            let _ = sock.shutdown(Shutdown::Both);
        }
    }

    fn begin_shutdown(&self) {
        if self.shutting_down.raise() {
            kdebug!("channel to {} shutting down", self.target());
        }
        self.force_close();
        self.wake.notify_waiters();
    }

    /// Swap in a freshly connected socket. Runs on the owning context.
    async fn install(&self, stream: TcpStream) -> NetResult<()> {
        let std_stream = stream.into_std()?;
        let closer = std_stream.try_clone()?;
        let stream = TcpStream::from_std(std_stream)?;
        stream.set_nodelay(true)?;
        let (r, w) = stream.into_split();

        *self.reader.lock().await = Some(r);
        *self.writer.lock().await = Some(w);
        let old = self
            .closer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(closer);
        if let Some(old) = old {
            let _ = old.shutdown(Shutdown::Both);
        }
        Ok(())
    }

    fn handle_error_status(self: &Arc<Self>, err: NetError) {
        if self.shutting_down.is_raised() {
            return;
        }
        if !self.reconnect.try_begin() {
            ktrace!("{}: reconnect already active, ignoring {}", self.target(), err);
            return;
        }
        kwarn!("{}: {}; reconnecting", self.target(), err);
        self.set_status(Err(err));
        self.force_close();
        self.reconnects.fetch_add(1, Ordering::Relaxed);

        let release = ReconnectRelease(Arc::clone(self));
        self.context.spawn(async move {
            let inner = Arc::clone(&release.0);
            while !inner.shutting_down.is_raised() && inner.status().is_err() {
                let until = Instant::now() + inner.options.reconnect_deadline;
                let _ = resolve_and_connect(&inner, until).await;
            }
            if inner.status().is_ok() {
                kinfo!("{}: reconnected", inner.target());
            }
            drop(release);
        });
    }

    fn io_failed(self: &Arc<Self>, err: NetError) -> NetError {
        self.handle_error_status(err.clone());
        err
    }

    /// Error to report when there is no socket to use.
    fn unavailable(&self) -> NetError {
        match self.status() {
            Err(e) => e,
            Ok(()) => NetError::NotConnected,
        }
    }
}

/// Resolve the target and dial every address in turn.
async fn dial(target: &str) -> NetResult<TcpStream> {
    let addrs = lookup_host(target)
        .await
        .map_err(|e| NetError::Resolve(format!("{}: {}", target, e)))?;

    let mut last = NetError::Resolve(format!("{}: no addresses", target));
    for addr in addrs {
        match TcpStream::connect(addr).await {
            Ok(stream) => return Ok(stream),
            Err(e) => {
                ktrace!("connect {} failed: {}", addr, e);
                last = e.into();
            }
        }
    }
    Err(last)
}

/// Resolve-connect-retry until connected, shut down or `until` passes.
///
/// Leaves the outcome in the channel status and returns it.
async fn resolve_and_connect(inner: &ChannelInner, until: Instant) -> NetResult<()> {
    let target = inner.target();
    let mut backoff = ReconnectBackoff::new();

    loop {
        if inner.status().is_ok() {
            return Ok(());
        }

        let mut woken = pin!(inner.wake.notified());
        woken.as_mut().enable();

        if inner.shutting_down.is_raised() || Instant::now() + MIN_REMAINING >= until {
            break;
        }

        // Shutdown abandons a dial still in flight.
        let attempt = tokio::select! {
            r = timeout_at(until, dial(&target)) => r,
            _ = woken.as_mut() => break,
        };

        match attempt {
            Ok(Ok(stream)) => match inner.install(stream).await {
                Ok(()) if inner.shutting_down.is_raised() => {
                    inner.force_close();
                    break;
                }
                Ok(()) => {
                    ktrace!("connected to {}", target);
                    inner.set_status(Ok(()));
                    return Ok(());
                }
                Err(e) => kdebug!("{}: socket setup failed: {}", target, e),
            },
            Ok(Err(e)) => kdebug!("{}: {}", target, e),
            Err(_) => kdebug!("{}: connect timed out", target),
        }

        let now = Instant::now();
        if inner.shutting_down.is_raised() || now + MIN_REMAINING >= until {
            break;
        }
        let wake_at = (now + backoff.next_delay()).min(until - MIN_REMAINING);
        tokio::select! {
            _ = sleep_until(wake_at) => {}
            _ = woken.as_mut() => {}
        }
    }

    inner.set_status(Err(NetError::Aborted));
    Err(NetError::Aborted)
}

pub struct ClientChannel {
    inner: Arc<ChannelInner>,
}

impl ClientChannel {
    /// Channel to `hostname:service` (numeric port) owned by `context`.
    ///
    /// Nothing is resolved or dialled until `connect`.
    pub fn new(
        hostname: impl Into<String>,
        service: impl Into<String>,
        context: &ExecutionContext,
    ) -> Self {
        Self::with_options(hostname, service, context, ClientChannelOptions::default())
    }

    pub fn with_options(
        hostname: impl Into<String>,
        service: impl Into<String>,
        context: &ExecutionContext,
        options: ClientChannelOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ChannelInner {
                hostname: hostname.into(),
                service: service.into(),
                context: context.clone(),
                status: Mutex::new(Err(NetError::NotConnected)),
                reader: AsyncMutex::new(None),
                writer: AsyncMutex::new(None),
                closer: Mutex::new(None),
                shutting_down: ShutdownFlag::new(),
                wake: Notify::new(),
                reconnect: ReconnectState::new(),
                reconnects: AtomicU64::new(0),
                options,
            }),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.inner.hostname
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    pub fn context(&self) -> &ExecutionContext {
        &self.inner.context
    }

    /// Last observed status.
    pub fn status(&self) -> NetResult<()> {
        self.inner.status()
    }

    pub fn is_connected(&self) -> bool {
        self.inner.status().is_ok()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.inner.reconnect.is_active()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.inner.shutting_down.is_raised()
    }

    /// Background reconnects started so far.
    pub fn reconnect_count(&self) -> u64 {
        self.inner.reconnects.load(Ordering::Relaxed)
    }

    fn claim_connect(&self) {
        assert!(
            !self.inner.shutting_down.is_raised(),
            "ClientChannel::connect after shutdown"
        );
        assert!(
            self.inner.reconnect.try_begin(),
            "ClientChannel::connect while a reconnect is in progress"
        );
    }

    /// Connect within `timeout`, suspending the calling fiber.
    ///
    /// Returns immediately if already connected.
    ///
    /// # Panics
    ///
    /// If the channel is shutting down or reconnecting.
    pub async fn connect(&self, timeout: Duration) -> NetResult<()> {
        self.claim_connect();
        let release = ReconnectRelease(Arc::clone(&self.inner));
        let until = Instant::now() + timeout;
        self.inner
            .context
            .await_on(async move {
                let result = resolve_and_connect(&release.0, until).await;
                drop(release);
                result
            })
            .await?
    }

    /// `connect` for OS threads.
    ///
    /// # Panics
    ///
    /// If the channel is shutting down or reconnecting.
    pub fn connect_blocking(&self, timeout: Duration) -> NetResult<()> {
        self.claim_connect();
        let release = ReconnectRelease(Arc::clone(&self.inner));
        let until = Instant::now() + timeout;
        self.inner
            .context
            .run_sync(async move {
                let result = resolve_and_connect(&release.0, until).await;
                drop(release);
                result
            })?
    }

    /// Report a failed socket operation; starts a reconnect unless one is
    /// already running or the channel is shutting down.
    pub fn handle_error_status(&self, err: NetError) {
        self.inner.handle_error_status(err);
    }

    /// Write all of `data` on the owning context.
    pub async fn write_all(&self, data: &[u8]) -> NetResult<()> {
        let inner = Arc::clone(&self.inner);
        let data = data.to_vec();
        self.inner
            .context
            .await_on(async move {
                inner.shutting_down.check()?;
                let mut writer = inner.writer.lock().await;
                let Some(w) = writer.as_mut() else {
                    return Err(inner.unavailable());
                };
                match w.write_all(&data).await {
                    Ok(()) => Ok(()),
                    Err(e) => {
                        *writer = None;
                        drop(writer);
                        Err(inner.io_failed(e.into()))
                    }
                }
            })
            .await?
    }

    /// Read at most `max` bytes on the owning context.
    ///
    /// Peer EOF is reported as `ConnectionClosed` and triggers a reconnect.
    pub async fn read_some(&self, max: usize) -> NetResult<Vec<u8>> {
        let inner = Arc::clone(&self.inner);
        self.inner
            .context
            .await_on(async move {
                inner.shutting_down.check()?;
                let mut reader = inner.reader.lock().await;
                let Some(r) = reader.as_mut() else {
                    return Err(inner.unavailable());
                };
                let mut buf = vec![0u8; max];
                let failure = match r.read(&mut buf).await {
                    Ok(0) if max > 0 => NetError::ConnectionClosed,
                    Ok(n) => {
                        buf.truncate(n);
                        return Ok(buf);
                    }
                    Err(e) => e.into(),
                };
                *reader = None;
                drop(reader);
                if inner.shutting_down.is_raised() {
                    return Err(NetError::ShuttingDown);
                }
                Err(inner.io_failed(failure))
            })
            .await?
    }

    /// Mark terminal, close the socket, wait for any reconnect to exit.
    pub async fn shutdown(&self) {
        self.inner.begin_shutdown();
        self.inner.reconnect.wait_idle().await;
    }

    /// `shutdown` for OS threads.
    pub fn shutdown_blocking(&self) {
        self.inner.begin_shutdown();
        if self.inner.context.in_context_thread() {
            kwarn!("shutdown_blocking on the channel's own context; not waiting");
            return;
        }
        self.inner.reconnect.wait_idle_blocking();
    }
}

impl Drop for ClientChannel {
    fn drop(&mut self) {
        self.inner.begin_shutdown();
    }
}

impl std::fmt::Debug for ClientChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientChannel")
            .field("target", &self.inner.target())
            .field("status", &self.inner.status())
            .field("reconnecting", &self.is_reconnecting())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::time::Instant as StdInstant;

    fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
        let deadline = StdInstant::now() + Duration::from_secs(5);
        while StdInstant::now() < deadline {
            if cond() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    /// A loopback port nothing listens on.
    fn refused_port() -> u16 {
        let l = TcpListener::bind("127.0.0.1:0").unwrap();
        l.local_addr().unwrap().port()
    }

    fn accept_within(listener: &TcpListener) -> std::net::TcpStream {
        listener.set_nonblocking(true).unwrap();
        let deadline = StdInstant::now() + Duration::from_secs(5);
        loop {
            match listener.accept() {
                Ok((s, _)) => {
                    s.set_nonblocking(false).unwrap();
                    return s;
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    assert!(StdInstant::now() < deadline, "no connection arrived");
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(e) => panic!("accept: {}", e),
            }
        }
    }

    #[test]
    fn test_connect_ok() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let ctx = ExecutionContext::new(0).unwrap();

        let ch = ClientChannel::new("127.0.0.1", port.to_string(), &ctx);
        assert_eq!(ch.status(), Err(NetError::NotConnected));
        assert_eq!(ch.connect_blocking(Duration::from_secs(2)), Ok(()));
        assert!(ch.is_connected());
        assert!(!ch.is_reconnecting());

        // Already connected: no second dial.
        assert_eq!(ch.connect_blocking(Duration::from_secs(2)), Ok(()));
        let _peer = accept_within(&listener);
        ch.shutdown_blocking();
    }

    #[test]
    fn test_connect_refused_respects_deadline() {
        let port = refused_port();
        let ctx = ExecutionContext::new(0).unwrap();
        let ch = ClientChannel::new("127.0.0.1", port.to_string(), &ctx);

        let start = StdInstant::now();
        let result = ch.connect_blocking(Duration::from_millis(500));
        let elapsed = start.elapsed();

        assert_eq!(result, Err(NetError::Aborted));
        assert_eq!(ch.status(), Err(NetError::Aborted));
        assert!(elapsed >= Duration::from_millis(400), "gave up early: {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(1500), "overran deadline: {:?}", elapsed);
        assert!(!ch.is_reconnecting());
    }

    #[test]
    fn test_resolve_failure_is_aborted() {
        let ctx = ExecutionContext::new(0).unwrap();
        let ch = ClientChannel::new("127.0.0.1", "not-a-port", &ctx);
        assert_eq!(
            ch.connect_blocking(Duration::from_millis(150)),
            Err(NetError::Aborted)
        );
    }

    #[test]
    fn test_write_and_read() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let ctx = ExecutionContext::new(0).unwrap();
        let caller = ExecutionContext::new(1).unwrap();

        let ch = Arc::new(ClientChannel::new("127.0.0.1", port.to_string(), &ctx));
        ch.connect_blocking(Duration::from_secs(2)).unwrap();
        let mut peer = accept_within(&listener);

        let c = Arc::clone(&ch);
        caller
            .run_sync(async move { c.write_all(b"ping").await })
            .unwrap()
            .unwrap();
        let mut buf = [0u8; 4];
        peer.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"ping");

        peer.write_all(b"pong").unwrap();
        let c = Arc::clone(&ch);
        let got = caller
            .run_sync(async move { c.read_some(16).await })
            .unwrap()
            .unwrap();
        assert_eq!(got, b"pong");

        ch.shutdown_blocking();
    }

    #[test]
    fn test_reconnects_after_peer_drop() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let ctx = ExecutionContext::new(0).unwrap();
        let caller = ExecutionContext::new(1).unwrap();

        let ch = Arc::new(ClientChannel::new("127.0.0.1", port.to_string(), &ctx));
        ch.connect_blocking(Duration::from_secs(2)).unwrap();
        drop(accept_within(&listener));

        let c = Arc::clone(&ch);
        let r = caller.run_sync(async move { c.read_some(16).await }).unwrap();
        assert!(r.is_err());
        assert_eq!(ch.reconnect_count(), 1);

        // The listener is still up, so the reconnect fiber dials it again.
        let _second = accept_within(&listener);
        assert!(wait_until(|| ch.is_connected() && !ch.is_reconnecting()));

        ch.shutdown_blocking();
    }

    #[test]
    fn test_error_while_reconnecting_is_noop() {
        let port = refused_port();
        let ctx = ExecutionContext::new(0).unwrap();
        let ch = ClientChannel::new("127.0.0.1", port.to_string(), &ctx);

        ch.handle_error_status(NetError::ConnectionClosed);
        assert!(ch.is_reconnecting());
        ch.handle_error_status(NetError::ConnectionClosed);
        ch.handle_error_status(NetError::NotConnected);
        assert_eq!(ch.reconnect_count(), 1);

        // Shutdown wakes the backoff sleep and waits for the fiber to leave.
        let start = StdInstant::now();
        ch.shutdown_blocking();
        assert!(!ch.is_reconnecting());
        assert!(start.elapsed() < Duration::from_secs(2));
        assert!(ch.status().is_err());
    }

    #[test]
    fn test_error_after_shutdown_ignored() {
        let ctx = ExecutionContext::new(0).unwrap();
        let ch = ClientChannel::new("127.0.0.1", refused_port().to_string(), &ctx);
        ch.shutdown_blocking();
        ch.handle_error_status(NetError::ConnectionClosed);
        assert!(!ch.is_reconnecting());
        assert_eq!(ch.reconnect_count(), 0);
    }

    #[test]
    #[should_panic(expected = "after shutdown")]
    fn test_connect_after_shutdown_panics() {
        let ctx = ExecutionContext::new(0).unwrap();
        let ch = ClientChannel::new("127.0.0.1", "1", &ctx);
        ch.shutdown_blocking();
        let _ = ch.connect_blocking(Duration::from_millis(10));
    }

    /// Listener with a full accept queue; further connects hang in SYN_SENT.
    fn saturated_listener(
        ctx: &ExecutionContext,
    ) -> (tokio::net::TcpListener, u16, Vec<std::net::TcpStream>) {
        let listener = {
            let _enter = ctx.enter();
            let socket = tokio::net::TcpSocket::new_v4().unwrap();
            socket.bind(([127, 0, 0, 1], 0).into()).unwrap();
            socket.listen(1).unwrap()
        };
        let addr = listener.local_addr().unwrap();
        let mut held = Vec::new();
        for _ in 0..16 {
            match std::net::TcpStream::connect_timeout(&addr, Duration::from_millis(200)) {
                Ok(s) => held.push(s),
                Err(_) => break,
            }
        }
        (listener, addr.port(), held)
    }

    #[test]
    fn test_shutdown_interrupts_hanging_reconnect_dial() {
        let ctx = ExecutionContext::new(0).unwrap();
        let (_listener, port, _held) = saturated_listener(&ctx);
        let ch = ClientChannel::new("127.0.0.1", port.to_string(), &ctx);

        ch.handle_error_status(NetError::ConnectionClosed);
        std::thread::sleep(Duration::from_millis(300));
        assert!(ch.is_reconnecting());

        let start = StdInstant::now();
        ch.shutdown_blocking();
        assert!(
            start.elapsed() < Duration::from_secs(2),
            "shutdown waited on the dial: {:?}",
            start.elapsed()
        );
        assert!(!ch.is_reconnecting());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn test_shutdown_during_connect_returns_aborted() {
        let ctx = ExecutionContext::new(0).unwrap();
        let (_listener, port, _held) = saturated_listener(&ctx);
        let ch = Arc::new(ClientChannel::new("127.0.0.1", port.to_string(), &ctx));

        let start = StdInstant::now();
        let connecting = {
            let ch = Arc::clone(&ch);
            std::thread::spawn(move || ch.connect_blocking(Duration::from_secs(10)))
        };
        std::thread::sleep(Duration::from_millis(250));
        ch.shutdown_blocking();

        assert_eq!(connecting.join().unwrap(), Err(NetError::Aborted));
        assert!(start.elapsed() < Duration::from_secs(3), "{:?}", start.elapsed());
        assert_eq!(ch.status(), Err(NetError::Aborted));
    }

    #[test]
    fn test_reconnect_rearms_after_exhausted_round() {
        let port = refused_port();
        let ctx = ExecutionContext::new(0).unwrap();
        let options = ClientChannelOptions {
            reconnect_deadline: Duration::from_millis(150),
        };
        let ch = ClientChannel::with_options("127.0.0.1", port.to_string(), &ctx, options);

        ch.handle_error_status(NetError::ConnectionClosed);
        // Several 150ms rounds have run out by now.
        std::thread::sleep(Duration::from_millis(600));
        assert!(ch.is_reconnecting());
        assert_eq!(ch.status(), Err(NetError::Aborted));
        assert_eq!(ch.reconnect_count(), 1);

        // A later round finds the peer.
        let listener = TcpListener::bind(("127.0.0.1", port)).unwrap();
        let _peer = accept_within(&listener);
        assert!(wait_until(|| ch.is_connected() && !ch.is_reconnecting()));

        ch.shutdown_blocking();
    }

    #[tokio::test]
    async fn test_async_shutdown() {
        let ctx = ExecutionContext::new(0).unwrap();
        let ch = ClientChannel::new("127.0.0.1", refused_port().to_string(), &ctx);
        ch.handle_error_status(NetError::ConnectionClosed);
        tokio::time::timeout(Duration::from_secs(2), ch.shutdown())
            .await
            .unwrap();
        assert!(ch.is_shutting_down());
        assert!(!ch.is_reconnecting());
    }
}
