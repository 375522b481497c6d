//! HTTP/1.1 connection pool for one authority.
//!
//! A `ClientHandle` lends one connection. Dropping the handle returns the
//! connection to the idle list unless it was scheduled for reconnection or
//! has already closed; the next `acquire` reuses it if it is ready.
//!
//! Connection drivers run as fibers on whichever context called `acquire`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use http_body_util::Empty;
use hyper::body::{Bytes, Incoming};
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::{HeaderValue, HOST, RANGE};
use hyper::{Request, Response};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use fiberio_core::{kdebug, ktrace, kwarn, NetError, NetResult};

use crate::error::{from_hyper, is_retryable};

/// Request body type; object reads are bodiless GETs.
pub type RequestBody = Empty<Bytes>;

/// How long `acquire` waits for an idle connection to become ready.
const IDLE_READY_WAIT: Duration = Duration::from_millis(50);

#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Tries per request across fresh connections.
    pub send_attempts: u32,
    pub connect_timeout: Duration,
    /// Idle connections kept around.
    pub max_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            send_attempts: 3,
            connect_timeout: Duration::from_secs(2),
            max_idle: 16,
        }
    }
}

struct PoolInner {
    authority: String,
    host: HeaderValue,
    config: PoolConfig,
    idle: Mutex<Vec<SendRequest<RequestBody>>>,
    dialed: AtomicU64,
}

impl PoolInner {
    fn idle(&self) -> MutexGuard<'_, Vec<SendRequest<RequestBody>>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn dial(&self) -> NetResult<SendRequest<RequestBody>> {
        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(self.authority.as_str()),
        )
        .await
        .map_err(|_| NetError::Aborted)??;
        stream.set_nodelay(true)?;

        let (sender, conn) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(from_hyper)?;
        let authority = self.authority.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                kdebug!("connection to {} ended: {}", authority, e);
            }
        });

        self.dialed.fetch_add(1, Ordering::Relaxed);
        ktrace!("dialed {}", self.authority);
        Ok(sender)
    }

    fn give_back(&self, sender: SendRequest<RequestBody>) {
        if sender.is_closed() {
            return;
        }
        let mut idle = self.idle();
        if idle.len() < self.config.max_idle {
            idle.push(sender);
        }
    }
}

/// Pool of HTTP/1.1 connections to `host:port`. Cheap to clone.
#[derive(Clone)]
pub struct HttpConnectionPool {
    inner: Arc<PoolInner>,
}

impl HttpConnectionPool {
    pub fn new(authority: impl Into<String>, config: PoolConfig) -> NetResult<Self> {
        let authority = authority.into();
        let host = HeaderValue::from_str(&authority)
            .map_err(|_| NetError::invalid_argument(format!("bad authority: {}", authority)))?;
        Ok(Self {
            inner: Arc::new(PoolInner {
                authority,
                host,
                config,
                idle: Mutex::new(Vec::new()),
                dialed: AtomicU64::new(0),
            }),
        })
    }

    pub fn authority(&self) -> &str {
        &self.inner.authority
    }

    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// Lend a connection: a ready idle one, or a freshly dialled one.
    pub async fn acquire(&self) -> NetResult<ClientHandle> {
        loop {
            let candidate = self.inner.idle().pop();
            let Some(mut sender) = candidate else { break };
            if sender.is_closed() {
                continue;
            }
            if sender.is_ready() {
                return Ok(self.handle(Some(sender)));
            }
            match tokio::time::timeout(IDLE_READY_WAIT, sender.ready()).await {
                Ok(Ok(())) => return Ok(self.handle(Some(sender))),
                _ => ktrace!("discarding idle connection to {}", self.inner.authority),
            }
        }
        let sender = self.inner.dial().await?;
        Ok(self.handle(Some(sender)))
    }

    fn handle(&self, sender: Option<SendRequest<RequestBody>>) -> ClientHandle {
        ClientHandle {
            pool: Arc::clone(&self.inner),
            sender,
            reconnect: false,
        }
    }

    pub fn idle_count(&self) -> usize {
        self.inner.idle().len()
    }

    /// Connections dialled over the pool's lifetime.
    pub fn connections_dialed(&self) -> u64 {
        self.inner.dialed.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for HttpConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpConnectionPool")
            .field("authority", &self.inner.authority)
            .field("idle", &self.idle_count())
            .finish()
    }
}

/// One lent connection.
pub struct ClientHandle {
    pool: Arc<PoolInner>,
    sender: Option<SendRequest<RequestBody>>,
    reconnect: bool,
}

impl ClientHandle {
    fn build_get(&self, path: &str, range: Option<&str>) -> NetResult<Request<RequestBody>> {
        let mut req = Request::get(path).header(HOST, self.pool.host.clone());
        if let Some(range) = range {
            req = req.header(RANGE, range);
        }
        req.body(Empty::new())
            .map_err(|e| NetError::invalid_argument(format!("{}: {}", path, e)))
    }

    /// GET `path`, retrying on a fresh connection when the current one
    /// turns out to be dead.
    pub async fn get(&mut self, path: &str, range: Option<&str>) -> NetResult<Response<Incoming>> {
        let attempts = self.pool.config.send_attempts.max(1);
        let mut last = NetError::NotConnected;

        for attempt in 1..=attempts {
            let mut sender = match self.sender.take() {
                Some(s) if !s.is_closed() => s,
                _ => match self.pool.dial().await {
                    Ok(s) => s,
                    Err(e) => {
                        kdebug!("{}: dial attempt {} failed: {}", self.pool.authority, attempt, e);
                        last = e;
                        continue;
                    }
                },
            };

            if let Err(e) = sender.ready().await {
                kdebug!("{}: connection not usable: {}", self.pool.authority, e);
                last = from_hyper(e);
                continue;
            }

            match sender.send_request(self.build_get(path, range)?).await {
                Ok(resp) => {
                    self.sender = Some(sender);
                    return Ok(resp);
                }
                Err(e) if is_retryable(&e) => {
                    kdebug!("{}: GET {} attempt {} failed: {}", self.pool.authority, path, attempt, e);
                    last = from_hyper(e);
                }
                Err(e) => return Err(from_hyper(e)),
            }
        }

        kwarn!("{}: GET {} gave up after {} attempts", self.pool.authority, path, attempts);
        Err(last)
    }

    /// Drop the connection instead of returning it to the pool.
    pub fn schedule_reconnect(&mut self) {
        self.reconnect = true;
        self.sender = None;
    }

    pub fn is_reconnect_scheduled(&self) -> bool {
        self.reconnect
    }
}

impl Drop for ClientHandle {
    fn drop(&mut self) {
        if self.reconnect {
            return;
        }
        if let Some(sender) = self.sender.take() {
            self.pool.give_back(sender);
        }
    }
}
