//! Echo server on AcceptServer
//!
//! Every connection is echoed back on a fiber of one of the pool's
//! execution contexts. SIGINT/SIGTERM closes the listener, shuts down the
//! live connections and exits once they have all drained.
//!
//! Usage:
//!     ./target/release/echo-server [port]
//!
//! Environment:
//!     FIO_NUM_CONTEXTS, FIO_LOG_LEVEL, ... (see RuntimeConfig)
//!     FIO_PRINT_CONFIG=1   print the effective configuration

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use fiberio::{
    env_is_set, init_logging, kerror, kinfo, AcceptServer, ConnectionHandler, ExecutionContext, Runtime,
    RuntimeConfig,
};

struct Stats {
    accepts: AtomicU64,
    bytes_in: AtomicU64,
    bytes_out: AtomicU64,
    active: AtomicU64,
    errors: AtomicU64,
}

impl Stats {
    fn new() -> Self {
        Self {
            accepts: AtomicU64::new(0),
            bytes_in: AtomicU64::new(0),
            bytes_out: AtomicU64::new(0),
            active: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        }
    }

    fn print(&self, elapsed: f64) {
        eprintln!(
            "[{:.1}s] active={} accepts={} bytes_in={} bytes_out={} err={}",
            elapsed,
            self.active.load(Ordering::Relaxed),
            self.accepts.load(Ordering::Relaxed),
            self.bytes_in.load(Ordering::Relaxed),
            self.bytes_out.load(Ordering::Relaxed),
            self.errors.load(Ordering::Relaxed),
        );
    }
}

struct EchoHandler {
    stats: Arc<Stats>,
}

impl ConnectionHandler for EchoHandler {
    async fn handle(&mut self, mut stream: TcpStream) -> io::Result<()> {
        let stats = &self.stats;
        stats.accepts.fetch_add(1, Ordering::Relaxed);
        stats.active.fetch_add(1, Ordering::Relaxed);

        let mut buf = [0u8; 4096];
        let result = loop {
            let n = match stream.read(&mut buf).await {
                Ok(0) => break Ok(()),
                Ok(n) => n,
                Err(e) => break Err(e),
            };
            stats.bytes_in.fetch_add(n as u64, Ordering::Relaxed);
            if let Err(e) = stream.write_all(&buf[..n]).await {
                break Err(e);
            }
            stats.bytes_out.fetch_add(n as u64, Ordering::Relaxed);
        };

        if result.is_err() {
            stats.errors.fetch_add(1, Ordering::Relaxed);
        }
        stats.active.fetch_sub(1, Ordering::Relaxed);
        result
    }
}

fn main() {
    init_logging();
    let args: Vec<String> = std::env::args().collect();
    let port: u16 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(9998);

    let rt = match Runtime::new(RuntimeConfig::from_env()) {
        Ok(rt) => rt,
        Err(e) => {
            kerror!("echo-server: {}", e);
            std::process::exit(1);
        }
    };
    if env_is_set("FIO_PRINT_CONFIG") {
        rt.config().print();
    }

    let stats = Arc::new(Stats::new());
    let factory = {
        let stats = Arc::clone(&stats);
        move |_ctx: &ExecutionContext| EchoHandler { stats: Arc::clone(&stats) }
    };

    let server = match AcceptServer::new(port, rt.pool(), factory) {
        Ok(s) => s,
        Err(e) => {
            kerror!("echo-server: cannot listen on {}: {}", port, e);
            std::process::exit(1);
        }
    };

    eprintln!("echo-server: listening on 0.0.0.0:{}", server.port());
    eprintln!("echo-server: {} execution contexts", rt.pool().len());

    // Stats printer
    let start = Instant::now();
    let stats_clone = Arc::clone(&stats);
    rt.pool().next_context().spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(5));
        interval.tick().await;
        loop {
            interval.tick().await;
            stats_clone.print(start.elapsed().as_secs_f64());
        }
    });

    server.run();
    server.wait();

    kinfo!("echo-server: drained");
    stats.print(start.elapsed().as_secs_f64());
    drop(server);
    rt.shutdown();
}
