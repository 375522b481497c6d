//! # fiberio
//!
//! Cooperative network I/O on a small pool of OS threads.
//!
//! Each execution context is one OS thread running a single-threaded event
//! loop; fibers are tasks spawned on a context. Blocking calls go through
//! the `BlockingTaskBridge` so no context thread ever stalls.
//!
//! # Quick Start
//!
//! ```ignore
//! use fiberio::{Runtime, RuntimeConfig, AcceptServer};
//!
//! let rt = Runtime::new(RuntimeConfig::from_env())?;
//! let server = AcceptServer::new(8080, rt.pool(), |_ctx| MyHandler)?;
//! server.run();
//! server.wait();
//! ```
//!
//! # Environment
//!
//! See `RuntimeConfig::from_env` and `fiberio_core::kprint` for the
//! `FIO_*` variables.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub mod files;

// Re-export core types
pub use fiberio_core::{kdebug, kerror, kinfo, kprint, kprintln, ktrace, kwarn};
pub use fiberio_core::kprint::{
    init as init_logging, set_flush_enabled, set_log_level, set_time_enabled, LogLevel,
};
pub use fiberio_core::{NetError, NetResult, ShutdownFlag};
pub use fiberio_core::{env_get, env_get_bool, env_get_millis, env_get_str, env_is_set};

// Re-export runtime
pub use fiberio_runtime::{
    BlockingTaskBridge, ConfigError, ExecutionContext, ExecutionContextPool, FiberQueue,
    PushError, RuntimeConfig, TryPushError,
};

// Re-export components
pub use fiberio_file::{LocalReadFile, ReadonlyFile};
pub use fiberio_http::{
    is_object_path, open_object_reader, HttpConnectionPool, ObjectPath, PoolConfig, ReaderOptions,
    StreamingObjectReader,
};
pub use fiberio_net::{
    AcceptServer, AcceptServerOptions, ClientChannel, ClientChannelOptions, ConnectionHandler,
    ReconnectBackoff,
};

pub use files::{open_readonly_file, open_readonly_files, AnyReadFile, FileSources};

/// Context pool + blocking bridge, started together and torn down together.
pub struct Runtime {
    config: RuntimeConfig,
    pool: Arc<ExecutionContextPool>,
    bridge: Arc<BlockingTaskBridge>,
    running: AtomicBool,
}

impl Runtime {
    /// Validate `config` and start every thread it asks for.
    pub fn new(config: RuntimeConfig) -> NetResult<Self> {
        config
            .validate()
            .map_err(|e| NetError::invalid_argument(e.to_string()))?;
        let pool = Arc::new(ExecutionContextPool::from_config(&config)?);
        let bridge = Arc::new(BlockingTaskBridge::from_config(&config)?);
        kdebug!(
            "runtime up: {} contexts, {} bridge workers",
            pool.len(),
            bridge.thread_count()
        );
        Ok(Self {
            config,
            pool,
            bridge,
            running: AtomicBool::new(true),
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn pool(&self) -> &Arc<ExecutionContextPool> {
        &self.pool
    }

    pub fn bridge(&self) -> &Arc<BlockingTaskBridge> {
        &self.bridge
    }

    /// Sources for `open_readonly_file` backed by this runtime's bridge.
    pub fn file_sources(&self) -> FileSources {
        FileSources::local(&self.bridge)
    }

    /// Run `fut` on the next context and block until it finishes.
    pub fn block_on<F, T>(&self, fut: F) -> NetResult<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.pool.next_context().run_sync(fut)
    }

    /// Drain the bridge, then stop and join every context.
    pub fn shutdown(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            self.bridge.shutdown();
            self.pool.stop();
            self.pool.join();
            kdebug!("runtime stopped");
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn small() -> RuntimeConfig {
        RuntimeConfig::new()
            .num_contexts(2)
            .bridge_threads(1)
            .bridge_queue_size(4)
    }

    #[test]
    fn test_runtime_lifecycle() {
        let rt = Runtime::new(small()).unwrap();
        assert_eq!(rt.pool().len(), 2);
        assert_eq!(rt.bridge().thread_count(), 1);

        let bridge = Arc::clone(rt.bridge());
        let v = rt
            .block_on(async move { bridge.run(|| 20 + 22).await })
            .unwrap()
            .unwrap();
        assert_eq!(v, 42);

        rt.shutdown();
        rt.shutdown();
        assert!(rt.pool().iter().all(|c| c.is_stopped()));
    }

    #[test]
    fn test_invalid_config() {
        assert!(matches!(
            Runtime::new(small().bridge_queue_size(0)),
            Err(NetError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_open_skips_failures() {
        let rt = Runtime::new(small()).unwrap();
        let good = std::env::temp_dir().join(format!("fiberio-facade-{}", std::process::id()));
        std::fs::File::create(&good).unwrap().write_all(b"abc").unwrap();

        let paths = vec![
            good.display().to_string(),
            "/no/such/file".to_string(),
            "gs://bucket/obj".to_string(),
        ];
        let sources = rt.file_sources();
        let opened = rt
            .block_on(async move { open_readonly_files(&paths, &sources).await })
            .unwrap();

        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].1.size(), 3);
        std::fs::remove_file(good).ok();
    }

    #[test]
    fn test_object_path_needs_server() {
        let rt = Runtime::new(small()).unwrap();
        let sources = rt.file_sources();
        let r = rt
            .block_on(async move { open_readonly_file("gs://b/o", &sources).await.map(|_| ()) })
            .unwrap();
        assert!(matches!(r, Err(NetError::InvalidArgument(_))));
    }
}
