//! Runtime configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder calls
//! 2. Environment variables
//! 3. Library defaults (`config::defaults`)
//!
//! # Example
//!
//! ```rust,ignore
//! use fiberio_runtime::config::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env()
//!     .num_contexts(4)
//!     .bridge_queue_size(64);
//! config.validate()?;
//! ```

pub mod defaults;

use std::time::Duration;
use fiberio_core::env::{env_get, env_get_millis};

/// Runtime configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of execution contexts (0 = hardware concurrency)
    pub num_contexts: usize,
    /// Number of blocking bridge workers (0 = hardware concurrency)
    pub bridge_threads: usize,
    /// Capacity of the bridge's bounded queue
    pub bridge_queue_size: usize,
    /// Default budget for `ClientChannel::connect`
    pub connect_timeout: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Create config from library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `FIO_NUM_CONTEXTS` - Execution contexts
    /// - `FIO_BRIDGE_THREADS` - Blocking bridge workers
    /// - `FIO_BRIDGE_QUEUE_SIZE` - Bridge queue capacity
    /// - `FIO_CONNECT_TIMEOUT_MS` - Default connect budget
    pub fn from_env() -> Self {
        Self {
            num_contexts: env_get("FIO_NUM_CONTEXTS", defaults::NUM_CONTEXTS),
            bridge_threads: env_get("FIO_BRIDGE_THREADS", defaults::BRIDGE_THREADS),
            bridge_queue_size: env_get("FIO_BRIDGE_QUEUE_SIZE", defaults::BRIDGE_QUEUE_SIZE),
            connect_timeout: env_get_millis("FIO_CONNECT_TIMEOUT_MS", defaults::CONNECT_TIMEOUT_MS),
        }
    }

    /// Create config with library defaults only (no env override).
    pub fn new() -> Self {
        Self {
            num_contexts: defaults::NUM_CONTEXTS,
            bridge_threads: defaults::BRIDGE_THREADS,
            bridge_queue_size: defaults::BRIDGE_QUEUE_SIZE,
            connect_timeout: Duration::from_millis(defaults::CONNECT_TIMEOUT_MS),
        }
    }

    // Builder methods

    pub fn num_contexts(mut self, n: usize) -> Self {
        self.num_contexts = n;
        self
    }

    pub fn bridge_threads(mut self, n: usize) -> Self {
        self.bridge_threads = n;
        self
    }

    pub fn bridge_queue_size(mut self, n: usize) -> Self {
        self.bridge_queue_size = n;
        self
    }

    pub fn connect_timeout(mut self, d: Duration) -> Self {
        self.connect_timeout = d;
        self
    }

    /// Context count with 0 resolved to hardware concurrency.
    pub fn effective_contexts(&self) -> usize {
        resolve_thread_count(self.num_contexts)
    }

    /// Bridge worker count with 0 resolved to hardware concurrency.
    pub fn effective_bridge_threads(&self) -> usize {
        resolve_thread_count(self.bridge_threads)
    }

    /// Validate configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.effective_contexts() > defaults::MAX_CONTEXTS {
            return Err(ConfigError::InvalidValue("num_contexts must be <= 256"));
        }
        if self.bridge_queue_size == 0 {
            return Err(ConfigError::InvalidValue("bridge_queue_size must be > 0"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ConfigError::InvalidValue("connect_timeout must be > 0"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("fiberio configuration:");
        eprintln!("  num_contexts:       {} (effective {})", self.num_contexts, self.effective_contexts());
        eprintln!("  bridge_threads:     {} (effective {})", self.bridge_threads, self.effective_bridge_threads());
        eprintln!("  bridge_queue_size:  {}", self.bridge_queue_size);
        eprintln!("  connect_timeout:    {:?}", self.connect_timeout);
    }
}

/// 0 means "one per hardware thread".
pub fn resolve_thread_count(n: usize) -> usize {
    if n > 0 {
        return n;
    }
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Configuration error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}
