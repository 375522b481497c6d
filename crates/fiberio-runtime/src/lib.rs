//! # fiberio-runtime
//!
//! Execution machinery for fiberio.
//!
//! This crate provides:
//! - Execution contexts (one OS thread + single-threaded event loop each)
//! - A round-robin pool of contexts
//! - `FiberQueue`, a bounded queue with fiber producers and thread consumers
//! - `BlockingTaskBridge`, offloading blocking calls to worker threads
//! - Termination signal handling

pub mod config;
pub mod context;
pub mod pool;
pub mod queue;
pub mod bridge;
pub mod signal;

// Re-exports
pub use config::{ConfigError, RuntimeConfig};
pub use context::ExecutionContext;
pub use pool::ExecutionContextPool;
pub use queue::{FiberQueue, PushError, TryPushError};
pub use bridge::BlockingTaskBridge;
pub use signal::{Termination, TerminationSignals};
