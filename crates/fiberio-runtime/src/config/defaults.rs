//! Library defaults for `RuntimeConfig`.
//!
//! Environment variables override these at runtime, see `RuntimeConfig::from_env`.

/// Execution contexts (one OS thread each). 0 = hardware concurrency.
pub const NUM_CONTEXTS: usize = 0;

/// Blocking bridge worker threads. 0 = hardware concurrency.
pub const BRIDGE_THREADS: usize = 0;

/// Bounded bridge queue capacity.
pub const BRIDGE_QUEUE_SIZE: usize = 128;

/// Default `ClientChannel::connect` budget in milliseconds.
pub const CONNECT_TIMEOUT_MS: u64 = 2000;

/// Upper bound on execution contexts.
pub const MAX_CONTEXTS: usize = 256;
