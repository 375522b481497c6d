//! # fiberio-core
//!
//! Platform-agnostic building blocks shared by every fiberio crate.
//!
//! This crate has no runtime dependency. Anything that needs an event loop,
//! a socket or a thread lives in `fiberio-runtime` and above.
//!
//! ## Modules
//!
//! - `error` - `NetError` taxonomy surfaced by all components
//! - `kprint` - Leveled stderr logging macros
//! - `env` - Environment variable utilities
//! - `shutdown` - Monotonic shutdown flag

pub mod error;
pub mod kprint;
pub mod env;
pub mod shutdown;

// Re-exports for convenience
pub use error::{NetError, NetResult};
pub use shutdown::ShutdownFlag;
pub use env::{env_get, env_get_bool, env_get_millis, env_get_opt, env_get_str, env_is_set};
