//! Termination signal handling
//!
//! The accept server watches for SIGINT/SIGTERM on Unix and stops itself
//! when one arrives. Other platforms only get Ctrl-C.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    } else {
        mod fallback;
        pub use fallback::*;
    }
}
