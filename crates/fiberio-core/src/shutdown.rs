//! Monotonic shutdown flag
//!
//! Components hand a `ShutdownFlag` to every loop they run (accept loop,
//! resolve-connect-retry loop, reconnect fiber). Loops check it at each
//! iteration. Once raised a flag never goes back down; there is no reset.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{NetError, NetResult};

/// Shared, clonable, one-way shutdown flag
#[derive(Clone)]
pub struct ShutdownFlag {
    raised: Arc<AtomicBool>,
}

impl ShutdownFlag {
    /// Create a new, lowered flag
    pub fn new() -> Self {
        Self {
            raised: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Raise the flag. Returns `true` if this call was the one that raised it.
    pub fn raise(&self) -> bool {
        !self.raised.swap(true, Ordering::AcqRel)
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::Acquire)
    }

    /// `Err(ShuttingDown)` once raised
    #[inline]
    pub fn check(&self) -> NetResult<()> {
        if self.is_raised() {
            Err(NetError::ShuttingDown)
        } else {
            Ok(())
        }
    }
}

impl Default for ShutdownFlag {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShutdownFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownFlag")
            .field("raised", &self.is_raised())
            .finish()
    }
}
