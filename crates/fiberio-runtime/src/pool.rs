//! Fixed set of execution contexts with round-robin selection.

use std::sync::atomic::{AtomicUsize, Ordering};

use fiberio_core::{kdebug, NetError, NetResult};

use crate::config::{resolve_thread_count, RuntimeConfig};
use crate::context::ExecutionContext;

/// Pool of N execution contexts, handed out round-robin.
pub struct ExecutionContextPool {
    contexts: Vec<ExecutionContext>,
    next: AtomicUsize,
}

impl ExecutionContextPool {
    /// Start `n` contexts (0 = hardware concurrency).
    pub fn new(n: usize) -> NetResult<Self> {
        let n = resolve_thread_count(n);
        let mut contexts = Vec::with_capacity(n);
        for i in 0..n {
            contexts.push(ExecutionContext::new(i)?);
        }
        kdebug!("context pool started with {} contexts", n);
        Ok(Self {
            contexts,
            next: AtomicUsize::new(0),
        })
    }

    pub fn from_config(config: &RuntimeConfig) -> NetResult<Self> {
        config
            .validate()
            .map_err(|e| NetError::invalid_argument(e.to_string()))?;
        Self::new(config.effective_contexts())
    }

    /// Next context in round-robin order.
    pub fn next_context(&self) -> ExecutionContext {
        let i = self.next.fetch_add(1, Ordering::Relaxed) % self.contexts.len();
        self.contexts[i].clone()
    }

    pub fn get(&self, index: usize) -> Option<&ExecutionContext> {
        self.contexts.get(index)
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExecutionContext> {
        self.contexts.iter()
    }

    /// Stop every context. Pending fibers are cancelled.
    pub fn stop(&self) {
        for ctx in &self.contexts {
            ctx.stop();
        }
    }

    /// Wait for every context thread to exit.
    pub fn join(&self) {
        for ctx in &self.contexts {
            ctx.join();
        }
    }
}

impl Drop for ExecutionContextPool {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}
