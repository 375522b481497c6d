//! Live-connection registry for `AcceptServer`.
//!
//! Each accepted connection gets a `ConnectionId` and an entry holding a
//! duplicate of its socket. The server force-closes connections through
//! that duplicate; the handler fiber owns a `RegistryGuard` that removes
//! the entry when the fiber ends, however it ends.

use std::collections::HashMap;
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::pin::pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use fiberio_core::ktrace;

/// Monotonic per-server connection handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub u64);

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

struct Entry {
    peer: Option<SocketAddr>,
    closer: TcpStream,
}

#[derive(Default)]
pub(crate) struct Registry {
    next_id: AtomicU64,
    entries: Mutex<HashMap<ConnectionId, Entry>>,
    drained: Notify,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<ConnectionId, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a connection; the returned guard unregisters it on drop.
    pub(crate) fn insert(
        self: &Arc<Self>,
        closer: TcpStream,
        peer: Option<SocketAddr>,
    ) -> RegistryGuard {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries().insert(id, Entry { peer, closer });
        ktrace!("{} registered", id);
        RegistryGuard {
            registry: Arc::clone(self),
            id,
        }
    }

    fn remove(&self, id: ConnectionId) {
        let now_empty = {
            let mut entries = self.entries();
            entries.remove(&id);
            entries.is_empty()
        };
        ktrace!("{} unregistered", id);
        if now_empty {
            self.drained.notify_waiters();
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    /// Shut down both directions of every registered socket.
    pub(crate) fn close_all(&self) {
        for (id, entry) in self.entries().iter() {
            ktrace!("force-closing {} ({:?})", id, entry.peer);
            let _ = entry.closer.shutdown(Shutdown::Both);
        }
    }

    /// Suspend until no entry is left.
    pub(crate) async fn wait_empty(&self) {
        loop {
            let mut drained = pin!(self.drained.notified());
            drained.as_mut().enable();
            if self.entries().is_empty() {
                return;
            }
            drained.await;
        }
    }
}

/// Owned by a handler fiber; unregisters its connection when dropped.
pub(crate) struct RegistryGuard {
    registry: Arc<Registry>,
    id: ConnectionId,
}

impl RegistryGuard {
    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for RegistryGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}
