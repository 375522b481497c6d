//! Unix termination signals via tokio's signal driver.

use std::io;

use tokio::signal::unix::{signal, Signal, SignalKind};

use fiberio_core::kinfo;

/// Signals that end a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Interrupt,
    Terminate,
}

/// Installed SIGINT/SIGTERM listeners.
pub struct TerminationSignals {
    int: Signal,
    term: Signal,
}

impl TerminationSignals {
    /// Install the handlers now, so a signal that arrives before the first
    /// `recv` is still seen.
    ///
    /// Must be called inside a runtime with the signal driver enabled.
    /// Handlers stay installed for the life of the process.
    pub fn install() -> io::Result<Self> {
        Ok(Self {
            int: signal(SignalKind::interrupt())?,
            term: signal(SignalKind::terminate())?,
        })
    }

    /// Wait for SIGINT or SIGTERM.
    pub async fn recv(&mut self) -> Termination {
        let which = tokio::select! {
            _ = self.int.recv() => Termination::Interrupt,
            _ = self.term.recv() => Termination::Terminate,
        };
        kinfo!("received {:?}", which);
        which
    }
}
