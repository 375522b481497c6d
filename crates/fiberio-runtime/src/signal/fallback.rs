//! Non-Unix termination: Ctrl-C only.

use std::io;

use fiberio_core::kinfo;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Interrupt,
    Terminate,
}

pub struct TerminationSignals {
    _priv: (),
}

impl TerminationSignals {
    pub fn install() -> io::Result<Self> {
        Ok(Self { _priv: () })
    }

    pub async fn recv(&mut self) -> Termination {
        if let Err(e) = tokio::signal::ctrl_c().await {
            kinfo!("ctrl-c listener failed: {}", e);
            return std::future::pending().await;
        }
        kinfo!("received {:?}", Termination::Interrupt);
        Termination::Interrupt
    }
}
