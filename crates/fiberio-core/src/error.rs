//! Error taxonomy for fiberio
//!
//! Every component reports failures through [`NetError`]. Transient network
//! conditions are retried inside the component that sees them and only show
//! up here once a deadline or retry budget is exhausted.

use core::fmt;
use std::io;

/// Result type for fiberio operations
pub type NetResult<T> = Result<T, NetError>;

/// Errors surfaced by fiberio components
///
/// `Clone + PartialEq` so a channel can keep its last status around and
/// hand copies to callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetError {
    /// Deadline passed or shutdown raced with the operation
    Aborted,

    /// Channel has no established connection
    NotConnected,

    /// Peer closed the connection
    ConnectionClosed,

    /// Component is shutting down and refuses new work
    ShuttingDown,

    /// Hostname/service resolution failed
    Resolve(String),

    /// Socket or file level failure
    Io { kind: io::ErrorKind, message: String },

    /// Caller misuse (e.g. non-sequential read)
    InvalidArgument(String),

    /// Remote object does not exist
    NotFound(String),

    /// Unexpected HTTP status
    Http { status: u16, reason: String },

    /// Malformed or unexpected protocol data
    Protocol(String),

    /// Queue was closed before the item could be accepted
    QueueClosed,

    /// A bridged blocking task panicked
    TaskPanicked(String),

    /// Execution context is gone (its thread exited)
    ContextStopped,
}

impl NetError {
    /// Build an `InvalidArgument` error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        NetError::InvalidArgument(msg.into())
    }

    /// Build a `Protocol` error
    pub fn protocol(msg: impl Into<String>) -> Self {
        NetError::Protocol(msg.into())
    }

    /// True for the errors that mean "the operation was cut short on purpose".
    #[inline]
    pub fn is_aborted(&self) -> bool {
        matches!(self, NetError::Aborted | NetError::ShuttingDown)
    }

    /// True for failures of an established transport (as opposed to caller
    /// or protocol errors). These are the ones worth reconnecting over.
    pub fn is_transport(&self) -> bool {
        match self {
            NetError::ConnectionClosed | NetError::NotConnected => true,
            NetError::Io { kind, .. } => matches!(
                kind,
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

impl fmt::Display for NetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetError::Aborted => write!(f, "operation aborted"),
            NetError::NotConnected => write!(f, "not connected"),
            NetError::ConnectionClosed => write!(f, "connection closed by peer"),
            NetError::ShuttingDown => write!(f, "shutting down"),
            NetError::Resolve(msg) => write!(f, "resolve failed: {}", msg),
            NetError::Io { kind, message } => write!(f, "io error ({:?}): {}", kind, message),
            NetError::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            NetError::NotFound(what) => write!(f, "not found: {}", what),
            NetError::Http { status, reason } => write!(f, "http error: {} {}", status, reason),
            NetError::Protocol(msg) => write!(f, "protocol error: {}", msg),
            NetError::QueueClosed => write!(f, "queue closed"),
            NetError::TaskPanicked(msg) => write!(f, "blocking task panicked: {}", msg),
            NetError::ContextStopped => write!(f, "execution context stopped"),
        }
    }
}

impl std::error::Error for NetError {}

impl From<io::Error> for NetError {
    fn from(e: io::Error) -> Self {
        NetError::Io {
            kind: e.kind(),
            message: e.to_string(),
        }
    }
}

impl From<NetError> for io::Error {
    fn from(e: NetError) -> Self {
        let kind = match &e {
            NetError::Io { kind, .. } => *kind,
            NetError::Aborted | NetError::ShuttingDown => io::ErrorKind::Interrupted,
            NetError::NotConnected => io::ErrorKind::NotConnected,
            NetError::ConnectionClosed => io::ErrorKind::ConnectionReset,
            NetError::InvalidArgument(_) => io::ErrorKind::InvalidInput,
            NetError::NotFound(_) => io::ErrorKind::NotFound,
            NetError::Protocol(_) => io::ErrorKind::InvalidData,
            _ => io::ErrorKind::Other,
        };
        io::Error::new(kind, e)
    }
}

/// Render a panic payload caught by `catch_unwind` as text.
pub fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "<non-string panic payload>".to_string()
    }
}
