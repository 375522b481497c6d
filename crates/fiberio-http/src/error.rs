//! hyper error classification.

use std::error::Error as StdError;
use std::io;

use fiberio_core::NetError;

/// First `io::Error` in the source chain, if any.
fn find_io_error<'a>(e: &'a (dyn StdError + 'static)) -> Option<&'a io::Error> {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if let Some(io) = err.downcast_ref::<io::Error>() {
            return Some(io);
        }
        cur = err.source();
    }
    None
}

fn is_broken_transport(kind: io::ErrorKind) -> bool {
    matches!(
        kind,
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
    )
}

/// Stream ended before the body was complete.
pub(crate) fn is_truncation(e: &hyper::Error) -> bool {
    if e.is_incomplete_message() {
        return true;
    }
    find_io_error(e).is_some_and(|io| is_broken_transport(io.kind()))
}

/// Failure worth retrying on a fresh connection.
pub(crate) fn is_retryable(e: &hyper::Error) -> bool {
    e.is_closed() || e.is_canceled() || is_truncation(e)
}

pub(crate) fn from_hyper(e: hyper::Error) -> NetError {
    if let Some(io) = find_io_error(&e) {
        return NetError::Io {
            kind: io.kind(),
            message: e.to_string(),
        };
    }
    if e.is_incomplete_message() || e.is_closed() || e.is_canceled() {
        return NetError::ConnectionClosed;
    }
    NetError::Protocol(e.to_string())
}
